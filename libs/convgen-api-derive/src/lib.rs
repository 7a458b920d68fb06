use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, GenericArgument, LitStr, PathArguments, Type, parse_macro_input,
};

/// Derive macro adapting a struct into a convertible record type.
///
/// Generates `convgen_api::record::Record` (identity + object model
/// declaration) and `convgen_api::record::Convertible`.
///
/// # Example
///
/// ```ignore
/// #[derive(Record, Default)]
/// #[record(package = "example.com/api", directive = "+convert:type=C0")]
/// pub struct C1 {
///     #[record(rename = "Value")]
///     pub value: String,
///     #[record(embedded)]
///     pub base: Option<Box<C0>>,
/// }
/// ```
///
/// Field type mapping:
///
/// - `bool`, integers, floats, `String` → basic kinds
/// - `Box<T>`, `Option<T>`, `Option<Box<T>>` → reference to `T`
/// - `Vec<T>`, `Option<Vec<T>>` → sequence of `T`
/// - `HashMap<K, V>`, `BTreeMap<K, V>` → map
/// - any other plain path → the named record `T` (must derive `Record`)
///
/// The package defaults to the module path of the struct.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            Fields::Unit => return derive_tokens(input, Vec::new()),
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Record only supports structs")),
    };

    let mut field_tokens = Vec::new();
    for field in fields {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;

        let mut field_name = ident.to_string();
        let mut embedded = false;
        for attr in &field.attrs {
            if !attr.path().is_ident("record") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    field_name = value.value();
                } else if meta.path.is_ident("embedded") {
                    embedded = true;
                } else {
                    return Err(meta.error("unknown field attribute (expected rename or embedded)"));
                }
                Ok(())
            })?;
        }

        let ty = type_ref(&field.ty);
        field_tokens.push(quote! {
            convgen_api::model::FieldDecl {
                name: #field_name.to_string(),
                ty: #ty,
                embedded: #embedded,
            }
        });
    }

    derive_tokens(input, field_tokens)
}

fn derive_tokens(
    input: &DeriveInput,
    field_tokens: Vec<TokenStream2>,
) -> Result<TokenStream2, syn::Error> {
    let name = &input.ident;
    let name_str = name.to_string();

    let mut package: Option<String> = None;
    let mut directives = Vec::new();
    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("package") {
                let value: LitStr = meta.value()?.parse()?;
                package = Some(value.value());
            } else if meta.path.is_ident("directive") {
                let value: LitStr = meta.value()?.parse()?;
                let (cmd, arg) = split_directive(&value.value())
                    .ok_or_else(|| syn::Error::new_spanned(&value, "invalid directive"))?;
                directives.push(quote! {
                    convgen_api::model::Directive::new(#cmd, #arg)
                });
            } else {
                return Err(meta.error("unknown record attribute (expected package or directive)"));
            }
            Ok(())
        })?;
    }

    let package_expr = match package {
        Some(p) => quote! { #p },
        None => quote! { module_path!() },
    };

    Ok(quote! {
        impl convgen_api::record::Record for #name {
            fn identity() -> convgen_api::model::TypeIdentity {
                convgen_api::model::TypeIdentity::new(#package_expr, #name_str)
            }

            fn declaration() -> convgen_api::model::TypeDecl {
                let mut decl = convgen_api::model::TypeDecl::record(
                    #name_str,
                    vec![#(#field_tokens),*],
                );
                decl.directives = vec![#(#directives),*];
                decl
            }
        }

        impl convgen_api::record::Convertible for #name {
            fn shape(&self) -> convgen_api::record::Shape {
                convgen_api::record::Shape::Record(
                    <Self as convgen_api::record::Record>::identity(),
                )
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    })
}

/// Split `+cmd: arg` / `+cmd=arg` at expansion time.
fn split_directive(raw: &str) -> Option<(String, String)> {
    let text = raw.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    let word_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let (word, rest) = text.split_at(word_end);
    let rest = rest.trim();
    if let Some((cmd, arg)) = word.split_once('=') {
        if cmd.is_empty() {
            return None;
        }
        let arg = if rest.is_empty() {
            arg.to_string()
        } else {
            format!("{arg} {rest}")
        };
        return Some((cmd.to_string(), arg));
    }
    let cmd = word.strip_suffix(':').unwrap_or(word);
    if cmd.is_empty() {
        return None;
    }
    Some((cmd.to_string(), rest.to_string()))
}

/// `TypeRef` expression for a Rust field type.
fn type_ref(ty: &Type) -> TokenStream2 {
    let Some((ident, args)) = last_segment(ty) else {
        let text = quote!(#ty).to_string();
        return quote! { convgen_api::model::TypeRef::Opaque(#text.to_string()) };
    };

    if let Some(kind) = basic_kind(&ident) {
        let kind = syn::Ident::new(kind, proc_macro2::Span::call_site());
        return quote! {
            convgen_api::model::TypeRef::Basic(convgen_api::model::BasicKind::#kind)
        };
    }

    match (ident.as_str(), args.as_slice()) {
        ("Option", [inner]) => match last_segment(inner) {
            Some((wrapper, inner_args)) if wrapper == "Vec" && inner_args.len() == 1 => {
                let elem = type_ref(inner_args[0]);
                quote! { convgen_api::model::TypeRef::seq(#elem) }
            }
            Some((wrapper, inner_args)) if wrapper == "Box" && inner_args.len() == 1 => {
                let elem = type_ref(inner_args[0]);
                quote! { convgen_api::model::TypeRef::reference(#elem) }
            }
            _ => {
                let elem = type_ref(inner);
                quote! { convgen_api::model::TypeRef::reference(#elem) }
            }
        },
        ("Box", [inner]) => {
            let elem = type_ref(inner);
            quote! { convgen_api::model::TypeRef::reference(#elem) }
        }
        ("Vec", [inner]) => {
            let elem = type_ref(inner);
            quote! { convgen_api::model::TypeRef::seq(#elem) }
        }
        ("HashMap" | "BTreeMap", [key, value]) => {
            let key = type_ref(key);
            let value = type_ref(value);
            quote! {
                convgen_api::model::TypeRef::Map(Box::new(#key), Box::new(#value))
            }
        }
        (_, []) => quote! {
            convgen_api::model::TypeRef::Named(
                <#ty as convgen_api::record::Record>::identity(),
            )
        },
        _ => {
            let text = quote!(#ty).to_string();
            quote! { convgen_api::model::TypeRef::Opaque(#text.to_string()) }
        }
    }
}

/// Last path segment name and its generic type arguments.
fn last_segment(ty: &Type) -> Option<(String, Vec<&Type>)> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let args = match &segment.arguments {
        PathArguments::AngleBracketed(generic) => generic
            .args
            .iter()
            .filter_map(|arg| match arg {
                GenericArgument::Type(t) => Some(t),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Some((segment.ident.to_string(), args))
}

fn basic_kind(ident: &str) -> Option<&'static str> {
    Some(match ident {
        "bool" => "Bool",
        "isize" => "Int",
        "i8" => "Int8",
        "i16" => "Int16",
        "i32" => "Int32",
        "i64" => "Int64",
        "usize" => "Uint",
        "u8" => "Uint8",
        "u16" => "Uint16",
        "u32" => "Uint32",
        "u64" => "Uint64",
        "f32" => "Float32",
        "f64" => "Float64",
        "String" => "String",
        _ => return None,
    })
}
