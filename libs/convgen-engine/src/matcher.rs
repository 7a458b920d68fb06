//! Field matching and embedding promotion for one direction of a pair.

use convgen_api::model::{FieldDecl, TypeIdentity, TypeRef};
use convgen_api::plan::{ConvertPair, Embedding, FieldConversion, FieldValue, Mode};

use crate::context::GenContext;
use crate::error::GenError;
use crate::pairing::pair_of_fields;

fn record_fields<'m>(ctx: &GenContext<'m>, id: &TypeIdentity) -> Result<&'m [FieldDecl], GenError> {
    ctx.model()
        .record_fields(id)
        .ok_or_else(|| GenError::NotARecord(id.to_string()))
}

/// Embedded field of `fields` whose de-referenced type is `target`.
fn embedded_of<'f>(
    fields: &'f [FieldDecl],
    target: &TypeIdentity,
    pair: &ConvertPair,
) -> Result<Option<&'f FieldDecl>, GenError> {
    let mut found: Option<&FieldDecl> = None;
    for field in fields.iter().filter(|f| f.embedded) {
        if !matches!(field.ty.skip_ref(), TypeRef::Named(id) if id == target) {
            continue;
        }
        if let Some(first) = found {
            return Err(GenError::AmbiguousEmbedding {
                arg: pair.arg.to_string(),
                out: pair.out.to_string(),
                first: first.name.clone(),
                second: field.name.clone(),
            });
        }
        found = Some(field);
    }
    Ok(found)
}

/// Detect the embedding relation of `pair`. The input side is checked first.
pub fn detect_embedding(ctx: &GenContext<'_>, pair: &ConvertPair) -> Result<Embedding, GenError> {
    let arg_fields = record_fields(ctx, &pair.arg)?;
    if let Some(field) = embedded_of(arg_fields, &pair.out, pair)? {
        return Ok(Embedding::Arg(field.clone()));
    }
    let out_fields = record_fields(ctx, &pair.out)?;
    if let Some(field) = embedded_of(out_fields, &pair.arg, pair)? {
        return Ok(Embedding::Out(field.clone()));
    }
    Ok(Embedding::None)
}

/// Same-named field (case-sensitive).
pub fn match_field<'f>(name: &str, fields: &'f [FieldDecl]) -> Option<&'f FieldDecl> {
    fields.iter().find(|f| f.name == name)
}

/// `s` starts with the camel-case word `prefix` (`NullString`, not `Nullable`).
fn has_prefix_camel(s: &str, prefix: &str) -> bool {
    s.len() > prefix.len()
        && s.starts_with(prefix)
        && !s.as_bytes()[prefix.len()].is_ascii_lowercase()
}

/// Named `Null*` type with an `Apply` method.
fn applicable<'t>(ctx: &GenContext<'_>, ty: &'t TypeRef) -> Option<&'t TypeIdentity> {
    let TypeRef::Named(id) = ty else {
        return None;
    };
    (has_prefix_camel(&id.name, "Null") && ctx.model().has_method(id, "Apply")).then_some(id)
}

/// Decide the value of one output field.
///
/// Order: identifier (update only), missing input, identical type, `Null*`
/// apply (update only), nested pair conversion, basic conversion, mismatch.
pub fn field_value(
    ctx: &GenContext<'_>,
    mode: Mode,
    arg: Option<&FieldDecl>,
    out: &FieldDecl,
    is_identifier: bool,
) -> Result<FieldValue, GenError> {
    if is_identifier {
        return Ok(FieldValue::Identifier);
    }
    let Some(arg) = arg else {
        return Ok(FieldValue::NoChange);
    };
    if arg.ty == out.ty {
        return Ok(FieldValue::Assign);
    }
    if mode == Mode::Update {
        if let Some(id) = applicable(ctx, &arg.ty) {
            return Ok(FieldValue::Apply { ty: id.clone() });
        }
    }

    let model = ctx.model();
    if let Some((pair, sequence)) = pair_of_fields(model, &arg.ty, &out.ty) {
        if let Some(entry) = ctx.pair(&pair) {
            let Some(converter_package) = &entry.converter_package else {
                let function = entry
                    .custom
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                return Err(GenError::MissingConverterPackage {
                    function,
                    arg: pair.arg.to_string(),
                    out: pair.out.to_string(),
                    arg_package: pair.arg.package.clone(),
                    out_package: pair.out.package.clone(),
                });
            };
            return Ok(FieldValue::Delegate {
                pair: pair.clone(),
                sequence,
                converter_package: converter_package.clone(),
            });
        }
    }

    if let (Some(arg_kind), Some(out_kind)) = (model.basic_kind(&arg.ty), model.basic_kind(&out.ty)) {
        if arg_kind == out_kind || (arg_kind.is_numeric() && out_kind.is_numeric()) {
            return Ok(FieldValue::Cast { kind: out_kind });
        }
    }

    tracing::trace!(field = %out.name, arg = %arg.ty, out = %out.ty, "types do not match");
    Ok(FieldValue::Mismatch)
}

/// Field conversions of one direction, in output field order.
///
/// Type mode applies embedding promotion: when the input embeds the output
/// type the list is empty; when the output embeds the input type, the
/// embedded field is skipped unless the input has a same-named field.
/// Update mode requires every identifier to name an output field.
pub fn plan_fields(
    ctx: &GenContext<'_>,
    mode: Mode,
    pair: &ConvertPair,
    embedding: &Embedding,
    identifiers: &[String],
) -> Result<Vec<FieldConversion>, GenError> {
    if matches!(embedding, Embedding::Arg(_)) {
        return Ok(Vec::new());
    }

    let arg_fields = record_fields(ctx, &pair.arg)?;
    let out_fields = record_fields(ctx, &pair.out)?;
    let embedded_out = match embedding {
        Embedding::Out(field) => Some(field),
        _ => None,
    };

    let mut fields = Vec::with_capacity(out_fields.len());
    let mut identifier_count = 0;
    for out in out_fields {
        let arg = match_field(&out.name, arg_fields);
        if arg.is_none() && embedded_out == Some(out) {
            continue;
        }
        let is_identifier = mode == Mode::Update && identifiers.iter().any(|i| i == &out.name);
        if is_identifier {
            identifier_count += 1;
        }
        let value = field_value(ctx, mode, arg, out, is_identifier)?;
        fields.push(FieldConversion {
            arg: arg.cloned(),
            out: out.clone(),
            is_identifier,
            value,
        });
    }

    if mode == Mode::Update && identifier_count != identifiers.len() {
        return Err(GenError::IdentifierNotFound {
            name: pair.arg.name.clone(),
            identifiers: identifiers.join(","),
        });
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convgen_api::model::{BasicKind, FuncDecl, ModelBuilder, ObjectModel, TypeDecl};
    use convgen_api::plan::{CustomFunc, CustomShape};
    use pretty_assertions::assert_eq;

    const P: &str = "example.com/tests";

    fn id(name: &str) -> TypeIdentity {
        TypeIdentity::new(P, name)
    }

    fn named(name: &str) -> TypeRef {
        TypeRef::named(P, name)
    }

    fn basic(kind: BasicKind) -> TypeRef {
        TypeRef::Basic(kind)
    }

    fn model() -> ObjectModel {
        ModelBuilder::new()
            .type_decl(P, TypeDecl::alias("S", basic(BasicKind::String)))
            .type_decl(
                P,
                TypeDecl::record(
                    "A",
                    vec![
                        FieldDecl::new("Value", basic(BasicKind::Int)),
                        FieldDecl::new("Int", basic(BasicKind::Int64)),
                        FieldDecl::new("String", basic(BasicKind::String)),
                        FieldDecl::new("C", TypeRef::reference(named("C0"))),
                        FieldDecl::new("Cs", TypeRef::seq(TypeRef::reference(named("C0")))),
                        FieldDecl::new("Only", basic(BasicKind::Bool)),
                    ],
                ),
            )
            .type_decl(
                P,
                TypeDecl::record(
                    "B",
                    vec![
                        FieldDecl::new("Value", basic(BasicKind::String)),
                        FieldDecl::new("Int", basic(BasicKind::Int32)),
                        FieldDecl::new("String", named("S")),
                        FieldDecl::new("C", TypeRef::reference(named("C1"))),
                        FieldDecl::new("Cs", TypeRef::seq(TypeRef::reference(named("C1")))),
                        FieldDecl::new("Extra", basic(BasicKind::Bool)),
                    ],
                ),
            )
            .type_decl(P, TypeDecl::record("C0", vec![FieldDecl::new("Value", basic(BasicKind::Int))]))
            .type_decl(
                P,
                TypeDecl::record("C1", vec![FieldDecl::new("Value", basic(BasicKind::String))]),
            )
            .type_decl(
                P,
                TypeDecl::record(
                    "C2",
                    vec![
                        FieldDecl::embedded("C0", named("C0")),
                        FieldDecl::new("X", basic(BasicKind::Int)),
                    ],
                ),
            )
            .type_decl(
                P,
                TypeDecl::record(
                    "C3",
                    vec![
                        FieldDecl::embedded("C0", TypeRef::reference(named("C0"))),
                        FieldDecl::embedded("Other", named("C0")),
                    ],
                ),
            )
            .build()
    }

    fn values(fields: &[FieldConversion]) -> Vec<(&str, &FieldValue)> {
        fields.iter().map(|f| (f.out.name.as_str(), &f.value)).collect()
    }

    #[test]
    fn decides_each_field_in_output_order() {
        let model = model();
        let mut ctx = GenContext::new(&model);
        let c01 = ConvertPair::new(id("C0"), id("C1"));
        ctx.claim_generated(c01.clone(), P, P).unwrap();

        let pair = ConvertPair::new(id("A"), id("B"));
        let fields = plan_fields(&ctx, Mode::Type, &pair, &Embedding::None, &[]).unwrap();
        assert_eq!(
            values(&fields),
            vec![
                ("Value", &FieldValue::Mismatch),
                ("Int", &FieldValue::Cast { kind: BasicKind::Int32 }),
                ("String", &FieldValue::Cast { kind: BasicKind::String }),
                (
                    "C",
                    &FieldValue::Delegate {
                        pair: c01.clone(),
                        sequence: false,
                        converter_package: P.to_string(),
                    }
                ),
                (
                    "Cs",
                    &FieldValue::Delegate {
                        pair: c01,
                        sequence: true,
                        converter_package: P.to_string(),
                    }
                ),
                ("Extra", &FieldValue::NoChange),
            ]
        );
        assert!(fields[5].arg.is_none());
    }

    #[test]
    fn unregistered_nested_pairs_do_not_match() {
        let model = model();
        let ctx = GenContext::new(&model);
        let pair = ConvertPair::new(id("A"), id("B"));
        let fields = plan_fields(&ctx, Mode::Create, &pair, &Embedding::None, &[]).unwrap();
        assert_eq!(fields[3].value, FieldValue::Mismatch);
        assert_eq!(fields[4].value, FieldValue::Mismatch);
    }

    #[test]
    fn override_without_generated_package_is_an_error() {
        let model = model();
        let mut ctx = GenContext::new(&model);
        let func = CustomFunc {
            package: P.to_string(),
            name: "ConvertC01".to_string(),
            shape: CustomShape::Transform,
        };
        ctx.claim_custom(ConvertPair::new(id("C0"), id("C1")), func).unwrap();

        let pair = ConvertPair::new(id("A"), id("B"));
        let err = plan_fields(&ctx, Mode::Type, &pair, &Embedding::None, &[]).unwrap_err();
        assert!(matches!(err, GenError::MissingConverterPackage { .. }));
        assert!(err.to_string().contains("(+gen:convert: example.com/tests->example.com/tests)"));
    }

    #[test]
    fn update_preserves_identifiers() {
        let model = model();
        let ctx = GenContext::new(&model);
        let pair = ConvertPair::new(id("A"), id("B"));
        let ids = vec!["Int".to_string()];
        let fields = plan_fields(&ctx, Mode::Update, &pair, &Embedding::None, &ids).unwrap();
        assert_eq!(fields[1].value, FieldValue::Identifier);
        assert!(fields[1].is_identifier);

        let ids = vec!["Missing".to_string()];
        let err = plan_fields(&ctx, Mode::Update, &pair, &Embedding::None, &ids).unwrap_err();
        assert_eq!(err.to_string(), "update A: identifier not found (Missing)");
    }

    #[test]
    fn embedding_promotes_whole_values() {
        let model = model();
        let ctx = GenContext::new(&model);

        let into = ConvertPair::new(id("C0"), id("C2"));
        let embedding = detect_embedding(&ctx, &into).unwrap();
        assert_eq!(embedding, Embedding::Out(FieldDecl::embedded("C0", named("C0"))));
        let fields = plan_fields(&ctx, Mode::Type, &into, &embedding, &[]).unwrap();
        assert_eq!(values(&fields), vec![("X", &FieldValue::NoChange)]);

        let back = into.reversed();
        let embedding = detect_embedding(&ctx, &back).unwrap();
        assert!(matches!(embedding, Embedding::Arg(_)));
        assert!(plan_fields(&ctx, Mode::Type, &back, &embedding, &[]).unwrap().is_empty());
    }

    #[test]
    fn two_matching_embedded_fields_are_ambiguous() {
        let model = model();
        let ctx = GenContext::new(&model);
        let err = detect_embedding(&ctx, &ConvertPair::new(id("C3"), id("C0"))).unwrap_err();
        assert!(matches!(err, GenError::AmbiguousEmbedding { .. }));
    }

    fn nullable_model() -> ObjectModel {
        let string = || basic(BasicKind::String);
        let apply = |name: &str| {
            FuncDecl::method(TypeRef::reference(named(name)), "Apply", vec![string()], vec![string()])
        };
        ModelBuilder::new()
            .type_decl(
                P,
                TypeDecl::record(
                    "NullString",
                    vec![
                        FieldDecl::new("String", string()),
                        FieldDecl::new("Valid", basic(BasicKind::Bool)),
                    ],
                ),
            )
            .type_decl(P, TypeDecl::record("Nullable", vec![]))
            .type_decl(P, TypeDecl::record("NullFlag", vec![]))
            .function(P, apply("NullString"))
            .function(P, apply("Nullable"))
            .type_decl(
                P,
                TypeDecl::record(
                    "Patch",
                    vec![
                        FieldDecl::new("Name", named("NullString")),
                        FieldDecl::new("Note", named("Nullable")),
                        FieldDecl::new("Flag", named("NullFlag")),
                    ],
                ),
            )
            .type_decl(
                P,
                TypeDecl::record(
                    "Row",
                    vec![
                        FieldDecl::new("Name", string()),
                        FieldDecl::new("Note", string()),
                        FieldDecl::new("Flag", string()),
                    ],
                ),
            )
            .build()
    }

    #[test]
    fn null_wrappers_apply_in_update_mode_only() {
        let model = nullable_model();
        let ctx = GenContext::new(&model);
        let pair = ConvertPair::new(id("Patch"), id("Row"));

        let fields = plan_fields(&ctx, Mode::Update, &pair, &Embedding::None, &[]).unwrap();
        assert_eq!(
            values(&fields),
            vec![
                ("Name", &FieldValue::Apply { ty: id("NullString") }),
                ("Note", &FieldValue::Mismatch),
                ("Flag", &FieldValue::Mismatch),
            ]
        );

        let fields = plan_fields(&ctx, Mode::Create, &pair, &Embedding::None, &[]).unwrap();
        assert_eq!(fields[0].value, FieldValue::Mismatch);
    }

    #[test]
    fn camel_prefix_needs_a_word_boundary() {
        assert!(has_prefix_camel("NullString", "Null"));
        assert!(has_prefix_camel("Null64", "Null"));
        assert!(!has_prefix_camel("Nullable", "Null"));
        assert!(!has_prefix_camel("Null", "Null"));
    }
}
