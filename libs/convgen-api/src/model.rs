//! Object model consumed by the conversion generator.
//!
//! The model is the boundary between the generator and whatever discovers
//! source declarations: a JSON document produced by an external scanner, a
//! [`ModelBuilder`] in tests, or `#[derive(Record)]` on Rust structs.
//!
//! Types are written in a compact, Go-like notation when serialized:
//!
//! | Notation          | [`TypeRef`]                          |
//! |-------------------|--------------------------------------|
//! | `int64`, `string` | `Basic(Int64)`, `Basic(String)`      |
//! | `pkg/path.Name`   | `Named(pkg/path, Name)`              |
//! | `*T`              | `Ref(T)`                             |
//! | `[]T`             | `Seq(T)`                             |
//! | `map[K]V`         | `Map(K, V)`                          |
//! | anything else     | `Opaque(text)`                       |

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

/// Maximum alias chain followed when resolving underlying types.
const MAX_ALIAS_DEPTH: usize = 32;

/// Globally unique key of a named type: declaring package + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeIdentity {
    pub package: String,
    pub name: String,
}

impl TypeIdentity {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.package.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.package, self.name)
        }
    }
}

/// Primitive kinds. Conversions between them are decided by kind, not by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
}

impl BasicKind {
    const ALL: [BasicKind; 14] = [
        BasicKind::Bool,
        BasicKind::Int,
        BasicKind::Int8,
        BasicKind::Int16,
        BasicKind::Int32,
        BasicKind::Int64,
        BasicKind::Uint,
        BasicKind::Uint8,
        BasicKind::Uint16,
        BasicKind::Uint32,
        BasicKind::Uint64,
        BasicKind::Float32,
        BasicKind::Float64,
        BasicKind::String,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BasicKind::Int | BasicKind::Int8 | BasicKind::Int16 | BasicKind::Int32 | BasicKind::Int64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BasicKind::Float32 | BasicKind::Float64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }
}

/// Reference to a type as it appears in a field or function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRef {
    Basic(BasicKind),
    Named(TypeIdentity),
    /// Nilable indirection (`*T`).
    Ref(Box<TypeRef>),
    /// Nilable homogeneous sequence (`[]T`).
    Seq(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    /// Anything the generator does not model (functions, channels, ...).
    Opaque(String),
}

impl TypeRef {
    pub fn named(package: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef::Named(TypeIdentity::new(package, name))
    }

    pub fn reference(elem: TypeRef) -> Self {
        TypeRef::Ref(Box::new(elem))
    }

    pub fn seq(elem: TypeRef) -> Self {
        TypeRef::Seq(Box::new(elem))
    }

    /// Strip one level of reference, if any.
    pub fn skip_ref(&self) -> &TypeRef {
        match self {
            TypeRef::Ref(elem) => elem,
            other => other,
        }
    }

    /// Named identity of `*Named`.
    pub fn ref_to_named(&self) -> Option<&TypeIdentity> {
        match self {
            TypeRef::Ref(elem) => match elem.as_ref() {
                TypeRef::Named(id) => Some(id),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parse the compact notation described in the module docs.
    pub fn parse(text: &str) -> Result<Self, ConvertError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConvertError::model("empty type"));
        }
        if let Some(rest) = text.strip_prefix('*') {
            return Ok(TypeRef::reference(Self::parse(rest)?));
        }
        if let Some(rest) = text.strip_prefix("[]") {
            return Ok(TypeRef::seq(Self::parse(rest)?));
        }
        if let Some(rest) = text.strip_prefix("map[") {
            let close = matching_bracket(rest)
                .ok_or_else(|| ConvertError::model(format!("unbalanced map type ({text})")))?;
            let key = Self::parse(&rest[..close])?;
            let value = Self::parse(&rest[close + 1..])?;
            return Ok(TypeRef::Map(Box::new(key), Box::new(value)));
        }
        if let Some(kind) = BasicKind::from_name(text) {
            return Ok(TypeRef::Basic(kind));
        }
        if text.contains(|c: char| c.is_whitespace() || c == '(' || c == '{') {
            return Ok(TypeRef::Opaque(text.to_string()));
        }
        match text.rsplit_once('.') {
            Some((package, name)) if !package.is_empty() && !name.is_empty() => {
                Ok(TypeRef::named(package, name))
            }
            _ => Ok(TypeRef::Opaque(text.to_string())),
        }
    }
}

/// Index of the `]` closing an already-opened `[`.
fn matching_bracket(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Basic(kind) => f.write_str(kind.name()),
            TypeRef::Named(id) => write!(f, "{id}"),
            TypeRef::Ref(elem) => write!(f, "*{elem}"),
            TypeRef::Seq(elem) => write!(f, "[]{elem}"),
            TypeRef::Map(key, value) => write!(f, "map[{key}]{value}"),
            TypeRef::Opaque(text) => f.write_str(text),
        }
    }
}

impl TryFrom<String> for TypeRef {
    type Error = ConvertError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TypeRef::parse(&value)
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

/// A field of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    /// Promoted (anonymous) field.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub embedded: bool,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: false,
        }
    }

    pub fn embedded(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeBody {
    Record { fields: Vec<FieldDecl> },
    /// Named non-record type, e.g. `type S string`.
    Alias(TypeRef),
}

/// A named type declared in a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub body: TypeBody,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_public() -> bool {
    true
}

impl TypeDecl {
    pub fn record(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self {
            name: name.into(),
            body: TypeBody::Record { fields },
            directives: Vec::new(),
            public: true,
        }
    }

    pub fn alias(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            body: TypeBody::Alias(ty),
            directives: Vec::new(),
            public: true,
        }
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn fields(&self) -> Option<&[FieldDecl]> {
        match &self.body {
            TypeBody::Record { fields } => Some(fields),
            TypeBody::Alias(_) => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.body, TypeBody::Record { .. })
    }
}

/// A package-level function (candidate custom conversion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<TypeRef>,
    #[serde(default)]
    pub params: Vec<TypeRef>,
    #[serde(default)]
    pub results: Vec<TypeRef>,
}

impl FuncDecl {
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, results: Vec<TypeRef>) -> Self {
        Self {
            name: name.into(),
            receiver: None,
            params,
            results,
        }
    }

    /// A method of `receiver` (a named type or a reference to one).
    pub fn method(
        receiver: TypeRef,
        name: impl Into<String>,
        params: Vec<TypeRef>,
        results: Vec<TypeRef>,
    ) -> Self {
        Self {
            receiver: Some(receiver),
            ..Self::new(name, params, results)
        }
    }
}

/// A generator directive attached to a package or a type declaration.
///
/// Raw forms: `+gen:convert: pkgA -> pkgB`, `+convert:type=Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Directive {
    pub cmd: String,
    pub arg: String,
}

impl Directive {
    pub fn new(cmd: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            arg: arg.into(),
        }
    }

    /// Parse the raw directive text. A leading `+` is optional.
    pub fn parse(raw: &str) -> Result<Self, ConvertError> {
        let text = raw.trim();
        let text = text.strip_prefix('+').unwrap_or(text);
        let word_end = text.find(char::is_whitespace).unwrap_or(text.len());
        let word = &text[..word_end];
        if word.is_empty() {
            return Err(ConvertError::directive(format!("empty directive ({raw})")));
        }

        if let Some((cmd, arg)) = word.split_once('=') {
            if cmd.is_empty() {
                return Err(ConvertError::directive(format!("missing command ({raw})")));
            }
            let rest = text[word_end..].trim();
            let arg = if rest.is_empty() {
                arg.to_string()
            } else {
                format!("{arg} {rest}")
            };
            return Ok(Self::new(cmd, arg));
        }

        let cmd = word.strip_suffix(':').unwrap_or(word);
        if cmd.is_empty() {
            return Err(ConvertError::directive(format!("missing command ({raw})")));
        }
        Ok(Self::new(cmd, text[word_end..].trim()))
    }

    /// Canonical raw text, used in diagnostics.
    pub fn raw(&self) -> String {
        if self.cmd.starts_with("convert:") {
            format!("+{}={}", self.cmd, self.arg)
        } else if self.arg.is_empty() {
            format!("+{}", self.cmd)
        } else {
            format!("+{}: {}", self.cmd, self.arg)
        }
    }
}

impl TryFrom<String> for Directive {
    type Error = ConvertError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Directive::parse(&value)
    }
}

impl From<Directive> for String {
    fn from(value: Directive) -> Self {
        value.raw()
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw())
    }
}

/// A package: directives, named types and package-level functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub path: String,
    #[serde(default)]
    pub directives: Vec<Directive>,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub functions: Vec<FuncDecl>,
}

impl Package {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            directives: Vec::new(),
            types: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Last path segment, used to qualify names from other packages.
    pub fn base_name(&self) -> &str {
        base_name(&self.path)
    }
}

/// Last segment of a package path (`a/b/c` → `c`, `a::b` → `b`).
pub fn base_name(path: &str) -> &str {
    let tail = path.rsplit('/').next().unwrap_or(path);
    tail.rsplit("::").next().unwrap_or(tail)
}

/// The whole set of packages visible to one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectModel {
    pub packages: Vec<Package>,
}

impl ObjectModel {
    /// Parse a model from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, ConvertError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.path == path)
    }

    pub fn type_decl(&self, id: &TypeIdentity) -> Option<&TypeDecl> {
        self.package(&id.package)?.type_decl(&id.name)
    }

    pub fn record_fields(&self, id: &TypeIdentity) -> Option<&[FieldDecl]> {
        self.type_decl(id)?.fields()
    }

    /// Whether `id` declares a method `name`, on a value or reference receiver.
    pub fn has_method(&self, id: &TypeIdentity, name: &str) -> bool {
        let Some(package) = self.package(&id.package) else {
            return false;
        };
        package.functions.iter().any(|f| {
            f.name == name
                && matches!(f.receiver.as_ref().map(TypeRef::skip_ref), Some(TypeRef::Named(r)) if r == id)
        })
    }

    /// Follow `Named` → alias chains down to the first non-alias type.
    ///
    /// Record types stay `Named`; unknown names are returned as-is.
    pub fn underlying<'a>(&'a self, ty: &'a TypeRef) -> &'a TypeRef {
        let mut current = ty;
        for _ in 0..MAX_ALIAS_DEPTH {
            let TypeRef::Named(id) = current else {
                return current;
            };
            match self.type_decl(id).map(|d| &d.body) {
                Some(TypeBody::Alias(next)) => current = next,
                _ => return current,
            }
        }
        current
    }

    /// Basic kind of `ty` after alias resolution.
    pub fn basic_kind(&self, ty: &TypeRef) -> Option<BasicKind> {
        match self.underlying(ty) {
            TypeRef::Basic(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Index of all declared types by identity.
    pub fn index(&self) -> HashMap<TypeIdentity, &TypeDecl> {
        let mut index = HashMap::new();
        for package in &self.packages {
            for decl in &package.types {
                index.insert(TypeIdentity::new(&package.path, &decl.name), decl);
            }
        }
        index
    }
}

// ---------------------------------------------------------------------------
// ModelBuilder: assemble models in code
// ---------------------------------------------------------------------------

/// Incremental builder for [`ObjectModel`].
#[derive(Debug, Default)]
pub struct ModelBuilder {
    packages: Vec<Package>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn package_mut(&mut self, path: &str) -> &mut Package {
        let idx = match self.packages.iter().position(|p| p.path == path) {
            Some(idx) => idx,
            None => {
                self.packages.push(Package::new(path));
                self.packages.len() - 1
            }
        };
        &mut self.packages[idx]
    }

    /// Attach a package-level directive.
    pub fn directive(mut self, package: &str, directive: Directive) -> Self {
        self.package_mut(package).directives.push(directive);
        self
    }

    pub fn type_decl(mut self, package: &str, decl: TypeDecl) -> Self {
        self.package_mut(package).types.push(decl);
        self
    }

    pub fn function(mut self, package: &str, func: FuncDecl) -> Self {
        self.package_mut(package).functions.push(func);
        self
    }

    /// Add the declaration of a `#[derive(Record)]` type under its own package.
    pub fn record<T: crate::record::Record>(self) -> Self {
        let id = T::identity();
        self.type_decl(&id.package, T::declaration())
    }

    pub fn build(self) -> ObjectModel {
        ObjectModel {
            packages: self.packages,
        }
    }
}
