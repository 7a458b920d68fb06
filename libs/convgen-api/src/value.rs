use crate::error::ConvertError;
use crate::model::{BasicKind, ObjectModel, TypeIdentity, TypeRef};

/// Dynamic value of a modeled type.
///
/// Nilable shapes carry an `Option`: `Ref(None)` is the nil reference and
/// `Seq(None)` the nil sequence, which is distinct from an empty one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Record(RecordValue),
    Ref(Option<Box<Value>>),
    Seq(Option<Vec<Value>>),
    Map(Option<Vec<(Value, Value)>>),
    /// Nil of an unmodeled type.
    Nil,
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Non-nil reference to `value`.
    pub fn some(value: impl Into<Value>) -> Self {
        Value::Ref(Some(Box::new(value.into())))
    }

    pub fn nil() -> Self {
        Value::Ref(None)
    }

    pub fn seq(items: Vec<Value>) -> Self {
        Value::Seq(Some(items))
    }

    /// Zero value of `ty`, resolving named types through `model`.
    pub fn zero_of(ty: &TypeRef, model: &ObjectModel) -> Result<Self, ConvertError> {
        match ty {
            TypeRef::Basic(kind) => Ok(Self::zero_basic(*kind)),
            TypeRef::Named(_) => match model.underlying(ty) {
                TypeRef::Named(resolved) => Ok(Value::Record(RecordValue::zero(resolved, model)?)),
                other => Self::zero_of(other, model),
            },
            TypeRef::Ref(_) => Ok(Value::Ref(None)),
            TypeRef::Seq(_) => Ok(Value::Seq(None)),
            TypeRef::Map(_, _) => Ok(Value::Map(None)),
            TypeRef::Opaque(_) => Ok(Value::Nil),
        }
    }

    pub fn zero_basic(kind: BasicKind) -> Self {
        match kind {
            BasicKind::Bool => Value::Bool(false),
            BasicKind::String => Value::Str(String::new()),
            k if k.is_signed() => Value::Int(0),
            k if k.is_unsigned() => Value::Uint(0),
            _ => Value::Float(0.0),
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Record behind a non-nil reference; `Ok(None)` for nil.
    pub fn deref_record(&self) -> Result<Option<&RecordValue>, ConvertError> {
        match self {
            Value::Ref(None) => Ok(None),
            Value::Ref(Some(inner)) => inner
                .as_record()
                .map(Some)
                .ok_or_else(|| ConvertError::shape("reference does not point to a record")),
            _ => Err(ConvertError::shape("value is not a reference")),
        }
    }

    /// Explicit basic conversion with truncating numeric semantics.
    ///
    /// Only same-kind and numeric-to-numeric conversions are defined.
    pub fn cast(&self, kind: BasicKind) -> Result<Value, ConvertError> {
        match (self, kind) {
            (Value::Bool(b), BasicKind::Bool) => Ok(Value::Bool(*b)),
            (Value::Str(s), BasicKind::String) => Ok(Value::Str(s.clone())),
            (Value::Int(_) | Value::Uint(_) | Value::Float(_), k) if k.is_numeric() => {
                Ok(self.cast_numeric(k))
            }
            _ => Err(ConvertError::conversion(format!(
                "can not convert {self:?} to {}",
                kind.name()
            ))),
        }
    }

    fn cast_numeric(&self, kind: BasicKind) -> Value {
        if kind.is_float() {
            let f = match *self {
                Value::Int(v) => v as f64,
                Value::Uint(v) => v as f64,
                Value::Float(v) => v,
                _ => 0.0,
            };
            return match kind {
                BasicKind::Float32 => Value::Float(f as f32 as f64),
                _ => Value::Float(f),
            };
        }

        if kind.is_signed() {
            let v = match *self {
                Value::Int(v) => v,
                Value::Uint(v) => v as i64,
                Value::Float(v) => v as i64,
                _ => 0,
            };
            return Value::Int(match kind {
                BasicKind::Int8 => v as i8 as i64,
                BasicKind::Int16 => v as i16 as i64,
                BasicKind::Int32 => v as i32 as i64,
                _ => v,
            });
        }

        let v = match *self {
            Value::Int(v) => v as u64,
            Value::Uint(v) => v,
            Value::Float(v) => v as u64,
            _ => 0,
        };
        Value::Uint(match kind {
            BasicKind::Uint8 => v as u8 as u64,
            BasicKind::Uint16 => v as u16 as u64,
            BasicKind::Uint32 => v as u32 as u64,
            _ => v,
        })
    }
}

impl From<RecordValue> for Value {
    fn from(value: RecordValue) -> Self {
        Value::Record(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

/// Instance of a record type. Fields keep declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    pub ty: TypeIdentity,
    pub fields: Vec<(String, Value)>,
}

impl RecordValue {
    pub fn new(ty: TypeIdentity) -> Self {
        Self {
            ty,
            fields: Vec::new(),
        }
    }

    /// Record with every declared field at its zero value.
    pub fn zero(ty: &TypeIdentity, model: &ObjectModel) -> Result<Self, ConvertError> {
        let decls = model
            .record_fields(ty)
            .ok_or_else(|| ConvertError::model(format!("{ty} is not a record")))?;
        let mut fields = Vec::with_capacity(decls.len());
        for decl in decls {
            fields.push((decl.name.clone(), Value::zero_of(&decl.ty, model)?));
        }
        Ok(Self {
            ty: ty.clone(),
            fields,
        })
    }

    /// Builder-style setter, used to write literals.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Overwrite a field, appending it when absent.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDecl, ModelBuilder, TypeDecl};

    #[test]
    fn casts_truncate_like_fixed_width_integers() {
        assert_eq!(Value::Int(300).cast(BasicKind::Int8).unwrap(), Value::Int(44));
        assert_eq!(Value::Int(-1).cast(BasicKind::Uint16).unwrap(), Value::Uint(65535));
        assert_eq!(Value::Float(2.9).cast(BasicKind::Int).unwrap(), Value::Int(2));
        assert_eq!(Value::Uint(7).cast(BasicKind::Float64).unwrap(), Value::Float(7.0));
        assert!(Value::Int(1).cast(BasicKind::String).is_err());
    }

    #[test]
    fn zero_records_follow_declaration() {
        let model = ModelBuilder::new()
            .type_decl("p", TypeDecl::alias("S", TypeRef::Basic(BasicKind::String)))
            .type_decl(
                "p",
                TypeDecl::record(
                    "R",
                    vec![
                        FieldDecl::new("Name", TypeRef::named("p", "S")),
                        FieldDecl::new("Count", TypeRef::Basic(BasicKind::Uint8)),
                        FieldDecl::new("Next", TypeRef::reference(TypeRef::named("p", "R"))),
                        FieldDecl::new("Tags", TypeRef::seq(TypeRef::Basic(BasicKind::String))),
                    ],
                ),
            )
            .build();

        let zero = RecordValue::zero(&TypeIdentity::new("p", "R"), &model).unwrap();
        assert_eq!(
            zero,
            RecordValue::new(TypeIdentity::new("p", "R"))
                .with("Name", "")
                .with("Count", Value::Uint(0))
                .with("Next", Value::nil())
                .with("Tags", Value::Seq(None))
        );
    }
}
