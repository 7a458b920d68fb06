use std::any::Any;
use std::fmt;

use crate::error::ConvertError;
use crate::model::{TypeDecl, TypeIdentity, TypeRef};
use crate::value::{RecordValue, Value};

/// Runtime type tag of a convertible value.
///
/// Dispatch is keyed by shape pairs, never by inspecting live values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Reference to a record (`*T`).
    Record(TypeIdentity),
    /// Sequence of references to records (`[]*T`).
    Sequence(TypeIdentity),
    /// Anything else. Never registrable.
    Other(String),
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Record(id) => write!(f, "*{id}"),
            Shape::Sequence(id) => write!(f, "[]*{id}"),
            Shape::Other(name) => f.write_str(name),
        }
    }
}

impl Shape {
    /// Registrable shape pair of a conversion signature: `*A -> *B`, or
    /// `[]*A -> *[]*B` for sequences.
    pub fn pair_of(arg: &TypeRef, out: &TypeRef) -> Result<(Shape, Shape), ConvertError> {
        match (arg, out) {
            (TypeRef::Seq(_), TypeRef::Seq(_)) => Err(ConvertError::shape(
                "second param must be reference to sequence",
            )),
            (TypeRef::Seq(arg_elem), TypeRef::Ref(out_seq)) if matches!(**out_seq, TypeRef::Seq(_)) => {
                let TypeRef::Seq(out_elem) = out_seq.as_ref() else {
                    return Err(ConvertError::shape("must be sequence of references"));
                };
                match (arg_elem.ref_to_named(), out_elem.ref_to_named()) {
                    (Some(a), Some(b)) => Ok((Shape::Sequence(a.clone()), Shape::Sequence(b.clone()))),
                    _ => Err(ConvertError::shape("must be sequence of references")),
                }
            }
            (TypeRef::Seq(_), _) | (_, TypeRef::Seq(_)) => {
                Err(ConvertError::shape("both types must match"))
            }
            _ => match (arg.ref_to_named(), out.ref_to_named()) {
                (Some(a), Some(b)) => Ok((Shape::Record(a.clone()), Shape::Record(b.clone()))),
                _ => Err(ConvertError::shape("must be reference")),
            },
        }
    }
}

/// A value the runtime scheme can convert from or into.
pub trait Convertible: Any + Send + 'static {
    fn shape(&self) -> Shape;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Convertible {
    pub fn downcast_ref<T: Convertible>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Convertible>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// A statically declared record type. Implemented by `#[derive(Record)]`.
pub trait Record: Convertible + Sized {
    fn identity() -> TypeIdentity;

    /// Declaration of the type for the object model.
    fn declaration() -> TypeDecl;
}

impl Convertible for RecordValue {
    fn shape(&self) -> Shape {
        Shape::Record(self.ty.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Dynamic sequence of references to records of type `elem`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSeq {
    pub elem: TypeIdentity,
    /// `None` is the nil sequence. Items are `Value::Ref`.
    pub items: Option<Vec<Value>>,
}

impl ValueSeq {
    pub fn new(elem: TypeIdentity) -> Self {
        Self { elem, items: None }
    }

    pub fn of(elem: TypeIdentity, records: Vec<RecordValue>) -> Self {
        Self {
            elem,
            items: Some(records.into_iter().map(Value::some).collect()),
        }
    }
}

impl Convertible for ValueSeq {
    fn shape(&self) -> Shape {
        Shape::Sequence(self.elem.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Typed sequence of derived records. `None` is the nil sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSeq<T>(pub Option<Vec<T>>);

impl<T> Default for RecordSeq<T> {
    fn default() -> Self {
        RecordSeq(None)
    }
}

impl<T: Record> Convertible for RecordSeq<T> {
    fn shape(&self) -> Shape {
        Shape::Sequence(T::identity())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> TypeRef {
        TypeRef::named("p", name)
    }

    #[test]
    fn shape_pairs_follow_signature_rules() {
        let a = TypeIdentity::new("p", "A");
        let b = TypeIdentity::new("p", "B");

        let (arg, out) =
            Shape::pair_of(&TypeRef::reference(named("A")), &TypeRef::reference(named("B"))).unwrap();
        assert_eq!((arg, out), (Shape::Record(a.clone()), Shape::Record(b.clone())));

        let seq_a = TypeRef::seq(TypeRef::reference(named("A")));
        let seq_b = TypeRef::seq(TypeRef::reference(named("B")));
        let (arg, out) = Shape::pair_of(&seq_a, &TypeRef::reference(seq_b.clone())).unwrap();
        assert_eq!((arg, out), (Shape::Sequence(a), Shape::Sequence(b)));

        assert!(Shape::pair_of(&seq_a, &seq_b).is_err());
        assert!(Shape::pair_of(&seq_a, &TypeRef::reference(named("B"))).is_err());
        assert!(Shape::pair_of(&named("A"), &named("B")).is_err());
        let plain_seq = TypeRef::reference(TypeRef::seq(named("B")));
        assert!(Shape::pair_of(&seq_a, &plain_seq).is_err());
    }
}
