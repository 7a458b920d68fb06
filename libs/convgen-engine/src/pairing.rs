//! Pair identities between record types.
//!
//! Rules are tried in order by callers; an invalid pair is `None` and means
//! "not applicable", never an error.

use convgen_api::model::{ObjectModel, TypeIdentity, TypeRef};
use convgen_api::plan::ConvertPair;
use convgen_api::record::Shape;

/// Named record type behind `*T`.
fn ref_to_record<'m>(model: &'m ObjectModel, ty: &'m TypeRef) -> Option<&'m TypeIdentity> {
    let id = ty.ref_to_named()?;
    model.type_decl(id)?.is_record().then_some(id)
}

/// Element record of `[]*T`, following named sequence types.
fn seq_of_ref_to_record<'m>(model: &'m ObjectModel, ty: &'m TypeRef) -> Option<&'m TypeIdentity> {
    match model.underlying(ty) {
        TypeRef::Seq(elem) => ref_to_record(model, elem),
        _ => None,
    }
}

/// `*A` and `*B` → `(A, B)`.
pub fn pair_with_ref(model: &ObjectModel, arg: &TypeRef, out: &TypeRef) -> Option<ConvertPair> {
    let arg = ref_to_record(model, arg)?;
    let out = ref_to_record(model, out)?;
    Some(ConvertPair::new(arg.clone(), out.clone()))
}

/// `[]*A` and `[]*B` → `(A, B)`.
pub fn pair_with_seq(model: &ObjectModel, arg: &TypeRef, out: &TypeRef) -> Option<ConvertPair> {
    let arg = seq_of_ref_to_record(model, arg)?;
    let out = seq_of_ref_to_record(model, out)?;
    Some(ConvertPair::new(arg.clone(), out.clone()))
}

/// Pair of two field types, sequence rule first. The flag marks a
/// sequence-level pair.
pub fn pair_of_fields(
    model: &ObjectModel,
    arg: &TypeRef,
    out: &TypeRef,
) -> Option<(ConvertPair, bool)> {
    if let Some(pair) = pair_with_seq(model, arg, out) {
        return Some((pair, true));
    }
    pair_with_ref(model, arg, out).map(|pair| (pair, false))
}

/// Pair of a low-level conversion signature: `*A -> *B`, or
/// `[]*A -> *[]*B` for sequences.
pub fn boundary_pair(arg: &TypeRef, out: &TypeRef) -> Option<(ConvertPair, bool)> {
    match Shape::pair_of(arg, out).ok()? {
        (Shape::Record(a), Shape::Record(b)) => Some((ConvertPair::new(a, b), false)),
        (Shape::Sequence(a), Shape::Sequence(b)) => Some((ConvertPair::new(a, b), true)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convgen_api::model::{BasicKind, ModelBuilder, TypeDecl};

    fn model() -> ObjectModel {
        ModelBuilder::new()
            .type_decl("p", TypeDecl::record("A", vec![]))
            .type_decl("p", TypeDecl::record("B", vec![]))
            .type_decl("p", TypeDecl::alias("S", TypeRef::Basic(BasicKind::String)))
            .type_decl(
                "p",
                TypeDecl::alias("As", TypeRef::seq(TypeRef::reference(TypeRef::named("p", "A")))),
            )
            .build()
    }

    fn ptr(name: &str) -> TypeRef {
        TypeRef::reference(TypeRef::named("p", name))
    }

    #[test]
    fn pairs_references_to_records() {
        let model = model();
        let pair = pair_with_ref(&model, &ptr("A"), &ptr("B")).unwrap();
        assert_eq!(pair.arg.name, "A");
        assert_eq!(pair.out.name, "B");

        assert_eq!(pair_with_ref(&model, &ptr("A"), &ptr("S")), None);
        assert_eq!(pair_with_ref(&model, &TypeRef::named("p", "A"), &ptr("B")), None);
    }

    #[test]
    fn pairs_sequences_before_references() {
        let model = model();
        let (pair, sequence) =
            pair_of_fields(&model, &TypeRef::named("p", "As"), &TypeRef::seq(ptr("B"))).unwrap();
        assert!(sequence);
        assert_eq!(pair.arg.name, "A");

        let (_, sequence) = pair_of_fields(&model, &ptr("A"), &ptr("B")).unwrap();
        assert!(!sequence);

        assert_eq!(pair_of_fields(&model, &TypeRef::seq(ptr("A")), &ptr("B")), None);
    }

    #[test]
    fn boundary_accepts_sequence_to_reference_of_sequence() {
        let arg = TypeRef::seq(ptr("A"));
        let out = TypeRef::reference(TypeRef::seq(ptr("B")));
        let (_, sequence) = boundary_pair(&arg, &out).unwrap();
        assert!(sequence);
        assert_eq!(boundary_pair(&arg, &TypeRef::seq(ptr("B"))), None);
    }
}
