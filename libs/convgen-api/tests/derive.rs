use convgen_api::Record;
use convgen_api::model::{BasicKind, Directive, FieldDecl, ModelBuilder, TypeIdentity, TypeRef};
use convgen_api::record::{Convertible, Record as _, RecordSeq, Shape};
use pretty_assertions::assert_eq;

#[derive(Record, Debug, Default, PartialEq)]
#[record(package = "example.com/tests")]
pub struct C0 {
    #[record(rename = "Value")]
    pub value: i64,
}

#[derive(Record, Debug, Default, PartialEq)]
#[record(package = "example.com/tests", directive = "+convert:type=C0")]
pub struct C3 {
    #[record(embedded, rename = "C0")]
    pub base: Option<Box<C0>>,
    #[record(rename = "X")]
    pub x: i32,
    #[record(rename = "Tags")]
    pub tags: Option<Vec<String>>,
    #[record(rename = "Children")]
    pub children: Vec<Option<Box<C0>>>,
}

#[derive(Record)]
pub struct Local {
    pub flag: bool,
}

#[test]
fn derives_identity_and_declaration() {
    assert_eq!(C0::identity(), TypeIdentity::new("example.com/tests", "C0"));

    let decl = C3::declaration();
    assert_eq!(decl.name, "C3");
    assert_eq!(decl.directives, vec![Directive::new("convert:type", "C0")]);
    assert_eq!(
        decl.fields().unwrap(),
        &[
            FieldDecl::embedded(
                "C0",
                TypeRef::reference(TypeRef::named("example.com/tests", "C0"))
            ),
            FieldDecl::new("X", TypeRef::Basic(BasicKind::Int32)),
            FieldDecl::new("Tags", TypeRef::seq(TypeRef::Basic(BasicKind::String))),
            FieldDecl::new(
                "Children",
                TypeRef::seq(TypeRef::reference(TypeRef::named("example.com/tests", "C0")))
            ),
        ]
    );
}

#[test]
fn package_defaults_to_module_path() {
    assert_eq!(Local::identity().package, module_path!());
    assert_eq!(Local::identity().name, "Local");
}

#[test]
fn derived_records_are_convertible() {
    let mut value = C0 { value: 5 };
    let dynamic: &mut dyn Convertible = &mut value;
    assert_eq!(dynamic.shape(), Shape::Record(C0::identity()));
    dynamic.downcast_mut::<C0>().unwrap().value = 6;
    assert_eq!(value.value, 6);

    let seq = RecordSeq::<C0>(None);
    assert_eq!(seq.shape(), Shape::Sequence(C0::identity()));
}

#[test]
fn derived_declarations_build_a_model() {
    let model = ModelBuilder::new().record::<C0>().record::<C3>().build();
    assert!(model.type_decl(&C3::identity()).is_some());
    assert_eq!(
        model.basic_kind(&TypeRef::Basic(BasicKind::Int64)),
        Some(BasicKind::Int64)
    );
    assert_eq!(model.packages.len(), 1);
}
