//! End to end: object model → generator → executor → scheme.

use std::sync::Arc;

use convgen_api::error::ConvertError;
use convgen_api::model::{
    BasicKind, Directive, FieldDecl, FuncDecl, ModelBuilder, ObjectModel, TypeDecl, TypeIdentity, TypeRef,
};
use convgen_api::plan::{CustomShape, Embedding, FieldValue, Note, PackageOutput};
use convgen_api::record::ValueSeq;
use convgen_api::value::{RecordValue, Value};
use convgen_engine::emit::{JsonSink, MultiSink, ReportSink, file_stem};
use convgen_engine::{GenError, Generator};
use convgen_scheme::exec::{Bodies, Executor, OverrideImpl};
use convgen_scheme::{Item, Scheme, SchemeBuilder};
use pretty_assertions::assert_eq;

const P: &str = "example.com/tests";

fn id(name: &str) -> TypeIdentity {
    TypeIdentity::new(P, name)
}

fn named(name: &str) -> TypeRef {
    TypeRef::named(P, name)
}

fn ptr(name: &str) -> TypeRef {
    TypeRef::reference(named(name))
}

fn basic(kind: BasicKind) -> TypeRef {
    TypeRef::Basic(kind)
}

fn field(name: &str, ty: TypeRef) -> FieldDecl {
    FieldDecl::new(name, ty)
}

fn convert_type(target: &str) -> Directive {
    Directive::new("convert:type", target)
}

fn value_field(kind: BasicKind) -> Vec<FieldDecl> {
    vec![field("Value", basic(kind))]
}

fn xyz(mut fields: Vec<FieldDecl>) -> Vec<FieldDecl> {
    for name in ["X", "Y", "Z"] {
        fields.push(field(name, basic(BasicKind::Int)));
    }
    fields
}

fn model() -> ObjectModel {
    let string = || basic(BasicKind::String);
    ModelBuilder::new()
        .directive(P, Directive::new("gen:convert", P))
        .type_decl(P, TypeDecl::alias("S", string()))
        .type_decl(
            P,
            TypeDecl::record(
                "A",
                vec![
                    field("Value", basic(BasicKind::Int)),
                    field("Int", basic(BasicKind::Int64)),
                    field("String", string()),
                    field("Strings", TypeRef::seq(string())),
                    field("C", ptr("C0")),
                    field("Cs", TypeRef::seq(ptr("C0"))),
                    field("D", ptr("D0")),
                    field("Ds", TypeRef::seq(ptr("D0"))),
                    field("E", named("E")),
                    field("Ep", ptr("E")),
                    field("Es", TypeRef::seq(named("E"))),
                    field("Eps", TypeRef::seq(ptr("E"))),
                ],
            ),
        )
        .type_decl(
            P,
            TypeDecl::record(
                "B",
                vec![
                    field("Value", string()),
                    field("Int", basic(BasicKind::Int32)),
                    field("String", named("S")),
                    field("Strings", TypeRef::seq(string())),
                    field("C", ptr("C1")),
                    field("Cs", TypeRef::seq(ptr("C1"))),
                    field("D", ptr("D1")),
                    field("Ds", TypeRef::seq(ptr("D1"))),
                    field("E", named("E")),
                    field("Ep", ptr("E")),
                    field("Es", TypeRef::seq(named("E"))),
                    field("Eps", TypeRef::seq(ptr("E"))),
                ],
            )
            .with_directive(convert_type("A")),
        )
        .type_decl(P, TypeDecl::record("C0", value_field(BasicKind::Int)))
        .type_decl(
            P,
            TypeDecl::record("C1", value_field(BasicKind::String)).with_directive(convert_type("C0")),
        )
        .type_decl(
            P,
            TypeDecl::record("C2", xyz(vec![FieldDecl::embedded("C0", named("C0"))]))
                .with_directive(convert_type("C0")),
        )
        .type_decl(
            P,
            TypeDecl::record("C3", xyz(vec![FieldDecl::embedded("C0", ptr("C0"))]))
                .with_directive(convert_type("C0")),
        )
        .type_decl(P, TypeDecl::record("D0", value_field(BasicKind::String)))
        .type_decl(
            P,
            TypeDecl::record("D1", value_field(BasicKind::String)).with_directive(convert_type("D0")),
        )
        .type_decl(P, TypeDecl::record("E", value_field(BasicKind::String)))
        .function(P, FuncDecl::new("ConvertAB", vec![ptr("A"), ptr("B")], vec![]))
        .function(P, FuncDecl::new("ConvertC01", vec![ptr("C0")], vec![ptr("C1")]))
        .function(P, FuncDecl::new("ConvertC10", vec![ptr("C1"), ptr("C0")], vec![ptr("C0")]))
        .build()
}

fn int_of(record: &RecordValue) -> i64 {
    match record.get("Value") {
        Some(Value::Int(v)) => *v,
        _ => 0,
    }
}

fn str_of(record: &RecordValue) -> String {
    match record.get("Value") {
        Some(Value::Str(s)) => s.clone(),
        _ => String::new(),
    }
}

fn convert_ab(a: &RecordValue, b: &mut RecordValue, bodies: &Bodies<'_>) -> Result<(), ConvertError> {
    bodies.body(a, b)?;
    b.set("Value", Value::str(int_of(a).to_string()));
    Ok(())
}

fn convert_c01(c0: Option<&RecordValue>, bodies: &Bodies<'_>) -> Result<Option<RecordValue>, ConvertError> {
    let Some(c0) = c0 else {
        return Ok(None);
    };
    let mut c1 = bodies.zero(&id("C1"))?;
    bodies.body(c0, &mut c1)?;
    c1.set("Value", Value::str(int_of(c0).to_string()));
    Ok(Some(c1))
}

fn convert_c10(
    c1: Option<&RecordValue>,
    c0: Option<RecordValue>,
    bodies: &Bodies<'_>,
) -> Result<Option<RecordValue>, ConvertError> {
    let Some(c1) = c1 else {
        return Ok(None);
    };
    let mut c0 = match c0 {
        Some(c0) => c0,
        None => bodies.zero(&id("C0"))?,
    };
    bodies.body(c1, &mut c0)?;
    c0.set("Value", Value::Int(str_of(c1).parse()?));
    Ok(Some(c0))
}

fn generate(model: &ObjectModel) -> Vec<PackageOutput> {
    Generator::new(model).generate().unwrap()
}

fn scheme() -> (Scheme, Arc<Executor>) {
    let model = model();
    let outputs = generate(&model);
    let exec = Arc::new(
        Executor::new(model, outputs)
            .with_override(P, "ConvertAB", OverrideImpl::mutate(convert_ab))
            .with_override(P, "ConvertC01", OverrideImpl::transform(convert_c01))
            .with_override(P, "ConvertC10", OverrideImpl::mutate_return(convert_c10)),
    );
    let scheme = Scheme::build([|b: &mut SchemeBuilder| exec.register(b)]).unwrap();
    (scheme, exec)
}

fn c0(value: i64) -> RecordValue {
    RecordValue::new(id("C0")).with("Value", Value::Int(value))
}

fn labelled(ty: &str, value: &str) -> RecordValue {
    RecordValue::new(id(ty)).with("Value", value)
}

fn refs(records: Vec<RecordValue>) -> Value {
    Value::seq(records.into_iter().map(Value::some).collect())
}

fn convert(scheme: &Scheme, arg: &mut RecordValue, out: &mut RecordValue) {
    scheme.convert(&mut [Item::value(arg), Item::value(out)]).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// Generation
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn resolves_package_notes_and_registrations() {
    let outputs = generate(&model());
    assert_eq!(outputs.len(), 1);
    let output = &outputs[0];

    assert_eq!(output.package, P);
    assert_eq!(
        output.custom_conversions,
        vec![
            Note::new("ConvertAB", "in use"),
            Note::new("ConvertC01", "in use"),
            Note::new("ConvertC10", "in use"),
        ]
    );
    assert!(output.ignored_functions.is_empty());

    // A↔B, C0↔C1, C0↔C2, C0↔C3, D0↔D1; public and plural for each direction.
    assert_eq!(output.plans.len(), 10);
    assert_eq!(output.registrations.len(), 20);

    let publics: Vec<&str> = output.plans.iter().map(|p| p.names.public.as_str()).collect();
    assert_eq!(
        publics,
        vec![
            "Convert_B_A",
            "Convert_A_B",
            "Convert_C1_C0",
            "Convert_C0_C1",
            "Convert_C2_C0",
            "Convert_C0_C2",
            "Convert_C3_C0",
            "Convert_C0_C3",
            "Convert_D1_D0",
            "Convert_D0_D1",
        ]
    );
    assert_eq!(output.registrations[1].function, "Convert_Bs_As");
    assert!(output.registrations[1].sequence);
}

#[test]
fn plans_carry_field_decisions_and_overrides() {
    let outputs = generate(&model());
    let output = &outputs[0];

    let ab = output
        .plan(&convgen_api::plan::ConvertPair::new(id("A"), id("B")))
        .unwrap();
    let custom = ab.descriptor.custom.as_ref().unwrap();
    assert_eq!((custom.name.as_str(), custom.shape), ("ConvertAB", CustomShape::Mutate));

    let decisions: Vec<(&str, &FieldValue)> =
        ab.fields.iter().map(|f| (f.out.name.as_str(), &f.value)).collect();
    assert_eq!(decisions[0], ("Value", &FieldValue::Mismatch));
    assert_eq!(decisions[1], ("Int", &FieldValue::Cast { kind: BasicKind::Int32 }));
    assert_eq!(decisions[2], ("String", &FieldValue::Cast { kind: BasicKind::String }));
    assert_eq!(decisions[3], ("Strings", &FieldValue::Assign));
    assert!(matches!(decisions[5].1, FieldValue::Delegate { sequence: true, .. }));
    assert_eq!(decisions[8], ("E", &FieldValue::Assign));

    let c0_c3 = output
        .plan(&convgen_api::plan::ConvertPair::new(id("C0"), id("C3")))
        .unwrap();
    assert_eq!(c0_c3.embedding, Embedding::Out(FieldDecl::embedded("C0", ptr("C0"))));
    let c2_c0 = output
        .plan(&convgen_api::plan::ConvertPair::new(id("C2"), id("C0")))
        .unwrap();
    assert_eq!(c2_c0.embedding, Embedding::Arg(FieldDecl::embedded("C0", named("C0"))));
    assert!(c2_c0.fields.is_empty());
}

#[test]
fn invalid_scope_names_the_package() {
    let model = ModelBuilder::new()
        .directive(P, Directive::new("gen:convert", "a -> b -> c"))
        .build();
    let err = Generator::new(&model).generate().unwrap_err();
    assert!(matches!(err, GenError::InvalidDirective(_)), "{err}");
}

#[test]
fn package_filter_replaces_directive_selection() {
    let model = model();
    let outputs = Generator::new(&model)
        .with_packages(vec!["example.com/other".to_string()])
        .generate()
        .unwrap();
    assert!(outputs.is_empty());

    let outputs = Generator::new(&model)
        .with_packages(vec!["tests".to_string()])
        .generate()
        .unwrap();
    assert_eq!(outputs.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Runtime
// ═══════════════════════════════════════════════════════════════════════════

fn sample_a() -> RecordValue {
    RecordValue::new(id("A"))
        .with("Value", Value::Int(10))
        .with("Int", Value::Int(100))
        .with("String", "hello")
        .with("Strings", Value::seq(vec![Value::str("one"), Value::str("two")]))
        .with("C", Value::some(c0(-10)))
        .with("Cs", refs(vec![c0(-100), c0(-200)]))
        .with("D", Value::some(labelled("D0", "first")))
        .with("Ds", refs(vec![labelled("D0", "second"), labelled("D0", "third")]))
        .with("E", labelled("E", "first"))
        .with("Ep", Value::some(labelled("E", "first")))
        .with("Es", Value::seq(vec![labelled("E", "second").into(), labelled("E", "third").into()]))
        .with("Eps", refs(vec![labelled("E", "second"), labelled("E", "third")]))
}

#[test]
fn converts_a_to_b() {
    let (scheme, exec) = scheme();
    let mut a = sample_a();
    let mut b = RecordValue::zero(&id("B"), exec.model()).unwrap();

    convert(&scheme, &mut a, &mut b);

    assert_eq!(b.get("Value"), Some(&Value::str("10")));
    assert_eq!(b.get("Int"), Some(&Value::Int(100)));
    assert_eq!(b.get("String"), Some(&Value::str("hello")));
    assert_eq!(b.get("Strings"), a.get("Strings"));
    assert_eq!(b.get("C"), Some(&Value::some(labelled("C1", "-10"))));
    assert_eq!(
        b.get("Cs"),
        Some(&refs(vec![labelled("C1", "-100"), labelled("C1", "-200")]))
    );
    assert_eq!(b.get("D"), Some(&Value::some(labelled("D1", "first"))));
    assert_eq!(
        b.get("Ds"),
        Some(&refs(vec![labelled("D1", "second"), labelled("D1", "third")]))
    );
    for name in ["E", "Ep", "Es", "Eps"] {
        assert_eq!(b.get(name), a.get(name), "field {name}");
    }
}

#[test]
fn round_trip_keeps_convertible_fields() {
    let (scheme, exec) = scheme();
    let mut a = sample_a();
    let mut b = RecordValue::zero(&id("B"), exec.model()).unwrap();
    let mut back = RecordValue::zero(&id("A"), exec.model()).unwrap();
    scheme
        .convert_chain(&mut [Item::value(&mut a), Item::value(&mut b), Item::value(&mut back)])
        .unwrap();

    for name in ["Int", "String", "Strings", "C", "Cs", "D", "Ds", "E", "Ep", "Es", "Eps"] {
        assert_eq!(back.get(name), a.get(name), "field {name}");
    }
    // Only A→B has an override for Value; string to int does not match.
    assert_eq!(back.get("Value"), Some(&Value::Int(0)));
}

#[test]
fn converts_sequences_of_a_to_b() {
    let (scheme, _) = scheme();
    let a = |v| RecordValue::new(id("A")).with("Value", Value::Int(v));
    let mut args = ValueSeq::of(id("A"), vec![a(10), a(20)]);
    let mut outs = ValueSeq::new(id("B"));

    scheme
        .convert(&mut [Item::value(&mut args), Item::value(&mut outs)])
        .unwrap();

    let items = outs.items.unwrap();
    assert_eq!(items.len(), 2);
    let values: Vec<String> = items
        .iter()
        .map(|v| str_of(v.deref_record().unwrap().unwrap()))
        .collect();
    assert_eq!(values, vec!["10", "20"]);
}

#[test]
fn nil_sequence_stays_nil() {
    let (scheme, _) = scheme();
    let mut args = ValueSeq::new(id("A"));
    let mut outs = ValueSeq::of(id("B"), vec![]);
    scheme
        .convert(&mut [Item::value(&mut args), Item::value(&mut outs)])
        .unwrap();
    assert_eq!(outs.items, None);
}

#[test]
fn shape_three_override_parses_back() {
    let (scheme, exec) = scheme();
    let mut c1 = labelled("C1", "42");
    let mut out = RecordValue::zero(&id("C0"), exec.model()).unwrap();
    convert(&scheme, &mut c1, &mut out);
    assert_eq!(int_of(&out), 42);

    let mut bad = labelled("C1", "forty-two");
    let err = scheme
        .convert(&mut [Item::value(&mut bad), Item::value(&mut out)])
        .unwrap_err();
    assert!(err.to_string().contains("invalid digit"), "{err}");
}

#[test]
fn converts_through_embedded_values() {
    let (scheme, exec) = scheme();
    let zero = |name: &str| RecordValue::zero(&id(name), exec.model()).unwrap();

    let mut to = zero("C2");
    convert(&scheme, &mut c0(100), &mut to);
    assert_eq!(to.get("C0"), Some(&Value::Record(c0(100))));

    let mut from = zero("C2");
    from.set("C0", Value::Record(c0(100)));
    let mut to = zero("C0");
    convert(&scheme, &mut from, &mut to);
    assert_eq!(int_of(&to), 100);

    let mut to = zero("C3");
    convert(&scheme, &mut c0(100), &mut to);
    assert_eq!(to.get("C0"), Some(&Value::some(c0(100))));

    let mut from = zero("C3");
    from.set("C0", Value::some(c0(100)));
    let mut to = zero("C0");
    convert(&scheme, &mut from, &mut to);
    assert_eq!(int_of(&to), 100);
}

#[test]
fn nil_embedded_reference_is_an_error() {
    let (scheme, exec) = scheme();
    let mut from = RecordValue::zero(&id("C3"), exec.model()).unwrap();
    let mut to = RecordValue::zero(&id("C0"), exec.model()).unwrap();
    let err = scheme
        .convert(&mut [Item::value(&mut from), Item::value(&mut to)])
        .unwrap_err();
    assert!(err.to_string().contains("embedded field C0 is nil"), "{err}");
}

#[test]
fn missing_override_fails_registration() {
    let model = model();
    let outputs = generate(&model);
    let exec = Arc::new(Executor::new(model, outputs));
    let err = Scheme::build([|b: &mut SchemeBuilder| exec.register(b)]).unwrap_err();
    assert!(err.to_string().contains("no implementation for custom conversion"), "{err}");
}

// ═══════════════════════════════════════════════════════════════════════════
// Emission
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn sinks_write_plan_and_report_files() {
    let model = model();
    let dir = tempfile::tempdir().unwrap();

    let mut sink = MultiSink::new();
    sink.push(JsonSink::new(dir.path()));
    sink.push(ReportSink::new(dir.path()));
    let count = Generator::new(&model).run(sink).unwrap();
    assert_eq!(count, 10);

    let stem = file_stem(P);
    let json = std::fs::read_to_string(dir.path().join(format!("{stem}.plan.json"))).unwrap();
    let parsed: PackageOutput = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, generate(&model).remove(0));

    let report = std::fs::read_to_string(dir.path().join(format!("{stem}.report.txt"))).unwrap();
    assert!(report.starts_with("// package example.com/tests\n"));
    assert!(report.contains("    ConvertAB           // in use\n"));
    assert!(report.contains("Ignored functions: (none)"));
    assert!(report.contains("//-- convert example.com/tests.A --//"));
    assert!(report.contains("    // delegates to ConvertAB (shape 2)"));
    assert!(report.contains("out.Cs = Convert_C0s_C1s(arg.Cs)"));
    assert!(report.contains("out.C0 = arg    // embedded"));
}
