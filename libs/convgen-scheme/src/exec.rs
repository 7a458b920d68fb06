//! Plan executor: runs emitted conversion plans over dynamic values and
//! binds their registrations into a [`SchemeBuilder`].
//!
//! Function semantics, per plan direction:
//!
//! - public (`Convert_A_B` / `Apply_A_B`): nil input gives nil; a missing
//!   output is allocated; then the body runs. A custom override replaces
//!   this with a delegator keeping the override's contract.
//! - body (`convert_A_B` / `apply_A_B`): embedding copy, then every field
//!   decision in output field order.
//! - plural (`Convert_As_Bs`): nil gives nil; otherwise each element is
//!   converted into a fresh zero value, preserving length and order.
//!
//! `Null*` wrapper fields of update plans call the wrapper's registered
//! `Apply` implementation with the input field and the current output.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use convgen_api::error::ConvertError;
use convgen_api::model::{ObjectModel, TypeIdentity, TypeRef};
use convgen_api::plan::{
    ConversionPlan, ConvertPair, CustomShape, Embedding, FieldValue, FuncNames, Mode, PackageOutput,
};
use convgen_api::record::{Convertible, Shape, ValueSeq};
use convgen_api::value::{RecordValue, Value};

use crate::{SchemeBuilder, SchemeError};

type TransformFn =
    dyn Fn(Option<&RecordValue>, &Bodies<'_>) -> Result<Option<RecordValue>, ConvertError> + Send + Sync;
type MutateFn = dyn Fn(&RecordValue, &mut RecordValue, &Bodies<'_>) -> Result<(), ConvertError> + Send + Sync;
type MutateReturnFn = dyn Fn(Option<&RecordValue>, Option<RecordValue>, &Bodies<'_>) -> Result<Option<RecordValue>, ConvertError>
    + Send
    + Sync;
type ApplyFn = dyn Fn(&Value, &Value) -> Result<Value, ConvertError> + Send + Sync;

/// Implementation of a user conversion function, by signature shape.
pub enum OverrideImpl {
    /// `out = f(arg)`
    Transform(Box<TransformFn>),
    /// `f(arg, out)`
    Mutate(Box<MutateFn>),
    /// `out = f(arg, out)`
    MutateReturn(Box<MutateReturnFn>),
}

impl OverrideImpl {
    pub fn transform(
        f: impl Fn(Option<&RecordValue>, &Bodies<'_>) -> Result<Option<RecordValue>, ConvertError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        OverrideImpl::Transform(Box::new(f))
    }

    pub fn mutate(
        f: impl Fn(&RecordValue, &mut RecordValue, &Bodies<'_>) -> Result<(), ConvertError> + Send + Sync + 'static,
    ) -> Self {
        OverrideImpl::Mutate(Box::new(f))
    }

    pub fn mutate_return(
        f: impl Fn(Option<&RecordValue>, Option<RecordValue>, &Bodies<'_>) -> Result<Option<RecordValue>, ConvertError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        OverrideImpl::MutateReturn(Box::new(f))
    }

    fn shape(&self) -> CustomShape {
        match self {
            OverrideImpl::Transform(_) => CustomShape::Transform,
            OverrideImpl::Mutate(_) => CustomShape::Mutate,
            OverrideImpl::MutateReturn(_) => CustomShape::MutateReturn,
        }
    }
}

impl fmt::Debug for OverrideImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OverrideImpl({:?})", self.shape())
    }
}

/// Handle given to overrides so they can call the generated bodies of the
/// package they live in.
pub struct Bodies<'e> {
    executor: &'e Executor,
    package: &'e str,
}

impl Bodies<'_> {
    /// Run the generated body for `(arg.ty, out.ty)`.
    pub fn body(&self, arg: &RecordValue, out: &mut RecordValue) -> Result<(), ConvertError> {
        let pair = ConvertPair::new(arg.ty.clone(), out.ty.clone());
        let plan = self.executor.plan_for(self.package, &pair)?;
        self.executor.body(plan, arg, out)
    }

    /// Zero value of a record type.
    pub fn zero(&self, ty: &TypeIdentity) -> Result<RecordValue, ConvertError> {
        RecordValue::zero(ty, &self.executor.model)
    }
}

/// Runs the plans of several packages.
pub struct Executor {
    model: ObjectModel,
    outputs: Vec<PackageOutput>,
    /// (package, public function) → (output index, plan index)
    functions: HashMap<(String, String), (usize, usize)>,
    /// (package, plural function) → (output index, plan index)
    plurals: HashMap<(String, String), (usize, usize)>,
    overrides: HashMap<(String, String), OverrideImpl>,
    applies: HashMap<TypeIdentity, Box<ApplyFn>>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("outputs", &self.outputs.len())
            .field("overrides", &self.overrides)
            .field("applies", &self.applies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Executor {
    pub fn new(model: ObjectModel, outputs: Vec<PackageOutput>) -> Self {
        let mut functions = HashMap::new();
        let mut plurals = HashMap::new();
        for (o, output) in outputs.iter().enumerate() {
            for (p, plan) in output.plans.iter().enumerate() {
                functions
                    .entry((output.package.clone(), plan.names.public.clone()))
                    .or_insert((o, p));
                if let Some(plural) = &plan.names.plural {
                    plurals
                        .entry((output.package.clone(), plural.clone()))
                        .or_insert((o, p));
                }
            }
        }
        Self {
            model,
            outputs,
            functions,
            plurals,
            overrides: HashMap::new(),
            applies: HashMap::new(),
        }
    }

    /// Provide the implementation of the custom function `package.name`.
    pub fn with_override(mut self, package: &str, name: &str, imp: OverrideImpl) -> Self {
        self.overrides.insert((package.to_string(), name.to_string()), imp);
        self
    }

    /// Provide the `Apply` method of the `Null*` wrapper type `ty`: called
    /// with the wrapper value and the current output field, returns the new
    /// output field.
    pub fn with_apply(
        mut self,
        ty: TypeIdentity,
        f: impl Fn(&Value, &Value) -> Result<Value, ConvertError> + Send + Sync + 'static,
    ) -> Self {
        self.applies.insert(ty, Box::new(f));
        self
    }

    pub fn model(&self) -> &ObjectModel {
        &self.model
    }

    /// Check that every custom function and `Apply` method named by a plan
    /// has a matching implementation.
    pub fn validate(&self) -> Result<(), ConvertError> {
        for output in &self.outputs {
            for plan in &output.plans {
                for field in &plan.fields {
                    if let FieldValue::Apply { ty } = &field.value {
                        if !self.applies.contains_key(ty) {
                            return Err(ConvertError::model(format!("no implementation for method {ty}.Apply")));
                        }
                    }
                }
                let Some(custom) = &plan.descriptor.custom else {
                    continue;
                };
                match self.overrides.get(&(custom.package.clone(), custom.name.clone())) {
                    None => {
                        return Err(ConvertError::model(format!(
                            "no implementation for custom conversion {custom}"
                        )));
                    }
                    Some(imp) if imp.shape() != custom.shape => {
                        return Err(ConvertError::model(format!(
                            "custom conversion {custom} has shape {}, implementation has shape {}",
                            custom.shape.number(),
                            imp.shape().number()
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Register every package's conversions into `builder`, in package
    /// then registration order.
    pub fn register(self: &Arc<Self>, builder: &mut SchemeBuilder) -> Result<(), SchemeError> {
        self.validate()?;
        for output in &self.outputs {
            for registration in &output.registrations {
                let (arg, out) = registration.signature();
                let (arg_shape, out_shape) =
                    Shape::pair_of(&arg, &out).map_err(|e| SchemeError::InvalidPair {
                        arg: Shape::Other(arg.to_string()),
                        out: Shape::Other(out.to_string()),
                        reason: e.message,
                    })?;

                let exec = Arc::clone(self);
                let package = output.package.clone();
                let function = registration.function.clone();
                tracing::trace!(%package, %function, "bind registration");
                if registration.sequence {
                    builder.register(arg_shape, out_shape, move |arg, out| {
                        exec.call_plural(&package, &function, arg, out)
                    })?;
                } else {
                    builder.register(arg_shape, out_shape, move |arg, out| {
                        exec.call_public(&package, &function, arg, out)
                    })?;
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, package: &str, function: &str) -> Result<&ConversionPlan, ConvertError> {
        let &(o, p) = self
            .functions
            .get(&(package.to_string(), function.to_string()))
            .ok_or_else(|| ConvertError::model(format!("function {package}.{function} not found")))?;
        Ok(&self.outputs[o].plans[p])
    }

    fn plan_for(&self, package: &str, pair: &ConvertPair) -> Result<&ConversionPlan, ConvertError> {
        self.outputs
            .iter()
            .filter(|o| o.package == package)
            .find_map(|o| o.plan(pair))
            .ok_or_else(|| ConvertError::model(format!("no conversion {pair} in {package}")))
    }

    fn call_public(
        &self,
        package: &str,
        function: &str,
        arg: &dyn Convertible,
        out: &mut dyn Convertible,
    ) -> Result<(), ConvertError> {
        let plan = self.lookup(package, function)?;
        let arg = arg
            .downcast_ref::<RecordValue>()
            .ok_or_else(|| ConvertError::shape(format!("{function}: input is not a dynamic record")))?;
        let out = out
            .downcast_mut::<RecordValue>()
            .ok_or_else(|| ConvertError::shape(format!("{function}: output is not a dynamic record")))?;
        if let Some(result) = self.public(plan, Some(arg), Some(out.clone()))? {
            *out = result;
        }
        Ok(())
    }

    fn call_plural(
        &self,
        package: &str,
        function: &str,
        arg: &dyn Convertible,
        out: &mut dyn Convertible,
    ) -> Result<(), ConvertError> {
        let &(o, p) = self
            .plurals
            .get(&(package.to_string(), function.to_string()))
            .ok_or_else(|| ConvertError::model(format!("function {package}.{function} not found")))?;
        let plan = &self.outputs[o].plans[p];
        let arg = arg
            .downcast_ref::<ValueSeq>()
            .ok_or_else(|| ConvertError::shape(format!("{function}: input is not a dynamic sequence")))?;
        let out = out
            .downcast_mut::<ValueSeq>()
            .ok_or_else(|| ConvertError::shape(format!("{function}: output is not a dynamic sequence")))?;
        out.items = self.plural(plan, arg.items.as_deref())?;
        Ok(())
    }

    /// Public function of `plan`.
    pub fn public(
        &self,
        plan: &ConversionPlan,
        arg: Option<&RecordValue>,
        out: Option<RecordValue>,
    ) -> Result<Option<RecordValue>, ConvertError> {
        if let Some(custom) = &plan.descriptor.custom {
            let imp = self
                .overrides
                .get(&(custom.package.clone(), custom.name.clone()))
                .ok_or_else(|| {
                    ConvertError::model(format!("no implementation for custom conversion {custom}"))
                })?;
            let bodies = Bodies {
                executor: self,
                package: &custom.package,
            };
            return match imp {
                OverrideImpl::Transform(f) => f(arg, &bodies),
                OverrideImpl::Mutate(f) => {
                    let Some(arg) = arg else {
                        return Ok(None);
                    };
                    let mut out = self.allocate(plan, out)?;
                    f(arg, &mut out, &bodies)?;
                    Ok(Some(out))
                }
                OverrideImpl::MutateReturn(f) => f(arg, out, &bodies),
            };
        }

        let Some(arg) = arg else {
            return Ok(None);
        };
        let mut out = self.allocate(plan, out)?;
        self.body(plan, arg, &mut out)?;
        Ok(Some(out))
    }

    fn allocate(&self, plan: &ConversionPlan, out: Option<RecordValue>) -> Result<RecordValue, ConvertError> {
        match out {
            Some(out) => Ok(out),
            None => RecordValue::zero(&plan.descriptor.pair.out, &self.model),
        }
    }

    /// Body of `plan`: embedding copy, then field decisions.
    pub fn body(
        &self,
        plan: &ConversionPlan,
        arg: &RecordValue,
        out: &mut RecordValue,
    ) -> Result<(), ConvertError> {
        let function = &plan.names.body;
        match &plan.embedding {
            Embedding::None => {}
            Embedding::Arg(field) => {
                let value = field_value(arg, &field.name, function)?;
                let embedded = match (&field.ty, value) {
                    (TypeRef::Ref(_), v) => v.deref_record()?.ok_or_else(|| {
                        ConvertError::conversion(format!("{function}: embedded field {} is nil", field.name))
                    })?,
                    (_, Value::Record(r)) => r,
                    _ => {
                        return Err(ConvertError::shape(format!(
                            "{function}: embedded field {} is not a record",
                            field.name
                        )));
                    }
                };
                *out = embedded.clone();
            }
            Embedding::Out(field) => {
                let value = match field.ty {
                    TypeRef::Ref(_) => Value::some(arg.clone()),
                    _ => Value::Record(arg.clone()),
                };
                out.set(&field.name, value);
            }
        }

        for field in &plan.fields {
            if field.value.keeps_output() {
                continue;
            }
            let Some(arg_field) = &field.arg else {
                continue;
            };
            let input = field_value(arg, &arg_field.name, function)?;
            let value = match &field.value {
                FieldValue::Assign => input.clone(),
                FieldValue::Apply { ty } => {
                    let current = out.get(&field.out.name).cloned().unwrap_or(Value::Nil);
                    self.apply(ty, input, &current)
                        .map_err(|e| e.with_context(format_args!("{function}: field {}", field.out.name)))?
                }
                FieldValue::Cast { kind } => input
                    .cast(*kind)
                    .map_err(|e| e.with_context(format_args!("{function}: field {}", field.out.name)))?,
                FieldValue::Delegate {
                    pair,
                    sequence,
                    converter_package,
                } => self.delegate(pair, *sequence, converter_package, input)?,
                FieldValue::NoChange | FieldValue::Identifier | FieldValue::Mismatch => continue,
            };
            out.set(&field.out.name, value);
        }
        Ok(())
    }

    fn apply(&self, ty: &TypeIdentity, input: &Value, current: &Value) -> Result<Value, ConvertError> {
        let f = self
            .applies
            .get(ty)
            .ok_or_else(|| ConvertError::model(format!("no implementation for method {ty}.Apply")))?;
        f(input, current)
    }

    /// Nested conversion through the Type-mode functions of `pair`.
    fn delegate(
        &self,
        pair: &ConvertPair,
        sequence: bool,
        converter_package: &str,
        input: &Value,
    ) -> Result<Value, ConvertError> {
        let names = FuncNames::new(pair, Mode::Type, converter_package);
        let plan = self.lookup(converter_package, &names.public)?;
        if sequence {
            let items = match input {
                Value::Seq(items) => items.as_deref(),
                other => {
                    return Err(ConvertError::shape(format!("{}: expected sequence, got {other:?}", names.public)));
                }
            };
            return Ok(Value::Seq(self.plural(plan, items)?));
        }
        let arg = input.deref_record()?;
        let result = self.public(plan, arg, None)?;
        Ok(Value::Ref(result.map(|r| Box::new(Value::Record(r)))))
    }

    /// Plural function of `plan`.
    pub fn plural(
        &self,
        plan: &ConversionPlan,
        args: Option<&[Value]>,
    ) -> Result<Option<Vec<Value>>, ConvertError> {
        let Some(args) = args else {
            return Ok(None);
        };
        let mut outs = Vec::with_capacity(args.len());
        for arg in args {
            let tmp = RecordValue::zero(&plan.descriptor.pair.out, &self.model)?;
            let result = self.public(plan, arg.deref_record()?, Some(tmp))?;
            outs.push(Value::Ref(result.map(|r| Box::new(Value::Record(r)))));
        }
        Ok(Some(outs))
    }
}

fn field_value<'v>(record: &'v RecordValue, name: &str, function: &str) -> Result<&'v Value, ConvertError> {
    record
        .get(name)
        .ok_or_else(|| ConvertError::shape(format!("{function}: {} has no field {name}", record.ty)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use convgen_api::model::{BasicKind, FieldDecl, ModelBuilder, TypeDecl, TypeIdentity};
    use convgen_api::plan::{ConversionDescriptor, FieldConversion, Registration};
    use pretty_assertions::assert_eq;

    const P: &str = "p";

    fn id(name: &str) -> TypeIdentity {
        TypeIdentity::new(P, name)
    }

    fn model() -> ObjectModel {
        ModelBuilder::new()
            .type_decl(P, TypeDecl::record("A", vec![FieldDecl::new("Value", TypeRef::Basic(BasicKind::Int))]))
            .type_decl(P, TypeDecl::record("B", vec![FieldDecl::new("Value", TypeRef::Basic(BasicKind::Int32))]))
            .build()
    }

    fn cast_plan() -> ConversionPlan {
        let pair = ConvertPair::new(id("A"), id("B"));
        ConversionPlan {
            names: FuncNames::new(&pair, Mode::Type, P),
            descriptor: ConversionDescriptor {
                pair,
                mode: Mode::Type,
                custom: None,
                converter_package: Some(P.to_string()),
            },
            embedding: Embedding::None,
            fields: vec![FieldConversion {
                arg: Some(FieldDecl::new("Value", TypeRef::Basic(BasicKind::Int))),
                out: FieldDecl::new("Value", TypeRef::Basic(BasicKind::Int32)),
                is_identifier: false,
                value: FieldValue::Cast { kind: BasicKind::Int32 },
            }],
        }
    }

    fn output(plan: ConversionPlan) -> PackageOutput {
        let pair = plan.descriptor.pair.clone();
        PackageOutput {
            package: P.to_string(),
            custom_conversions: vec![],
            ignored_functions: vec![],
            registrations: vec![
                Registration {
                    pair: pair.clone(),
                    action: Mode::Type.action(),
                    function: plan.names.public.clone(),
                    sequence: false,
                },
                Registration {
                    pair,
                    action: Mode::Type.action(),
                    function: plan.names.plural.clone().unwrap_or_default(),
                    sequence: true,
                },
            ],
            plans: vec![plan],
        }
    }

    #[test]
    fn public_handles_nil_and_allocation() {
        let exec = Executor::new(model(), vec![output(cast_plan())]);
        let plan = cast_plan();
        assert_eq!(exec.public(&plan, None, None).unwrap(), None);

        let a = RecordValue::new(id("A")).with("Value", 1_i64 << 33 | 5);
        let b = exec.public(&plan, Some(&a), None).unwrap().unwrap();
        assert_eq!(b.get("Value"), Some(&Value::Int(5)));
    }

    #[test]
    fn plural_preserves_nil_length_and_order() {
        let exec = Executor::new(model(), vec![output(cast_plan())]);
        let plan = cast_plan();
        assert_eq!(exec.plural(&plan, None).unwrap(), None);

        let items = vec![
            Value::some(RecordValue::new(id("A")).with("Value", Value::Int(1))),
            Value::nil(),
            Value::some(RecordValue::new(id("A")).with("Value", Value::Int(3))),
        ];
        let outs = exec.plural(&plan, Some(&items)).unwrap().unwrap();
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[1], Value::nil());
        let third = outs[2].deref_record().unwrap().unwrap();
        assert_eq!(third.get("Value"), Some(&Value::Int(3)));
    }

    #[test]
    fn registrations_bind_into_a_scheme() {
        let exec = Arc::new(Executor::new(model(), vec![output(cast_plan())]));
        let scheme = crate::Scheme::build([|b: &mut SchemeBuilder| exec.register(b)]).unwrap();

        let mut a = RecordValue::new(id("A")).with("Value", Value::Int(7));
        let mut b = RecordValue::zero(&id("B"), exec.model()).unwrap();
        scheme
            .convert(&mut [crate::Item::value(&mut a), crate::Item::value(&mut b)])
            .unwrap();
        assert_eq!(b.get("Value"), Some(&Value::Int(7)));

        let mut seq_a = ValueSeq::of(id("A"), vec![RecordValue::new(id("A")).with("Value", Value::Int(2))]);
        let mut seq_b = ValueSeq::new(id("B"));
        scheme
            .convert(&mut [crate::Item::value(&mut seq_a), crate::Item::value(&mut seq_b)])
            .unwrap();
        assert_eq!(seq_b.items.map(|i| i.len()), Some(1));
    }

    #[test]
    fn missing_override_is_reported() {
        let mut plan = cast_plan();
        plan.descriptor.custom = Some(convgen_api::plan::CustomFunc {
            package: P.to_string(),
            name: "ConvertAB".to_string(),
            shape: CustomShape::Mutate,
        });
        let exec = Executor::new(model(), vec![output(plan)]);
        let err = exec.validate().unwrap_err();
        assert!(err.message.contains("no implementation for custom conversion p.ConvertAB"));

        let exec = exec.with_override(P, "ConvertAB", OverrideImpl::transform(|_, _| Ok(None)));
        assert!(exec.validate().unwrap_err().message.contains("has shape 2"));
    }
}
