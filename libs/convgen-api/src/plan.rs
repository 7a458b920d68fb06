//! Fully resolved conversion decisions handed to emission sinks.
//!
//! Nothing here needs re-deriving: a sink renders plans in order, field by
//! field, and the executor in `convgen-scheme` runs them as-is.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{BasicKind, FieldDecl, TypeIdentity, TypeRef};
use crate::naming::{plural, type_fragment};

/// How a declared target is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Full conversion in both directions, plus sequences.
    Type,
    /// One-way construction of the out type.
    Create,
    /// One-way partial mutation preserving identifier fields.
    Update,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Type, Mode::Create, Mode::Update];

    /// Directive command selecting this mode.
    pub fn directive(self) -> &'static str {
        match self {
            Mode::Type => "convert:type",
            Mode::Create => "convert:create",
            Mode::Update => "convert:update",
        }
    }

    pub fn from_directive(cmd: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.directive() == cmd)
    }

    pub fn action(self) -> Action {
        match self {
            Mode::Type => Action::Convert,
            Mode::Create | Mode::Update => Action::Apply,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directive())
    }
}

/// Public verb of a generated function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Convert,
    Apply,
}

impl Action {
    pub fn public(self) -> &'static str {
        match self {
            Action::Convert => "Convert",
            Action::Apply => "Apply",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Action::Convert => "convert",
            Action::Apply => "apply",
        }
    }
}

/// Ordered pair of record types: "a conversion may exist from `arg` to
/// `out`". `(A, B)` and `(B, A)` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConvertPair {
    pub arg: TypeIdentity,
    pub out: TypeIdentity,
}

impl ConvertPair {
    pub fn new(arg: TypeIdentity, out: TypeIdentity) -> Self {
        Self { arg, out }
    }

    pub fn reversed(&self) -> Self {
        Self {
            arg: self.out.clone(),
            out: self.arg.clone(),
        }
    }
}

impl fmt::Display for ConvertPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -> {})", self.arg, self.out)
    }
}

/// Accepted signature shapes of a user conversion function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomShape {
    /// `out = f(arg)`
    Transform,
    /// `f(arg, out)`
    Mutate,
    /// `out = f(arg, out)`
    MutateReturn,
}

impl CustomShape {
    pub fn number(self) -> u8 {
        match self {
            CustomShape::Transform => 1,
            CustomShape::Mutate => 2,
            CustomShape::MutateReturn => 3,
        }
    }
}

/// Reference to a user conversion function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomFunc {
    pub package: String,
    pub name: String,
    pub shape: CustomShape,
}

impl fmt::Display for CustomFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package, self.name)
    }
}

/// Owner of a [`ConvertPair`] key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionDescriptor {
    pub pair: ConvertPair,
    pub mode: Mode,
    /// User override pre-empting the generated body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomFunc>,
    /// Package emitting the generated functions for this pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter_package: Option<String>,
}

/// Value decision for one output field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum FieldValue {
    /// No same-named input field; output left unchanged.
    NoChange,
    /// Update-mode identifier; never overwritten.
    Identifier,
    /// Identical types.
    Assign,
    /// Call the conversion of a nested pair.
    Delegate {
        pair: ConvertPair,
        sequence: bool,
        converter_package: String,
    },
    /// Update only: the input field's `Null*` wrapper applies itself to
    /// the current output value (`arg.F.Apply(out.F)`).
    Apply { ty: TypeIdentity },
    /// Explicit basic conversion to `kind`.
    Cast { kind: BasicKind },
    /// No structural match; output left unchanged.
    Mismatch,
}

impl FieldValue {
    /// Diagnostic comment attached to the rendered field.
    pub fn comment(&self) -> Option<&'static str> {
        match self {
            FieldValue::NoChange => Some("// no change"),
            FieldValue::Identifier => Some("// identifier"),
            FieldValue::Assign => Some("// simple assign"),
            FieldValue::Delegate { .. } => None,
            FieldValue::Apply { .. } => Some("// apply change"),
            FieldValue::Cast { .. } => Some("// simple conversion"),
            FieldValue::Mismatch => Some("// types do not match"),
        }
    }

    /// Whether the output field keeps its current value.
    pub fn keeps_output(&self) -> bool {
        matches!(
            self,
            FieldValue::NoChange | FieldValue::Identifier | FieldValue::Mismatch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConversion {
    /// Same-named input field, if any.
    pub arg: Option<FieldDecl>,
    pub out: FieldDecl,
    #[serde(default)]
    pub is_identifier: bool,
    pub value: FieldValue,
}

/// Embedding relation between the two sides of one direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Embedding {
    #[default]
    None,
    /// The input embeds the output type: copy that field out whole.
    Arg(FieldDecl),
    /// The output embeds the input type: copy the whole input into it.
    Out(FieldDecl),
}

/// Generated function names for one direction, relative to the emitting
/// package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncNames {
    /// `Convert_A_B` or `Apply_A_B`.
    pub public: String,
    /// `convert_A_B` or `apply_A_B`.
    pub body: String,
    /// `Convert_As_Bs`, Type mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
}

impl FuncNames {
    pub fn new(pair: &ConvertPair, mode: Mode, package: &str) -> Self {
        let action = mode.action();
        let arg = type_fragment(&pair.arg, package);
        let out = type_fragment(&pair.out, package);
        let sequence = (mode == Mode::Type)
            .then(|| format!("{}_{}_{}", action.public(), plural(&arg), plural(&out)));
        Self {
            public: format!("{}_{arg}_{out}", action.public()),
            body: format!("{}_{arg}_{out}", action.body()),
            plural: sequence,
        }
    }
}

/// Everything needed to emit one direction of one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionPlan {
    pub descriptor: ConversionDescriptor,
    pub names: FuncNames,
    #[serde(default)]
    pub embedding: Embedding,
    /// In output field order.
    pub fields: Vec<FieldConversion>,
}

/// One entry of a package's registration routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub pair: ConvertPair,
    pub action: Action,
    pub function: String,
    /// Registers `[]*Arg -> *[]*Out` instead of `*Arg -> *Out`.
    #[serde(default)]
    pub sequence: bool,
}

impl Registration {
    /// Parameter types of the registered function.
    pub fn signature(&self) -> (TypeRef, TypeRef) {
        let arg = TypeRef::reference(TypeRef::Named(self.pair.arg.clone()));
        let out = TypeRef::reference(TypeRef::Named(self.pair.out.clone()));
        if self.sequence {
            (TypeRef::seq(arg), TypeRef::reference(TypeRef::seq(out)))
        } else {
            (arg, out)
        }
    }
}

/// A name with its diagnostic comment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Note {
    pub name: String,
    pub comment: String,
}

impl Note {
    pub fn new(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: comment.into(),
        }
    }
}

/// All output of one generating package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOutput {
    pub package: String,
    /// Sorted by name.
    pub custom_conversions: Vec<Note>,
    /// Sorted by name.
    pub ignored_functions: Vec<Note>,
    pub registrations: Vec<Registration>,
    pub plans: Vec<ConversionPlan>,
}

impl PackageOutput {
    pub fn plan(&self, pair: &ConvertPair) -> Option<&ConversionPlan> {
        self.plans.iter().find(|p| &p.descriptor.pair == pair)
    }
}
