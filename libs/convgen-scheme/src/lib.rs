//! Runtime conversion registry.
//!
//! A [`SchemeBuilder`] collects conversion functions keyed by shape pair;
//! [`SchemeBuilder::build`] freezes it into an immutable [`Scheme`] that can
//! be shared across threads. Calls name their items in order and the scheme
//! decides (or is told) how the values convert into each other.

pub mod error;
pub mod exec;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use convgen_api::error::ConvertError;
use convgen_api::record::{Convertible, Record, RecordSeq, Shape};

pub use error::{SchemeError, ShapePair};

/// Binary conversion function: reads `arg`, writes `out`.
pub type ConversionFn =
    Arc<dyn Fn(&dyn Convertible, &mut dyn Convertible) -> Result<(), ConvertError> + Send + Sync>;

/// Validate a shape pair: two records, or two sequences of records.
pub fn shape_pair(arg: &Shape, out: &Shape) -> Result<ShapePair, SchemeError> {
    let reason = match (arg, out) {
        (Shape::Record(_), Shape::Record(_)) | (Shape::Sequence(_), Shape::Sequence(_)) => {
            return Ok(ShapePair::new(arg.clone(), out.clone()));
        }
        (Shape::Other(_), _) | (_, Shape::Other(_)) => "must be reference",
        _ => "both types must match",
    };
    Err(SchemeError::InvalidPair {
        arg: arg.clone(),
        out: out.clone(),
        reason: reason.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════
//  SchemeBuilder: the registering state
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct SchemeBuilder {
    pairs: HashMap<ShapePair, ConversionFn>,
}

impl fmt::Debug for SchemeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeBuilder")
            .field("pairs", &self.pairs.len())
            .finish()
    }
}

impl SchemeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `f` to the shape pair. Registering a pair again overwrites it.
    pub fn register<F>(&mut self, arg: Shape, out: Shape, f: F) -> Result<&mut Self, SchemeError>
    where
        F: Fn(&dyn Convertible, &mut dyn Convertible) -> Result<(), ConvertError> + Send + Sync + 'static,
    {
        let pair = shape_pair(&arg, &out)?;
        tracing::trace!(%pair, "register conversion");
        if self.pairs.insert(pair.clone(), Arc::new(f)).is_some() {
            tracing::debug!(%pair, "conversion overwritten");
        }
        Ok(self)
    }

    /// Typed conversion between two derived records.
    pub fn register_record<A, B, F>(&mut self, f: F) -> Result<&mut Self, SchemeError>
    where
        A: Record,
        B: Record,
        F: Fn(&A, &mut B) -> Result<(), ConvertError> + Send + Sync + 'static,
    {
        self.register(
            Shape::Record(A::identity()),
            Shape::Record(B::identity()),
            move |arg, out| {
                let arg = downcast::<A>(arg)?;
                let out = downcast_mut::<B>(out)?;
                f(arg, out)
            },
        )
    }

    /// Typed conversion between two sequences of derived records.
    pub fn register_sequence<A, B, F>(&mut self, f: F) -> Result<&mut Self, SchemeError>
    where
        A: Record,
        B: Record,
        F: Fn(&RecordSeq<A>, &mut RecordSeq<B>) -> Result<(), ConvertError> + Send + Sync + 'static,
    {
        self.register(
            Shape::Sequence(A::identity()),
            Shape::Sequence(B::identity()),
            move |arg, out| {
                let arg = downcast::<RecordSeq<A>>(arg)?;
                let out = downcast_mut::<RecordSeq<B>>(out)?;
                f(arg, out)
            },
        )
    }

    /// Freeze into a ready scheme.
    pub fn build(self) -> Scheme {
        tracing::debug!(pairs = self.pairs.len(), "scheme ready");
        Scheme { pairs: self.pairs }
    }
}

fn downcast<T: Convertible>(value: &dyn Convertible) -> Result<&T, ConvertError> {
    let shape = value.shape();
    value
        .downcast_ref::<T>()
        .ok_or_else(|| ConvertError::shape(format!("unexpected value of {shape}")))
}

fn downcast_mut<T: Convertible>(value: &mut dyn Convertible) -> Result<&mut T, ConvertError> {
    let shape = value.shape();
    value
        .downcast_mut::<T>()
        .ok_or_else(|| ConvertError::shape(format!("unexpected value of {shape}")))
}

// ═══════════════════════════════════════════════════════════════
//  Items and strategies
// ═══════════════════════════════════════════════════════════════

type Action<'a> = Box<dyn FnMut() -> Result<(), ConvertError> + 'a>;

/// One argument of a conversion call.
pub enum Item<'a> {
    /// A value converted from or into.
    Value(&'a mut dyn Convertible),
    /// Side effect run at its position; never paired.
    Action(Action<'a>),
}

impl<'a> Item<'a> {
    pub fn value(value: &'a mut dyn Convertible) -> Self {
        Item::Value(value)
    }

    pub fn action(f: impl FnMut() -> Result<(), ConvertError> + 'a) -> Self {
        Item::Action(Box::new(f))
    }

    fn shape(&self) -> Option<Shape> {
        match self {
            Item::Value(v) => Some(v.shape()),
            Item::Action(_) => None,
        }
    }
}

impl<'a, T: Convertible> From<&'a mut T> for Item<'a> {
    fn from(value: &'a mut T) -> Self {
        Item::Value(value)
    }
}

impl fmt::Debug for Item<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Value(v) => write!(f, "Value({})", v.shape()),
            Item::Action(_) => f.write_str("Action"),
        }
    }
}

/// How the values of a call convert into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exactly two values: the first into the second.
    Pairwise,
    /// Each value into its successor.
    Chain,
    /// Every value into the last one.
    Broadcast,
}

/// Result of checking one strategy against the registered pairs.
#[derive(Debug, PartialEq, Eq)]
enum Check {
    /// Number of conversions, first pair.
    Satisfied(usize, Option<ShapePair>),
    /// First pair without a registration.
    Missing(ShapePair),
}

// ═══════════════════════════════════════════════════════════════
//  Scheme: the ready state
// ═══════════════════════════════════════════════════════════════

/// Frozen registry. Immutable, so it can be shared freely.
#[derive(Clone)]
pub struct Scheme {
    pairs: HashMap<ShapePair, ConversionFn>,
}

impl fmt::Debug for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheme").field("pairs", &self.pairs.len()).finish()
    }
}

impl Scheme {
    /// Run every registration routine on a fresh builder and freeze it.
    pub fn build<I, F>(routines: I) -> Result<Scheme, SchemeError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(&mut SchemeBuilder) -> Result<(), SchemeError>,
    {
        let mut builder = SchemeBuilder::new();
        for routine in routines {
            routine(&mut builder)?;
        }
        Ok(builder.build())
    }

    fn lookup(&self, arg: &Shape, out: &Shape) -> Result<Option<&ConversionFn>, SchemeError> {
        let pair = shape_pair(arg, out)?;
        Ok(self.pairs.get(&pair))
    }

    fn get(&self, arg: &Shape, out: &Shape) -> Result<&ConversionFn, SchemeError> {
        self.lookup(arg, out)?
            .ok_or_else(|| SchemeError::NoConversion(vec![ShapePair::new(arg.clone(), out.clone())]))
    }

    /// Convert, inferring the strategy from the items.
    ///
    /// Two values and nothing else convert pairwise. Otherwise the chain and
    /// broadcast strategies are both checked: exactly one must be
    /// satisfiable, or both with a single conversion each (then they are the
    /// same call and the chain runs).
    pub fn convert(&self, items: &mut [Item<'_>]) -> Result<(), SchemeError> {
        if let [Item::Value(_), Item::Value(_)] = items {
            return self.execute(Strategy::Pairwise, items);
        }

        let shapes: Vec<Option<Shape>> = items.iter().map(Item::shape).collect();
        let chain = self.check_chain(&shapes)?;
        let broadcast = self.check_broadcast(&shapes)?;
        let strategy = match (chain, broadcast) {
            (Check::Missing(a), Check::Missing(b)) => {
                let mut missing = vec![a];
                if missing[0] != b {
                    missing.push(b);
                }
                return Err(SchemeError::NoConversion(missing));
            }
            (Check::Satisfied(0, _), Check::Satisfied(0, _)) => {
                return Err(SchemeError::NoConversion(Vec::new()));
            }
            (Check::Satisfied(cc, Some(a)), Check::Satisfied(ct, Some(b))) if cc > 1 && ct > 1 => {
                return Err(SchemeError::Ambiguous {
                    chain: a,
                    broadcast: b,
                });
            }
            (Check::Satisfied(cc, _), _) if cc > 0 => Strategy::Chain,
            _ => Strategy::Broadcast,
        };
        tracing::trace!(?strategy, "strategy inferred");
        self.run(strategy, items)
    }

    /// Convert every value into the last one.
    pub fn convert_to(&self, items: &mut [Item<'_>]) -> Result<(), SchemeError> {
        self.execute(Strategy::Broadcast, items)
    }

    /// Convert each value into its successor.
    pub fn convert_chain(&self, items: &mut [Item<'_>]) -> Result<(), SchemeError> {
        self.execute(Strategy::Chain, items)
    }

    /// Validate `strategy` against the items, then run it.
    pub fn execute(&self, strategy: Strategy, items: &mut [Item<'_>]) -> Result<(), SchemeError> {
        let shapes: Vec<Option<Shape>> = items.iter().map(Item::shape).collect();
        let check = match strategy {
            Strategy::Pairwise => {
                let values: Vec<&Shape> = shapes.iter().flatten().collect();
                let [arg, out] = values.as_slice() else {
                    return Err(SchemeError::NoConversion(Vec::new()));
                };
                self.get(arg, out)?;
                Check::Satisfied(1, None)
            }
            Strategy::Chain => self.check_chain(&shapes)?,
            Strategy::Broadcast => self.check_broadcast(&shapes)?,
        };
        match check {
            Check::Missing(pair) => Err(SchemeError::NoConversion(vec![pair])),
            Check::Satisfied(0, _) => Err(SchemeError::NoConversion(Vec::new())),
            Check::Satisfied(..) => self.run(strategy, items),
        }
    }

    fn check_chain(&self, shapes: &[Option<Shape>]) -> Result<Check, SchemeError> {
        let mut count = 0;
        let mut first = None;
        let mut prev: Option<&Shape> = None;
        for shape in shapes.iter().flatten() {
            if let Some(p) = prev {
                if self.lookup(p, shape)?.is_none() {
                    return Ok(Check::Missing(ShapePair::new(p.clone(), shape.clone())));
                }
                first.get_or_insert_with(|| ShapePair::new(p.clone(), shape.clone()));
                count += 1;
            }
            prev = Some(shape);
        }
        Ok(Check::Satisfied(count, first))
    }

    fn check_broadcast(&self, shapes: &[Option<Shape>]) -> Result<Check, SchemeError> {
        let values: Vec<&Shape> = shapes.iter().flatten().collect();
        let Some((last, rest)) = values.split_last() else {
            return Ok(Check::Satisfied(0, None));
        };
        let mut first = None;
        for shape in rest {
            if self.lookup(shape, last)?.is_none() {
                return Ok(Check::Missing(ShapePair::new((*shape).clone(), (*last).clone())));
            }
            first.get_or_insert_with(|| ShapePair::new((*shape).clone(), (*last).clone()));
        }
        Ok(Check::Satisfied(rest.len(), first))
    }

    /// Run a validated strategy. Items run strictly in order; the first
    /// error aborts the rest.
    fn run(&self, strategy: Strategy, items: &mut [Item<'_>]) -> Result<(), SchemeError> {
        match strategy {
            Strategy::Pairwise | Strategy::Chain => {
                let mut prev: Option<usize> = None;
                for idx in 0..items.len() {
                    if let Item::Action(action) = &mut items[idx] {
                        action()?;
                        continue;
                    }
                    if let Some(p) = prev {
                        self.convert_at(items, p, idx)?;
                    }
                    prev = Some(idx);
                }
            }
            Strategy::Broadcast => {
                let last = items.iter().rposition(|i| matches!(i, Item::Value(_)));
                for idx in 0..items.len() {
                    if let Item::Action(action) = &mut items[idx] {
                        action()?;
                        continue;
                    }
                    if let Some(last) = last.filter(|&l| l != idx) {
                        self.convert_at(items, idx, last)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Convert `items[arg]` into `items[out]`; `arg < out`.
    fn convert_at(&self, items: &mut [Item<'_>], arg: usize, out: usize) -> Result<(), SchemeError> {
        let (left, right) = items.split_at_mut(out);
        let (Item::Value(arg), Item::Value(out)) = (&left[arg], &mut right[0]) else {
            return Ok(());
        };
        let f = self.get(&arg.shape(), &out.shape())?;
        f(&**arg, &mut **out)?;
        Ok(())
    }
}
