use std::fmt;

use convgen_api::error::ConvertError;
use convgen_api::record::Shape;

/// Ordered shape pair, as looked up in a scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapePair {
    pub arg: Shape,
    pub out: Shape,
}

impl ShapePair {
    pub fn new(arg: Shape, out: Shape) -> Self {
        Self { arg, out }
    }
}

impl fmt::Display for ShapePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -> {})", self.arg, self.out)
    }
}

fn no_conversion(pairs: &[ShapePair]) -> String {
    if pairs.is_empty() {
        return "no conversion".to_string();
    }
    let pairs: Vec<String> = pairs.iter().map(ToString::to_string).collect();
    format!("no conversion between {}", pairs.join(" and "))
}

#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    /// No registered conversion. Lists the first failing pair of each
    /// strategy tried; empty when fewer than two values were given.
    #[error("{}", no_conversion(.0))]
    NoConversion(Vec<ShapePair>),

    #[error("ambiguous conversions between {chain} and {broadcast} (note: use convert_to or convert_chain instead)")]
    Ambiguous {
        chain: ShapePair,
        broadcast: ShapePair,
    },

    #[error("invalid conversion type pair: {reason} ({arg} and {out})")]
    InvalidPair {
        arg: Shape,
        out: Shape,
        reason: String,
    },

    #[error(transparent)]
    Failed(#[from] ConvertError),
}
