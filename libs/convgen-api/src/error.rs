use std::fmt;

/// Error kind for conversion errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed directive text.
    Directive,
    /// Object model is inconsistent (unknown type, wrong shape).
    Model,
    /// A conversion function failed on a concrete value.
    Conversion,
    /// A value does not have the shape a conversion function expects.
    Shape,
    /// An emission sink could not accept its input.
    Emit,
}

/// Conversion error returned by conversion functions and emission sinks.
///
/// Errors returned by registered conversion functions travel through the
/// runtime dispatcher unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConvertError {
    pub fn directive(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Directive, message: msg.into() }
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Model, message: msg.into() }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Conversion, message: msg.into() }
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Shape, message: msg.into() }
    }

    pub fn emit(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Emit, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ConvertError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → ConvertError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::num::ParseIntError> for ConvertError {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::conversion(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for ConvertError {
    fn from(e: std::num::ParseFloatError) -> Self {
        Self::conversion(e.to_string())
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(e: std::io::Error) -> Self {
        Self::emit(e.to_string())
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        Self::model(e.to_string())
    }
}
