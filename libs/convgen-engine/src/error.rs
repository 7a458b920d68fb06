use convgen_api::error::ConvertError;

/// Build-time failure. Aborts generation for the offending package.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("invalid directive: {0}")]
    InvalidDirective(String),

    #[error("can not find package {0}")]
    PackageNotFound(String),

    #[error("type {name} not found (directive {directive})")]
    TypeNotFound { name: String, directive: String },

    #[error("ambiguous path ({0})")]
    AmbiguousPath(String),

    #[error("duplicated conversion functions from {arg} to {out} (function {first} and {second})")]
    DuplicateConversion {
        arg: String,
        out: String,
        first: String,
        second: String,
    },

    #[error("duplicated conversion declarations from {arg} to {out} (generated in {first}, declared again in {second})")]
    DuplicateDeclaration {
        arg: String,
        out: String,
        first: String,
        second: String,
    },

    #[error("function {function} which converts from {arg} to {out} must be defined in {expected} (found in {found})")]
    OwnershipViolation {
        function: String,
        arg: String,
        out: String,
        expected: String,
        found: String,
    },

    #[error("multiple packages with same conversion {arg}->{out} ({first} and {second})")]
    DuplicatePackagePair {
        arg: String,
        out: String,
        first: String,
        second: String,
    },

    #[error("{0} is not a struct")]
    NotARecord(String),

    #[error("update {name}: identifier not found ({identifiers})")]
    IdentifierNotFound { name: String, identifiers: String },

    #[error(
        "There is custom conversion function {function} to convert between {arg} and {out}, \
         but no generated conversion package between {arg_package} and {out_package}. \
         You must create one (+gen:convert: {out_package}->{arg_package}) or delete the custom conversion function."
    )]
    MissingConverterPackage {
        function: String,
        arg: String,
        out: String,
        arg_package: String,
        out_package: String,
    },

    #[error("ambiguous embedding from {arg} to {out} (fields {first} and {second})")]
    AmbiguousEmbedding {
        arg: String,
        out: String,
        first: String,
        second: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(#[from] ConvertError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<GenError>,
    },
}

impl GenError {
    /// Add context to the error.
    ///
    /// Message-only variants get the context prepended; `Model` forwards it
    /// to the inner `ConvertError`; everything else is wrapped.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            GenError::Model(e) => GenError::Model(e.with_context(ctx)),
            GenError::Config(msg) => GenError::Config(format!("{ctx}: {msg}")),
            GenError::InvalidDirective(msg) => GenError::InvalidDirective(format!("{ctx}: {msg}")),
            other => GenError::Context {
                context: ctx.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error with every `Context` layer peeled off.
    pub fn root(&self) -> &GenError {
        match self {
            GenError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}
