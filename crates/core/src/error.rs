/// Result alias that carries the custom [`HyperviewError`] type.
pub type Result<T> = std::result::Result<T, HyperviewError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum HyperviewError {
    /// Free-form failure that does not warrant its own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed configuration, manifest or data asset.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// A declared asset could not be loaded. Fails the whole startup.
    #[error("failed to load asset `{id}`: {reason}")]
    AssetLoad { id: String, reason: String },
    /// An asset id was requested that the store does not hold.
    #[error("unknown asset `{0}`")]
    UnknownAsset(String),
    /// The asset exists but is of a different kind than requested.
    #[error("asset `{id}` is {actual}, expected {expected}")]
    AssetKindMismatch {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// The startup barrier was cancelled before every load completed.
    #[error("startup was cancelled before all assets were ready")]
    StartupCancelled,
    /// A parameter target outside its declared domain.
    #[error("invalid target for `{parameter}`: {reason}")]
    InvalidTarget { parameter: String, reason: String },
    /// A subscriber, subsystem or pass failed during dispatch.
    #[error("subscriber `{subscriber}` faulted: {reason}")]
    SubscriberFault { subscriber: String, reason: String },
    /// The pass chain terminal flag invariant does not hold.
    #[error("invalid pass chain: {0}")]
    InvalidChain(String),
    /// A shared cell was already borrowed when it was accessed again.
    #[error("`{0}` is already in use")]
    Busy(&'static str),
}

impl HyperviewError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Shorthand for [`HyperviewError::InvalidTarget`].
    pub fn invalid_target(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

impl From<&str> for HyperviewError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for HyperviewError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
