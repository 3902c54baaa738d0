//! Error types for tenantshift-core

/// Errors raised while building or normalizing migration records.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Memory or disk value could not be parsed into megabytes
    #[error("invalid size {value:?}: expected <int>[M|MB|G|GB|T|TB]")]
    InvalidSize {
        /// The rejected input
        value: String,
    },
    /// JSON payload could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for tenantshift-core.
pub type Result<T> = std::result::Result<T, CoreError>;
