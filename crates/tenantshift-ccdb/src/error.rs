//! Error types for the CCDB subsystem

use tenantshift_tunnel::TunnelError;

/// All errors raised by the CCDB repository
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection or encryption settings are incomplete
    #[error("invalid CCDB configuration: {0}")]
    InvalidConfig(String),
    /// No existing row carried a salt, so the foundation's salt length is unknown
    #[error("salt length discovery failed: no salted rows in {tables}")]
    SaltDiscovery {
        /// Tables that were queried
        tables: String,
    },
    /// An id lookup by GUID returned zero rows
    #[error("no {table} row with guid {guid}")]
    RowNotFound {
        /// Table that was searched
        table: &'static str,
        /// GUID that was not found
        guid: String,
    },
    /// The operation is refused, e.g. deleting an instance shared into another space
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// Salt has a length the cipher cannot use
    #[error("invalid salt length {len}: expected 8 or 16 characters")]
    InvalidSalt {
        /// Length of the rejected salt
        len: usize,
    },
    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),
    /// Decryption failed (wrong key, wrong salt, or corrupted ciphertext)
    #[error("decryption failed: {0}")]
    Decryption(String),
    /// A row did not have the expected shape
    #[error("unexpected row shape for {query}")]
    RowShape {
        /// Query whose result could not be read
        query: &'static str,
    },
    /// Error from the SQL driver
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Error from a non-sqlx backend
    #[error("database error: {0}")]
    Backend(String),
    /// A failed operation whose rollback failed as well
    #[error("{cause}; rollback failed: {rollback}")]
    Rollback {
        /// Error that triggered the rollback
        cause: Box<StoreError>,
        /// Error returned by the rollback itself
        rollback: Box<StoreError>,
    },
    /// Tunnel to the database could not be set up
    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
    /// Payload could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true when the root cause is an unsupported operation.
    pub fn is_unsupported_operation(&self) -> bool {
        match self {
            StoreError::UnsupportedOperation(_) => true,
            StoreError::Rollback { cause, .. } => cause.is_unsupported_operation(),
            _ => false,
        }
    }
}

/// Result alias for the CCDB subsystem.
pub type Result<T> = std::result::Result<T, StoreError>;
