//! Error types for migration orchestration

use std::path::PathBuf;

use tenantshift_ccdb::StoreError;
use tenantshift_core::CoreError;
use tenantshift_platform::PlatformError;

/// Errors raised while exporting or importing service instances.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Missing or inconsistent configuration; stops the enclosing unit
    #[error("configuration error: {0}")]
    Config(String),
    /// The instance cannot be migrated as it stands
    #[error("validation failed for {instance}: {reason}")]
    Validation {
        /// Instance name
        instance: String,
        /// What is wrong
        reason: String,
    },
    /// A resource the migration depends on is missing
    #[error("not found: {0}")]
    NotFound(String),
    /// No plan with this exact name on the target
    #[error("plan {plan:?} of service {service:?} not found on target")]
    PlanNotFound {
        /// Service offering label
        service: String,
        /// Plan name
        plan: String,
    },
    /// A different instance already uses the name in the target space
    #[error("service instance {name:?} already exists in space {space:?}")]
    NameCollision {
        /// Instance name
        name: String,
        /// Target space name
        space: String,
    },
    /// Deliberately not migrated; recorded as skipped, not failed
    #[error("skipped: {reason}")]
    Skipped {
        /// Why the instance was skipped
        reason: String,
    },
    /// A pipeline step failed
    #[error("step {step} failed: {source}")]
    Step {
        /// Step name
        step: &'static str,
        /// Underlying error
        #[source]
        source: Box<MigrateError>,
    },
    /// Cancellation was requested
    #[error("cancelled")]
    Cancelled,
    /// A spawned task panicked or was aborted
    #[error("task failed: {0}")]
    Task(String),
    /// Filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// YAML (de)serialization error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML configuration error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid organization filter
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// Record normalization error
    #[error(transparent)]
    Core(#[from] CoreError),
    /// CCDB error
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Platform API error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl MigrateError {
    /// Returns true when the outcome should be recorded as skipped.
    pub fn is_skip(&self) -> bool {
        match self {
            MigrateError::Skipped { .. } => true,
            MigrateError::Step { source, .. } => source.is_skip(),
            _ => false,
        }
    }

    /// Reason to record for a skip.
    pub fn skip_reason(&self) -> Option<String> {
        match self {
            MigrateError::Skipped { reason } => Some(reason.clone()),
            MigrateError::Step { source, .. } => source.skip_reason(),
            _ => None,
        }
    }

    /// Returns true when cancellation caused the error.
    pub fn is_cancelled(&self) -> bool {
        match self {
            MigrateError::Cancelled => true,
            MigrateError::Platform(PlatformError::Cancelled) => true,
            MigrateError::Step { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrateError::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`MigrateError::Skipped`].
    pub fn skipped(reason: impl Into<String>) -> Self {
        MigrateError::Skipped {
            reason: reason.into(),
        }
    }
}

/// Result alias for migration orchestration.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_is_seen_through_steps() {
        let err = MigrateError::Step {
            step: "delete-source",
            source: Box::new(MigrateError::skipped("shared into another space")),
        };
        assert!(err.is_skip());
        assert_eq!(err.skip_reason().as_deref(), Some("shared into another space"));
        assert!(!MigrateError::Config("x".into()).is_skip());
    }

    #[test]
    fn cancellation_is_recognized() {
        assert!(MigrateError::Platform(PlatformError::Cancelled).is_cancelled());
        assert!(!MigrateError::NotFound("x".into()).is_cancelled());
    }
}
