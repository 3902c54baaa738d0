#![warn(missing_docs)]

//! tenantshift CCDB subsystem: direct, transactional mutation of the cloud
//! controller database for services whose brokers cannot be re-provisioned.
//!
//! Write path: ServiceInstance → serialize → encrypt (per-row salt) → INSERT (one transaction)
//! Delete path: share check → resolve ids → DELETE dependents → DELETE instance → COMMIT

pub mod cipher;
pub mod db;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod repository;
pub mod settings;

pub use cipher::{decrypt, encrypt, generate_salt, EncryptionKey};
pub use db::{Database, DbTransaction, MySqlDatabase, SqlRow, SqlValue};
pub use error::{Result, StoreError};
pub use repository::{BindingTarget, CcdbRepository, TargetPlan, TargetService, TargetSpace};
pub use settings::{CcdbSettings, TunnelSettings};
