#![warn(missing_docs)]

//! tenantshift core: the service-instance record that travels from the source
//! foundation to the target, plus the helpers every migrator shares.
//!
//! Export path: platform API + CCDB → ServiceInstance → file
//! Import path: file → ServiceInstance → platform API / CCDB

pub mod domain;
pub mod error;
pub mod model;
pub mod summary;
pub mod units;

pub use domain::{replace_domain, replace_domains_in_map, DomainMapping};
pub use error::{CoreError, Result};
pub use model::{
    Application, CredentialMap, DockerImage, InstanceType, Manifest, RouteEntry, ServiceBinding,
    ServiceInstance, ServiceKey,
};
pub use summary::{MigrationSummary, Outcome, OutcomeStatus};
pub use units::{normalize_size, parse_megabytes};
