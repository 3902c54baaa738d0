//! tenantshift migrate: exports service instances from one foundation to
//! files and imports them into another.
//!
//! org → space → instance → registry → migrator (validate, migrate) → summary

pub mod adapter;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod group;
pub mod instance;
pub mod marshaller;
pub mod org;
pub mod pipeline;
pub mod registry;
pub mod space;
pub mod strategies;

pub use adapter::{CcService, ServiceAdapter};
pub use config::{MigrationConfig, MigratorKind, OrgFilter};
pub use context::{BackupBackend, CcdbConnector, Direction, Location, MigrationContext, MySqlConnector};
pub use error::{MigrateError, Result};
pub use group::TaskGroup;
pub use instance::{ServiceInstanceExporter, ServiceInstanceImporter};
pub use marshaller::{FileMarshaller, YamlMarshaller};
pub use org::{run, OrgExporter, OrgImporter, Scope};
pub use pipeline::{Flow, Migrator, Pipeline, Precondition, Step};
pub use registry::{Lookup, MigratorFactory, MigratorRegistry};
pub use space::{SpaceExporter, SpaceImporter};
