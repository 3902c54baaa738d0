//! Relational-database instances: data moves through a backup taken on
//! export and restored into the re-created instance on import.

use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_core::{DomainMapping, ServiceInstance};
use tenantshift_platform::PlatformClient;
use tracing::info;

use crate::config::MigratorKind;
use crate::context::{BackupBackend, Direction, Location};
use crate::error::Result;
use crate::marshaller::FileMarshaller;
use crate::pipeline::{Flow, HasName, HasPlan, Pipeline, Step};
use crate::strategies::managed::CreateOrUpdateManaged;
use crate::strategies::SaveRecord;

/// Backs up or restores instance data.
pub struct Transfer {
    backend: Arc<dyn BackupBackend>,
    location: Location,
    direction: Direction,
    dry_run: bool,
}

impl Transfer {
    /// Backup on export, restore on import.
    pub fn new(backend: Arc<dyn BackupBackend>, location: Location, direction: Direction, dry_run: bool) -> Self {
        Self {
            backend,
            location,
            direction,
            dry_run,
        }
    }
}

#[async_trait]
impl Step for Transfer {
    fn name(&self) -> &'static str {
        match self.direction {
            Direction::Export => "backup",
            Direction::Import => "restore",
        }
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        if self.dry_run {
            info!(space = %self.location, instance = %instance.name, step = self.name(), "dry run: skipping data transfer");
            return Ok(());
        }
        match self.direction {
            Direction::Export => self.backend.backup(&self.location, instance).await,
            Direction::Import => self.backend.restore(&self.location, instance).await,
        }
    }
}

/// Export: record, then back up.
pub fn export_flow(
    backend: Arc<dyn BackupBackend>,
    marshaller: Arc<dyn FileMarshaller>,
    location: Location,
    dry_run: bool,
) -> Flow {
    let pipeline = Pipeline::new()
        .then(SaveRecord::new(marshaller, location.clone()))
        .then(Transfer::new(backend, location, Direction::Export, dry_run));
    Flow::new(MigratorKind::RelationalBackup, Direction::Export, pipeline)
        .require(HasName)
        .require(HasPlan)
}

/// Import: create or update, then restore.
pub fn import_flow(
    backend: Arc<dyn BackupBackend>,
    platform: Arc<dyn PlatformClient>,
    location: Location,
    domains: Vec<DomainMapping>,
    dry_run: bool,
) -> Flow {
    let pipeline = Pipeline::new()
        .then(CreateOrUpdateManaged::new(platform, location.clone(), domains, dry_run))
        .then(Transfer::new(backend, location, Direction::Import, dry_run));
    Flow::new(MigratorKind::RelationalBackup, Direction::Import, pipeline)
        .require(HasName)
        .require(HasPlan)
}
