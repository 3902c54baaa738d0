//! Services whose brokers cannot re-provision: instances are read from the
//! source CCDB, deleted there, and written directly into the target CCDB.

use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_core::ServiceInstance;
use tracing::{info, warn};

use crate::adapter::ServiceAdapter;
use crate::config::MigratorKind;
use crate::context::{Direction, Location};
use crate::error::{MigrateError, Result};
use crate::marshaller::FileMarshaller;
use crate::pipeline::{Flow, HasGuid, HasName, Pipeline, Precondition, Step};
use crate::strategies::SaveRecord;

/// Replaces the record's credentials with those stored in the source CCDB.
pub struct LoadCredentials {
    adapter: Arc<dyn ServiceAdapter>,
    location: Location,
}

#[async_trait]
impl Step for LoadCredentials {
    fn name(&self) -> &'static str {
        "load-credentials"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        let found = self
            .adapter
            .lookup(&self.location, &instance.name)
            .await?
            .ok_or_else(|| {
                MigrateError::NotFound(format!("service instance {} in {}", instance.name, self.location))
            })?;
        instance.credentials = found.credentials;
        Ok(())
    }
}

/// Writes the manifests of bound apps and embeds them in the record.
pub struct ExportManifests {
    adapter: Arc<dyn ServiceAdapter>,
    location: Location,
}

#[async_trait]
impl Step for ExportManifests {
    fn name(&self) -> &'static str {
        "export-manifests"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        let manifest = self.adapter.export_manifests(&self.location, instance).await?;
        if !manifest.applications.is_empty() {
            instance.manifest = Some(manifest);
        }
        Ok(())
    }
}

/// Removes the exported instance from the source space being walked.
///
/// A shared instance cannot be deleted; with no bindings there is nothing to
/// move and the instance is skipped, otherwise the export fails.
pub struct DeleteFromSource {
    adapter: Arc<dyn ServiceAdapter>,
    location: Location,
    dry_run: bool,
}

#[async_trait]
impl Step for DeleteFromSource {
    fn name(&self) -> &'static str {
        "delete-from-source"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        if self.dry_run {
            info!(instance = %instance.name, "dry run: leaving source instance in place");
            return Ok(());
        }
        match self.adapter.delete(&self.location, instance).await {
            Ok(true) => {
                info!(instance = %instance.name, guid = %instance.guid, "deleted source instance");
                Ok(())
            }
            Ok(false) => {
                warn!(instance = %instance.name, guid = %instance.guid, "source instance was not deleted");
                Ok(())
            }
            Err(MigrateError::Store(e)) if e.is_unsupported_operation() && instance.bindings.is_empty() => {
                Err(MigrateError::skipped(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Rejects instances already present in the target CCDB.
pub struct NotYetMigrated {
    adapter: Arc<dyn ServiceAdapter>,
}

#[async_trait]
impl Precondition for NotYetMigrated {
    fn name(&self) -> &'static str {
        "not-yet-migrated"
    }

    async fn check(&self, instance: &ServiceInstance) -> Result<()> {
        if self.adapter.exists(instance).await? {
            return Err(MigrateError::skipped(format!(
                "instance {} already exists in target",
                instance.guid
            )));
        }
        Ok(())
    }
}

/// Rejects a different instance holding the same name in the target space.
pub struct NameAvailable {
    adapter: Arc<dyn ServiceAdapter>,
    location: Location,
}

#[async_trait]
impl Precondition for NameAvailable {
    fn name(&self) -> &'static str {
        "name-available"
    }

    async fn check(&self, instance: &ServiceInstance) -> Result<()> {
        match self.adapter.lookup(&self.location, &instance.name).await? {
            Some(other) if other.guid != instance.guid => Err(MigrateError::NameCollision {
                name: instance.name.clone(),
                space: self.location.space.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Writes the instance and its bindings into the target CCDB.
pub struct CreateInDatabase {
    adapter: Arc<dyn ServiceAdapter>,
    location: Location,
    dry_run: bool,
}

#[async_trait]
impl Step for CreateInDatabase {
    fn name(&self) -> &'static str {
        "create-in-ccdb"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        if self.dry_run {
            info!(space = %self.location, instance = %instance.name, "dry run: would create instance in CCDB");
            return Ok(());
        }
        self.adapter.create(&self.location, instance).await?;
        info!(space = %self.location, instance = %instance.name, guid = %instance.guid, "created instance in CCDB");
        Ok(())
    }
}

/// Export: credentials, manifests, record, then delete from source.
pub fn export_flow(
    adapter: Arc<dyn ServiceAdapter>,
    marshaller: Arc<dyn FileMarshaller>,
    location: Location,
    dry_run: bool,
) -> Flow {
    let pipeline = Pipeline::new()
        .then(LoadCredentials {
            adapter: Arc::clone(&adapter),
            location: location.clone(),
        })
        .then(ExportManifests {
            adapter: Arc::clone(&adapter),
            location: location.clone(),
        })
        .then(SaveRecord::new(marshaller, location.clone()))
        .then(DeleteFromSource {
            adapter,
            location,
            dry_run,
        });
    Flow::new(MigratorKind::Ccdb, Direction::Export, pipeline)
        .require(HasName)
        .require(HasGuid)
}

/// Import: skip what is already there, refuse name clashes, then create.
pub fn import_flow(adapter: Arc<dyn ServiceAdapter>, location: Location, dry_run: bool) -> Flow {
    let pipeline = Pipeline::new().then(CreateInDatabase {
        adapter: Arc::clone(&adapter),
        location: location.clone(),
        dry_run,
    });
    Flow::new(MigratorKind::Ccdb, Direction::Import, pipeline)
        .require(HasName)
        .require(HasGuid)
        .require(NotYetMigrated {
            adapter: Arc::clone(&adapter),
        })
        .require(NameAvailable { adapter, location })
}
