//! Space-level fan-out over service instances.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::context::{Location, MigrationContext};
use crate::error::{MigrateError, Result};
use crate::group::TaskGroup;
use crate::instance::{ServiceInstanceExporter, ServiceInstanceImporter};

/// Exports every selected instance of a space.
#[derive(Debug, Clone)]
pub struct SpaceExporter {
    ctx: Arc<MigrationContext>,
    instances: Arc<ServiceInstanceExporter>,
}

impl SpaceExporter {
    /// Exporter over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        let instances = Arc::new(ServiceInstanceExporter::new(Arc::clone(&ctx)));
        Self { ctx, instances }
    }

    /// Lists the space's instances and exports them concurrently. A listing
    /// failure fails the space; instance failures are only recorded.
    pub async fn export(&self, location: Location, cancel: &CancellationToken) -> Result<()> {
        let resources = self.ctx.source.list_service_instances(&location.space_guid).await?;
        let selected: Vec<_> = resources
            .into_iter()
            .filter(|r| self.ctx.config.selects_instance(&r.name))
            .collect();
        info!(space = %location, instances = selected.len(), "exporting space");

        let mut group = TaskGroup::new(self.ctx.config.parallelism, cancel);
        let location = Arc::new(location);
        for resource in selected {
            let exporter = Arc::clone(&self.instances);
            let location = Arc::clone(&location);
            group.spawn(async move { exporter.export(&location, resource).await });
        }
        group.wait().await
    }
}

/// Imports every record of an exported space.
#[derive(Debug, Clone)]
pub struct SpaceImporter {
    ctx: Arc<MigrationContext>,
    instances: Arc<ServiceInstanceImporter>,
}

impl SpaceImporter {
    /// Importer over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        let instances = Arc::new(ServiceInstanceImporter::new(Arc::clone(&ctx)));
        Self { ctx, instances }
    }

    /// Resolves the org and space on the target by name.
    pub async fn resolve(&self, org: &str, space: &str) -> Result<Location> {
        let target = &self.ctx.target;
        let org_resource = target
            .get_org_by_name(org)
            .await?
            .ok_or_else(|| MigrateError::NotFound(format!("organization {} on target", org)))?;
        let space_resource = target
            .get_space_by_name(&org_resource.guid, space)
            .await?
            .ok_or_else(|| MigrateError::NotFound(format!("space {}/{} on target", org, space)))?;
        Ok(Location::new(org, space, org_resource.guid, space_resource.guid))
    }

    /// Imports the records exported from `org`/`space` into the target space of
    /// the same names.
    pub async fn import(&self, org: &str, space: &str, cancel: &CancellationToken) -> Result<()> {
        let location = Arc::new(self.resolve(org, space).await?);
        let records = self.ctx.marshaller.list_instances(org, space)?;
        info!(space = %location, records = records.len(), "importing space");

        let mut group = TaskGroup::new(self.ctx.config.parallelism, cancel);
        for path in records {
            let importer = Arc::clone(&self.instances);
            let location = Arc::clone(&location);
            group.spawn(async move { importer.import(&location, &path).await });
        }
        group.wait().await
    }
}
