//! Chooses and builds the migrator for a service instance.

use std::sync::Arc;

use tenantshift_core::ServiceInstance;
use tracing::{debug, warn};

use crate::adapter::{CcService, ServiceAdapter};
use crate::config::MigratorKind;
use crate::context::{Direction, Location, MigrationContext};
use crate::error::{MigrateError, Result};
use crate::pipeline::Migrator;
use crate::strategies::{backup, ccdb, managed, secret_store, user_provided};

/// Result of a registry lookup.
pub enum Lookup {
    /// Migrate with this migrator
    Migrate(Box<dyn Migrator>),
    /// Leave the instance alone, with an optional reason to report
    Skip(Option<String>),
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Migrate(m) => f.debug_tuple("Migrate").field(&m.kind()).finish(),
            Lookup::Skip(reason) => f.debug_tuple("Skip").field(reason).finish(),
        }
    }
}

/// Builds migrators from the run's context.
#[derive(Debug, Clone)]
pub struct MigratorFactory {
    ctx: Arc<MigrationContext>,
}

impl MigratorFactory {
    /// Factory over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        Self { ctx }
    }

    /// Migrator of `kind` working on `location` in `direction`.
    pub async fn build(
        &self,
        kind: MigratorKind,
        location: &Location,
        direction: Direction,
    ) -> Result<Box<dyn Migrator>> {
        let ctx = &self.ctx;
        let platform = ctx.platform(direction);
        let marshaller = Arc::clone(&ctx.marshaller);
        let location = location.clone();
        let domains = ctx.config.domains.clone();
        let dry_run = ctx.config.dry_run;

        let flow = match (kind, direction) {
            (MigratorKind::Ccdb, _) => {
                let (repository, key) = ctx.ccdb(direction).await?;
                let adapter: Arc<dyn ServiceAdapter> = Arc::new(CcService::new(
                    platform,
                    repository,
                    key,
                    Arc::clone(&marshaller),
                ));
                match direction {
                    Direction::Export => ccdb::export_flow(adapter, marshaller, location, dry_run),
                    Direction::Import => ccdb::import_flow(adapter, location, dry_run),
                }
            }
            (MigratorKind::SecretStore, Direction::Export) => {
                secret_store::export_flow(platform, marshaller, location, dry_run)
            }
            (MigratorKind::SecretStore, Direction::Import) => {
                secret_store::import_flow(platform, location, domains, dry_run)
            }
            (MigratorKind::RelationalBackup, _) => {
                let backend = ctx.backup_backend().ok_or_else(|| {
                    MigrateError::Config(format!(
                        "service {} needs a backup backend",
                        ctx.config.migrators.relational_backup.service
                    ))
                })?;
                match direction {
                    Direction::Export => backup::export_flow(backend, marshaller, location, dry_run),
                    Direction::Import => backup::import_flow(backend, platform, location, domains, dry_run),
                }
            }
            (MigratorKind::Managed, Direction::Export) => managed::export_flow(marshaller, location),
            (MigratorKind::Managed, Direction::Import) => {
                managed::import_flow(platform, location, domains, dry_run)
            }
            (MigratorKind::UserProvided, Direction::Export) => user_provided::export_flow(marshaller, location),
            (MigratorKind::UserProvided, Direction::Import) => {
                user_provided::import_flow(platform, location, domains, dry_run)
            }
        };
        Ok(Box::new(flow))
    }
}

/// Service allow-list and strategy dispatch.
#[derive(Debug, Clone)]
pub struct MigratorRegistry {
    ctx: Arc<MigrationContext>,
    factory: MigratorFactory,
}

impl MigratorRegistry {
    /// Registry over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        let factory = MigratorFactory::new(Arc::clone(&ctx));
        Self { ctx, factory }
    }

    /// Migrator for `instance`, or a skip when its service is filtered out or
    /// has no migrator.
    pub async fn lookup(
        &self,
        location: &Location,
        instance: &ServiceInstance,
        direction: Direction,
    ) -> Result<Lookup> {
        let label = instance.service_label();
        if !self.ctx.config.selects_service(&label) {
            debug!(space = %location, instance = %instance.name, service = %label, "service not selected");
            return Ok(Lookup::Skip(None));
        }
        let Some(kind) = MigratorKind::for_instance(&self.ctx.config, instance) else {
            warn!(
                space = %location,
                instance = %instance.name,
                service = %label,
                "no migrator for service; enable use_default_migrator to migrate it"
            );
            return Ok(Lookup::Skip(Some(format!("no migrator for service {}", label))));
        };
        debug!(space = %location, instance = %instance.name, migrator = %kind, %direction, "migrator selected");
        let migrator = self.factory.build(kind, location, direction).await?;
        Ok(Lookup::Migrate(migrator))
    }
}
