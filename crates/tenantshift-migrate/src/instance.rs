//! Per-instance export and import: describe, dispatch, validate, migrate,
//! and record the outcome.

use std::path::Path;
use std::sync::Arc;

use tenantshift_core::{InstanceType, ServiceBinding, ServiceInstance, ServiceKey};
use tenantshift_platform::{PlatformClient, ServiceInstanceResource};
use tracing::{debug, error, info};

use crate::context::{Direction, Location, MigrationContext};
use crate::error::{MigrateError, Result};
use crate::registry::{Lookup, MigratorRegistry};

enum Outcome {
    Migrated,
    Skipped(Option<String>),
}

/// Records the outcome of one instance. Only cancellation is returned, so one
/// failing instance never stops its siblings.
fn record(
    ctx: &MigrationContext,
    location: &Location,
    name: &str,
    service: &str,
    direction: Direction,
    result: Result<Outcome>,
) -> Result<()> {
    let summary = &ctx.summary;
    match result {
        Ok(Outcome::Migrated) => {
            info!(space = %location, instance = name, service, %direction, "instance migrated");
            summary.record_success(&location.org, &location.space, name, service);
        }
        Ok(Outcome::Skipped(reason)) => {
            debug!(space = %location, instance = name, reason = ?reason, "instance skipped");
            summary.record_skip(&location.org, &location.space, name, service, reason);
        }
        Err(e) if e.is_cancelled() => return Err(MigrateError::Cancelled),
        Err(e) if e.is_skip() => {
            info!(space = %location, instance = name, reason = ?e.skip_reason(), "instance skipped");
            summary.record_skip(&location.org, &location.space, name, service, e.skip_reason());
        }
        Err(e) => {
            error!(space = %location, instance = name, service, %direction, error = %e, "instance failed");
            summary.record_failure(&location.org, &location.space, name, service, &e);
        }
    }
    Ok(())
}

async fn dispatch(
    registry: &MigratorRegistry,
    location: &Location,
    instance: &mut ServiceInstance,
    direction: Direction,
    platform: Option<&dyn PlatformClient>,
) -> Result<Outcome> {
    let migrator = match registry.lookup(location, instance, direction).await? {
        Lookup::Skip(reason) => return Ok(Outcome::Skipped(reason)),
        Lookup::Migrate(m) => m,
    };
    if let Some(platform) = platform {
        enrich(platform, instance).await?;
    }
    migrator.validate(instance).await?;
    migrator.migrate(instance).await?;
    Ok(Outcome::Migrated)
}

/// Base record of a listed instance: identity, tags, URLs, plan and service.
pub async fn describe(platform: &dyn PlatformClient, resource: &ServiceInstanceResource) -> Result<ServiceInstance> {
    let mut instance = ServiceInstance {
        name: resource.name.clone(),
        guid: resource.guid.clone(),
        instance_type: resource.instance_type,
        space_guid: resource.space_guid().unwrap_or_default().to_string(),
        tags: resource.tags.clone(),
        dashboard_url: resource.dashboard_url.clone(),
        route_service_url: resource.route_service_url.clone(),
        syslog_drain_url: resource.syslog_drain_url.clone(),
        ..Default::default()
    };
    if instance.instance_type == InstanceType::Managed {
        let plan_guid = resource.plan_guid().ok_or_else(|| MigrateError::Validation {
            instance: resource.name.clone(),
            reason: "managed instance has no plan".into(),
        })?;
        let plan = platform.get_service_plan(plan_guid).await?;
        if let Some(offering_guid) = plan.offering_guid() {
            instance.service = platform.get_service_offering(offering_guid).await?.name;
        }
        instance.plan = plan.name;
    }
    Ok(instance)
}

/// Adds bindings with their apps, keys, and parameters or credentials.
pub async fn enrich(platform: &dyn PlatformClient, instance: &mut ServiceInstance) -> Result<()> {
    for binding in platform.list_service_bindings(&instance.guid).await? {
        let Some(app_guid) = binding.app_guid().map(str::to_string) else {
            continue;
        };
        let details = platform.get_binding_credentials(&binding.guid).await?;
        let app = platform.get_app(&app_guid).await?;
        instance.apps.insert(binding.guid.clone(), app.name);
        instance.bindings.push(ServiceBinding {
            guid: binding.guid,
            name: binding.name,
            app_guid,
            service_instance_guid: instance.guid.clone(),
            credentials: details.credentials,
            volume_mounts: details.volume_mounts,
        });
    }

    for key in platform.list_service_keys(&instance.guid).await? {
        let credentials = platform.get_service_key_credentials(&key.guid).await?;
        instance.keys.push(ServiceKey {
            guid: key.guid,
            name: key.name.unwrap_or_default(),
            service_instance_guid: instance.guid.clone(),
            credentials,
        });
    }

    if instance.is_user_provided() {
        instance.credentials = platform.get_user_provided_credentials(&instance.guid).await?;
    } else {
        instance.params = platform
            .get_service_instance_parameters(&instance.guid)
            .await?
            .unwrap_or_default();
    }
    Ok(())
}

/// Exports one listed instance.
#[derive(Debug, Clone)]
pub struct ServiceInstanceExporter {
    ctx: Arc<MigrationContext>,
    registry: MigratorRegistry,
}

impl ServiceInstanceExporter {
    /// Exporter over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        let registry = MigratorRegistry::new(Arc::clone(&ctx));
        Self { ctx, registry }
    }

    /// Exports `resource`, recording its outcome. Fails only on cancellation.
    pub async fn export(&self, location: &Location, resource: ServiceInstanceResource) -> Result<()> {
        let platform = Arc::clone(&self.ctx.source);
        let described = describe(platform.as_ref(), &resource).await;
        let mut instance = match described {
            Ok(instance) => instance,
            Err(e) => {
                let label = resource.instance_type.to_string();
                return record(&self.ctx, location, &resource.name, &label, Direction::Export, Err(e));
            }
        };
        let label = instance.service_label();
        let result = dispatch(
            &self.registry,
            location,
            &mut instance,
            Direction::Export,
            Some(platform.as_ref()),
        )
        .await;
        record(&self.ctx, location, &instance.name, &label, Direction::Export, result)
    }
}

/// Imports one record file.
#[derive(Debug, Clone)]
pub struct ServiceInstanceImporter {
    ctx: Arc<MigrationContext>,
    registry: MigratorRegistry,
}

impl ServiceInstanceImporter {
    /// Importer over `ctx`.
    pub fn new(ctx: Arc<MigrationContext>) -> Self {
        let registry = MigratorRegistry::new(Arc::clone(&ctx));
        Self { ctx, registry }
    }

    /// Imports the record at `path` into `location`, recording its outcome.
    /// Fails only on cancellation.
    pub async fn import(&self, location: &Location, path: &Path) -> Result<()> {
        let mut instance = match self.ctx.marshaller.load_instance(path) {
            Ok(instance) => instance,
            Err(e) => {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                return record(&self.ctx, location, &name, "unknown", Direction::Import, Err(e));
            }
        };
        if !self.ctx.config.selects_instance(&instance.name) {
            debug!(space = %location, instance = %instance.name, "instance not selected");
            return Ok(());
        }
        let label = instance.service_label();
        let result = dispatch(&self.registry, location, &mut instance, Direction::Import, None).await;
        record(&self.ctx, location, &instance.name, &label, Direction::Import, result)
    }
}
