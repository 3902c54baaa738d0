//! Service adapter for services whose instances live only in the CCDB.
//!
//! Brokers of these services cannot re-provision on the target, so instances
//! and bindings are written straight into the target's cloud controller
//! database, under their source GUIDs.

use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_ccdb::{BindingTarget, CcdbRepository, EncryptionKey, TargetPlan, TargetService, TargetSpace};
use tenantshift_core::{Manifest, ServiceInstance};
use tenantshift_platform::PlatformClient;
use tracing::{debug, info};

use crate::context::Location;
use crate::error::{MigrateError, Result};
use crate::marshaller::FileMarshaller;

/// Create, delete, exists and lookup for one class of service, plus manifest export.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Whether the instance's GUID is present in the database.
    async fn exists(&self, instance: &ServiceInstance) -> Result<bool>;
    /// Instance named `name` in `location`, with credentials read from the database.
    async fn lookup(&self, location: &Location, name: &str) -> Result<Option<ServiceInstance>>;
    /// Creates the instance and its bindings in `location`, all or nothing.
    async fn create(&self, location: &Location, instance: &ServiceInstance) -> Result<()>;
    /// Deletes the instance and its dependents as seen from `location`, the
    /// space being exported. Instances shared into that space are refused.
    async fn delete(&self, location: &Location, instance: &ServiceInstance) -> Result<bool>;
    /// Writes the manifest of every bound app and returns them combined.
    async fn export_manifests(&self, location: &Location, instance: &ServiceInstance) -> Result<Manifest>;
}

/// [`ServiceAdapter`] over the platform API and a CCDB repository.
pub struct CcService {
    platform: Arc<dyn PlatformClient>,
    repository: Arc<CcdbRepository>,
    key: EncryptionKey,
    marshaller: Arc<dyn FileMarshaller>,
}

impl std::fmt::Debug for CcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CcService")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl CcService {
    /// Adapter for one foundation.
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        repository: Arc<CcdbRepository>,
        key: EncryptionKey,
        marshaller: Arc<dyn FileMarshaller>,
    ) -> Self {
        Self {
            platform,
            repository,
            key,
            marshaller,
        }
    }

    async fn resolve_plan(&self, instance: &ServiceInstance) -> Result<(TargetPlan, TargetService)> {
        let plan = self
            .platform
            .find_service_plan(&instance.service, &instance.plan)
            .await?
            .ok_or_else(|| MigrateError::PlanNotFound {
                service: instance.service.clone(),
                plan: instance.plan.clone(),
            })?;
        let offering_guid = plan
            .offering_guid()
            .ok_or_else(|| MigrateError::NotFound(format!("offering of plan {}", plan.guid)))?;
        let offering = self.platform.get_service_offering(offering_guid).await?;
        Ok((
            TargetPlan {
                guid: plan.guid,
                name: plan.name,
            },
            TargetService {
                guid: offering.guid,
                label: offering.name,
            },
        ))
    }

    async fn ensure_app(&self, location: &Location, name: &str) -> Result<String> {
        if let Some(app) = self.platform.find_app_by_name(&location.space_guid, name).await? {
            return Ok(app.guid);
        }
        let app = self.platform.create_app(&location.space_guid, name).await?;
        info!(space = %location, app = name, "created placeholder app");
        Ok(app.guid)
    }
}

#[async_trait]
impl ServiceAdapter for CcService {
    async fn exists(&self, instance: &ServiceInstance) -> Result<bool> {
        Ok(self.repository.service_instance_exists(&instance.guid).await?)
    }

    async fn lookup(&self, location: &Location, name: &str) -> Result<Option<ServiceInstance>> {
        let Some(found) = self
            .platform
            .get_service_instance_by_name(&location.space_guid, name)
            .await?
        else {
            return Ok(None);
        };

        let credentials = self
            .repository
            .service_instance_credentials(&found.guid, &self.key)
            .await?
            .unwrap_or_default();
        let mut instance = ServiceInstance {
            name: found.name.clone(),
            guid: found.guid.clone(),
            instance_type: found.instance_type,
            space_guid: location.space_guid.clone(),
            tags: found.tags.clone(),
            credentials,
            dashboard_url: found.dashboard_url.clone(),
            route_service_url: found.route_service_url.clone(),
            syslog_drain_url: found.syslog_drain_url.clone(),
            ..Default::default()
        };
        if let Some(plan_guid) = found.plan_guid() {
            let plan = self.platform.get_service_plan(plan_guid).await?;
            if let Some(offering_guid) = plan.offering_guid() {
                instance.service = self.platform.get_service_offering(offering_guid).await?.name;
            }
            instance.plan = plan.name;
        }
        Ok(Some(instance))
    }

    async fn create(&self, location: &Location, instance: &ServiceInstance) -> Result<()> {
        let (plan, service) = self.resolve_plan(instance).await?;
        let space = TargetSpace {
            guid: location.space_guid.clone(),
            name: location.space.clone(),
            org_guid: location.org_guid.clone(),
        };

        // Apps first: they live behind the API and cannot join the CCDB transaction.
        let mut app_guids = Vec::with_capacity(instance.bindings.len());
        for binding in &instance.bindings {
            let app_name = instance.app_name_for_binding(&binding.guid).ok_or_else(|| {
                MigrateError::Validation {
                    instance: instance.name.clone(),
                    reason: format!("no app recorded for binding {}", binding.guid),
                }
            })?;
            app_guids.push(self.ensure_app(location, app_name).await?);
        }
        let targets: Vec<BindingTarget<'_>> = instance
            .bindings
            .iter()
            .zip(&app_guids)
            .map(|(binding, app_guid)| BindingTarget {
                binding,
                app_guid: app_guid.as_str(),
            })
            .collect();

        self.repository
            .create_service_instance_with_bindings(instance, &space, &plan, &service, &targets, &self.key)
            .await?;
        debug!(instance = %instance.name, bindings = instance.bindings.len(), "instance written to CCDB");
        Ok(())
    }

    async fn delete(&self, location: &Location, instance: &ServiceInstance) -> Result<bool> {
        if instance.space_guid != location.space_guid {
            debug!(instance = %instance.name, owner = %instance.space_guid, space = %location, "instance listed outside its owning space");
        }
        Ok(self
            .repository
            .delete_service_instance(&location.space_guid, &instance.guid)
            .await?)
    }

    async fn export_manifests(&self, location: &Location, instance: &ServiceInstance) -> Result<Manifest> {
        let mut combined = Manifest::default();
        for app_guid in instance.bound_app_guids() {
            let raw = self.platform.get_app_manifest(&app_guid).await?;
            let mut manifest: Manifest = serde_yaml::from_str(&raw)?;
            manifest.normalize()?;
            for app in &manifest.applications {
                let single = Manifest {
                    applications: vec![app.clone()],
                };
                let path = self
                    .marshaller
                    .save_manifest(&location.org, &location.space, &app.name, &single)?;
                debug!(app = %app.name, path = %path.display(), "saved app manifest");
            }
            combined.applications.extend(manifest.applications);
        }
        Ok(combined)
    }
}
