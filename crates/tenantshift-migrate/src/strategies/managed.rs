//! Default strategy for broker-managed services: create the instance through
//! the platform API, or update it in place when it already exists.

use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_core::{replace_domain, replace_domains_in_map, DomainMapping, ServiceInstance};
use tenantshift_platform::{InstanceUpdate, NewManagedInstance, PlatformClient};
use tracing::info;

use crate::config::MigratorKind;
use crate::context::{Direction, Location};
use crate::error::{MigrateError, Result};
use crate::marshaller::FileMarshaller;
use crate::pipeline::{Flow, HasName, HasPlan, Pipeline, Step};
use crate::strategies::SaveRecord;

/// Where provisioning parameters come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSource {
    /// The exported parameters
    Params,
    /// The exported credentials, for brokers that accept them back as parameters
    Credentials,
}

/// Creates or updates a managed instance on the target.
pub struct CreateOrUpdateManaged {
    platform: Arc<dyn PlatformClient>,
    location: Location,
    domains: Vec<DomainMapping>,
    dry_run: bool,
    parameters: ParameterSource,
}

impl CreateOrUpdateManaged {
    /// Step writing into `location`.
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        location: Location,
        domains: Vec<DomainMapping>,
        dry_run: bool,
    ) -> Self {
        Self {
            platform,
            location,
            domains,
            dry_run,
            parameters: ParameterSource::Params,
        }
    }

    /// Takes provisioning parameters from `source`.
    pub fn parameters_from(mut self, source: ParameterSource) -> Self {
        self.parameters = source;
        self
    }
}

#[async_trait]
impl Step for CreateOrUpdateManaged {
    fn name(&self) -> &'static str {
        "create-or-update-managed"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        let mut parameters = match self.parameters {
            ParameterSource::Params => instance.params.clone(),
            ParameterSource::Credentials => instance.credentials.clone(),
        };
        replace_domains_in_map(&mut parameters, &self.domains);
        let route_service_url = instance
            .route_service_url
            .as_deref()
            .map(|u| replace_domain(u, &self.domains));

        let existing = self
            .platform
            .get_service_instance_by_name(&self.location.space_guid, &instance.name)
            .await?;

        if let Some(existing) = existing {
            if existing.instance_type != instance.instance_type {
                return Err(MigrateError::NameCollision {
                    name: instance.name.clone(),
                    space: self.location.space.clone(),
                });
            }
            if self.dry_run {
                info!(space = %self.location, instance = %instance.name, "dry run: would update instance");
                return Ok(());
            }
            let update = InstanceUpdate {
                tags: Some(instance.tags.clone()),
                parameters: Some(parameters),
                route_service_url,
                ..Default::default()
            };
            self.platform
                .update_managed_instance(&existing.guid, &update)
                .await?;
            info!(space = %self.location, instance = %instance.name, "updated instance");
            return Ok(());
        }

        let plan = self
            .platform
            .find_service_plan(&instance.service, &instance.plan)
            .await?
            .ok_or_else(|| MigrateError::PlanNotFound {
                service: instance.service.clone(),
                plan: instance.plan.clone(),
            })?;
        if self.dry_run {
            info!(space = %self.location, instance = %instance.name, plan = %plan.name, "dry run: would create instance");
            return Ok(());
        }
        let request = NewManagedInstance {
            name: instance.name.clone(),
            space_guid: self.location.space_guid.clone(),
            plan_guid: plan.guid,
            tags: instance.tags.clone(),
            parameters,
        };
        let created = self.platform.create_managed_instance(&request).await?;
        info!(space = %self.location, instance = %instance.name, guid = %created.guid, "created instance");
        Ok(())
    }
}

/// Export: record only.
pub fn export_flow(marshaller: Arc<dyn FileMarshaller>, location: Location) -> Flow {
    Flow::new(
        MigratorKind::Managed,
        Direction::Export,
        Pipeline::new().then(SaveRecord::new(marshaller, location)),
    )
    .require(HasName)
    .require(HasPlan)
}

/// Import: create or update through the platform API.
pub fn import_flow(
    platform: Arc<dyn PlatformClient>,
    location: Location,
    domains: Vec<DomainMapping>,
    dry_run: bool,
) -> Flow {
    Flow::new(
        MigratorKind::Managed,
        Direction::Import,
        Pipeline::new().then(CreateOrUpdateManaged::new(platform, location, domains, dry_run)),
    )
    .require(HasName)
    .require(HasPlan)
}
