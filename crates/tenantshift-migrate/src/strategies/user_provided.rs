//! User-provided instances: credentials travel in the record and are written
//! back with domain substitution applied.

use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_core::{replace_domain, replace_domains_in_map, DomainMapping, ServiceInstance};
use tenantshift_platform::{InstanceUpdate, NewUserProvidedInstance, PlatformClient};
use tracing::info;

use crate::config::MigratorKind;
use crate::context::{Direction, Location};
use crate::error::{MigrateError, Result};
use crate::marshaller::FileMarshaller;
use crate::pipeline::{Flow, HasName, Pipeline, Step};
use crate::strategies::SaveRecord;

/// Creates or updates a user-provided instance on the target.
pub struct CreateOrUpdateUserProvided {
    platform: Arc<dyn PlatformClient>,
    location: Location,
    domains: Vec<DomainMapping>,
    dry_run: bool,
}

impl CreateOrUpdateUserProvided {
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
        }
    }

    fn rewrite(&self, url: &Option<String>) -> Option<String> {
        url.as_deref().map(|u| replace_domain(u, &self.domains))
    }
}

#[async_trait]
impl Step for CreateOrUpdateUserProvided {
    fn name(&self) -> &'static str {
        "create-or-update-user-provided"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        let mut credentials = instance.credentials.clone();
        replace_domains_in_map(&mut credentials, &self.domains);
        let syslog_drain_url = self.rewrite(&instance.syslog_drain_url);
        let route_service_url = self.rewrite(&instance.route_service_url);

        let existing = self
            .platform
            .get_service_instance_by_name(&self.location.space_guid, &instance.name)
            .await?;

        match existing {
            Some(existing) if existing.instance_type != instance.instance_type => {
                Err(MigrateError::NameCollision {
                    name: instance.name.clone(),
                    space: self.location.space.clone(),
                })
            }
            Some(_) if self.dry_run => {
                info!(space = %self.location, instance = %instance.name, "dry run: would update instance");
                Ok(())
            }
            Some(existing) => {
                let update = InstanceUpdate {
                    tags: Some(instance.tags.clone()),
                    credentials: Some(credentials),
                    syslog_drain_url,
                    route_service_url,
                    ..Default::default()
                };
                self.platform
                    .update_user_provided_instance(&existing.guid, &update)
                    .await?;
                info!(space = %self.location, instance = %instance.name, "updated instance");
                Ok(())
            }
            None if self.dry_run => {
                info!(space = %self.location, instance = %instance.name, "dry run: would create instance");
                Ok(())
            }
            None => {
                let request = NewUserProvidedInstance {
                    name: instance.name.clone(),
                    space_guid: self.location.space_guid.clone(),
                    credentials,
                    tags: instance.tags.clone(),
                    syslog_drain_url,
                    route_service_url,
                };
                let created = self.platform.create_user_provided_instance(&request).await?;
                info!(space = %self.location, instance = %instance.name, guid = %created.guid, "created instance");
                Ok(())
            }
        }
    }
}

/// Export: record only; credentials were read while describing the instance.
pub fn export_flow(marshaller: Arc<dyn FileMarshaller>, location: Location) -> Flow {
    Flow::new(
        MigratorKind::UserProvided,
        Direction::Export,
        Pipeline::new().then(SaveRecord::new(marshaller, location)),
    )
    .require(HasName)
}

/// Import: create or update through the platform API.
pub fn import_flow(
    platform: Arc<dyn PlatformClient>,
    location: Location,
    domains: Vec<DomainMapping>,
    dry_run: bool,
) -> Flow {
    Flow::new(
        MigratorKind::UserProvided,
        Direction::Import,
        Pipeline::new().then(CreateOrUpdateUserProvided::new(platform, location, domains, dry_run)),
    )
    .require(HasName)
}
