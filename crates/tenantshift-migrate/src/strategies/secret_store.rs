//! Secret-store instances: credentials are only reachable through a service
//! key, so export mints a temporary key, reads it and deletes it. Import
//! hands the captured credentials back to the broker as parameters.

use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_core::{DomainMapping, ServiceInstance};
use tenantshift_platform::PlatformClient;
use tracing::{info, warn};

use crate::config::MigratorKind;
use crate::context::{Direction, Location};
use crate::error::Result;
use crate::marshaller::FileMarshaller;
use crate::pipeline::{Flow, HasGuid, HasName, HasPlan, Pipeline, Step};
use crate::strategies::managed::{CreateOrUpdateManaged, ParameterSource};
use crate::strategies::SaveRecord;

const KEY_PREFIX: &str = "tshift-export-";

/// Reads credentials through a short-lived service key.
pub struct CaptureCredentials {
    platform: Arc<dyn PlatformClient>,
    dry_run: bool,
}

impl CaptureCredentials {
    /// Step reading from `platform`.
    pub fn new(platform: Arc<dyn PlatformClient>, dry_run: bool) -> Self {
        Self { platform, dry_run }
    }
}

#[async_trait]
impl Step for CaptureCredentials {
    fn name(&self) -> &'static str {
        "capture-credentials"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        if self.dry_run {
            info!(instance = %instance.name, "dry run: not creating a service key");
            return Ok(());
        }
        let key_name = format!("{}{}", KEY_PREFIX, uuid::Uuid::new_v4().simple());
        let key = self.platform.create_service_key(&instance.guid, &key_name).await?;
        let read = self.platform.get_service_key_credentials(&key.guid).await;
        if let Err(e) = self.platform.delete_service_key(&key.guid).await {
            warn!(instance = %instance.name, key = %key_name, error = %e, "failed to delete temporary service key");
        }
        instance.credentials = read?;
        Ok(())
    }
}

/// Export: capture credentials, then record.
pub fn export_flow(
    platform: Arc<dyn PlatformClient>,
    marshaller: Arc<dyn FileMarshaller>,
    location: Location,
    dry_run: bool,
) -> Flow {
    let pipeline = Pipeline::new()
        .then(CaptureCredentials::new(platform, dry_run))
        .then(SaveRecord::new(marshaller, location));
    Flow::new(MigratorKind::SecretStore, Direction::Export, pipeline)
        .require(HasName)
        .require(HasGuid)
}

/// Import: create or update with the captured credentials as parameters.
pub fn import_flow(
    platform: Arc<dyn PlatformClient>,
    location: Location,
    domains: Vec<DomainMapping>,
    dry_run: bool,
) -> Flow {
    let step = CreateOrUpdateManaged::new(platform, location, domains, dry_run)
        .parameters_from(ParameterSource::Credentials);
    Flow::new(MigratorKind::SecretStore, Direction::Import, Pipeline::new().then(step))
        .require(HasName)
        .require(HasPlan)
}
