//! Migration strategies, one per class of service.
//!
//! Each module builds [`Flow`](crate::pipeline::Flow)s for export and import.
//! Steps shared by several strategies live here.

pub mod backup;
pub mod ccdb;
pub mod managed;
pub mod secret_store;
pub mod user_provided;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_core::ServiceInstance;
use tracing::info;

use crate::context::Location;
use crate::error::Result;
use crate::marshaller::FileMarshaller;
use crate::pipeline::Step;

/// Writes the instance record under the location's org and space.
pub struct SaveRecord {
    marshaller: Arc<dyn FileMarshaller>,
    location: Location,
}

impl SaveRecord {
    /// Step saving into `location`.
    pub fn new(marshaller: Arc<dyn FileMarshaller>, location: Location) -> Self {
        Self { marshaller, location }
    }
}

#[async_trait]
impl Step for SaveRecord {
    fn name(&self) -> &'static str {
        "save-record"
    }

    async fn run(&self, instance: &mut ServiceInstance) -> Result<()> {
        let path = self
            .marshaller
            .save_instance(&self.location.org, &self.location.space, instance)?;
        info!(space = %self.location, instance = %instance.name, path = %path.display(), "saved instance record");
        Ok(())
    }
}
