//! tenantshift platform client: the remote control-plane API behind a bounded
//! retry loop.
//!
//! call → do_with_retry → HTTP → classify (5xx/DNS: retry, 4xx: fail) → decode

pub mod client;
pub mod config;
pub mod error;
pub mod resources;
pub mod retry;

pub use client::{CfClient, PlatformClient};
pub use config::PlatformConfig;
pub use error::{PlatformError, Result};
pub use resources::{
    App, BindingDetails, CredentialBinding, InstanceUpdate, NewManagedInstance,
    NewUserProvidedInstance, Organization, ServiceInstanceResource, ServiceOffering, ServicePlan,
    Space,
};
pub use retry::{do_with_retry, RetryConfig};
