//! The service-instance record and everything it carries between foundations.
//!
//! A `ServiceInstance` is built fresh per export, written to disk, read back on
//! import and then dropped. Field names are part of the on-disk format.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::units::normalize_size;

/// Credentials, parameters and other free-form JSON objects.
pub type CredentialMap = serde_json::Map<String, Value>;

/// Whether an instance is broker-managed or supplied by the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InstanceType {
    /// Provisioned by a service broker
    #[default]
    #[serde(rename = "managed")]
    Managed,
    /// Credentials supplied directly by the tenant
    #[serde(rename = "user-provided")]
    UserProvided,
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceType::Managed => write!(f, "managed"),
            InstanceType::UserProvided => write!(f, "user-provided"),
        }
    }
}

/// A service instance as exported from the source foundation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceInstance {
    /// Name, unique within its space
    pub name: String,
    /// GUID on the source foundation
    pub guid: String,
    /// Managed or user-provided
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
    /// GUID of the owning space on the source foundation
    #[serde(default)]
    pub space_guid: String,
    /// Instance tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Provisioning parameters as reported by the broker
    #[serde(default)]
    pub params: CredentialMap,
    /// Credentials (user-provided instances, or captured from the broker)
    #[serde(default)]
    pub credentials: CredentialMap,
    /// Plan name
    #[serde(default)]
    pub plan: String,
    /// Service offering label
    #[serde(default)]
    pub service: String,
    /// Broker dashboard URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    /// Route service URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,
    /// Syslog drain URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog_drain_url: Option<String>,
    /// Bindings to applications
    #[serde(default)]
    pub bindings: Vec<ServiceBinding>,
    /// Service keys
    #[serde(default)]
    pub keys: Vec<ServiceKey>,
    /// Application name keyed by binding GUID
    #[serde(default)]
    pub apps: BTreeMap<String, String>,
    /// Manifest of every application bound to this instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
}

impl ServiceInstance {
    /// Returns true for user-provided instances.
    pub fn is_user_provided(&self) -> bool {
        self.instance_type == InstanceType::UserProvided
    }

    /// Distinct application GUIDs across all bindings, in stable order.
    pub fn bound_app_guids(&self) -> Vec<String> {
        let unique: BTreeSet<&str> = self.bindings.iter().map(|b| b.app_guid.as_str()).collect();
        unique.into_iter().map(str::to_string).collect()
    }

    /// Name of the application a binding belongs to, if recorded.
    pub fn app_name_for_binding(&self, binding_guid: &str) -> Option<&str> {
        self.apps.get(binding_guid).map(String::as_str)
    }

    /// Label used when reporting on this instance: service label, or the type
    /// for user-provided instances.
    pub fn service_label(&self) -> String {
        if self.service.is_empty() {
            self.instance_type.to_string()
        } else {
            self.service.clone()
        }
    }
}

/// A binding between a service instance and an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceBinding {
    /// Binding GUID
    pub guid: String,
    /// Optional binding name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// GUID of the bound application
    pub app_guid: String,
    /// GUID of the bound service instance
    pub service_instance_guid: String,
    /// Binding credentials
    #[serde(default)]
    pub credentials: CredentialMap,
    /// Volume mount payload for volume services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Value>,
}

/// A broker-issued credential set not bound to any application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceKey {
    /// Key GUID
    pub guid: String,
    /// Key name
    pub name: String,
    /// GUID of the owning service instance
    pub service_instance_guid: String,
    /// Key credentials
    #[serde(default)]
    pub credentials: CredentialMap,
}

/// An application manifest (`applications:` document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Manifest {
    /// Applications described by this manifest
    #[serde(default)]
    pub applications: Vec<Application>,
}

impl Manifest {
    /// Normalizes every application's memory and disk to `<int><M|G>`.
    pub fn normalize(&mut self) -> Result<()> {
        for app in &mut self.applications {
            app.normalize()?;
        }
        Ok(())
    }
}

/// One application entry in a manifest. Read from the source, never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Application {
    /// Application name
    pub name: String,
    /// Buildpacks, in detection order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buildpacks: Vec<String>,
    /// Docker image, when the app is not buildpack-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerImage>,
    /// Stack name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Memory limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// Disk quota
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_quota: Option<String>,
    /// Instance count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    /// Health check type (port, process, http)
    #[serde(
        default,
        rename = "health-check-type",
        skip_serializing_if = "Option::is_none"
    )]
    pub health_check_type: Option<String>,
    /// Endpoint for http health checks
    #[serde(
        default,
        rename = "health-check-http-endpoint",
        skip_serializing_if = "Option::is_none"
    )]
    pub health_check_http_endpoint: Option<String>,
    /// Start timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    /// Routes mapped to the application
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteEntry>,
    /// Names of bound service instances
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

impl Application {
    /// Normalizes memory and disk quota to `<int><M|G>`.
    pub fn normalize(&mut self) -> Result<()> {
        if let Some(memory) = &self.memory {
            self.memory = Some(normalize_size(memory)?);
        }
        if let Some(disk) = &self.disk_quota {
            self.disk_quota = Some(normalize_size(disk)?);
        }
        Ok(())
    }
}

/// Docker image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DockerImage {
    /// Image reference
    pub image: String,
    /// Registry user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A route entry in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RouteEntry {
    /// Fully qualified route, e.g. `app.apps.example.com/path`
    pub route: String,
}
