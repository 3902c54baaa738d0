//! v3 API resources and request bodies.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tenantshift_core::{CredentialMap, InstanceType};

/// `{ "guid": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GuidRef {
    /// Referenced GUID
    pub guid: String,
}

/// To-one relationship; `data` is null when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToOne {
    /// Related resource
    #[serde(default)]
    pub data: Option<GuidRef>,
}

impl ToOne {
    /// Relationship pointing at `guid`.
    pub fn to(guid: impl Into<String>) -> Self {
        Self {
            data: Some(GuidRef { guid: guid.into() }),
        }
    }

    /// GUID of the related resource, if set.
    pub fn guid(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.guid.as_str())
    }
}

/// Paged list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Paging links
    #[serde(default)]
    pub pagination: Pagination,
    /// Resources on this page
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
}

/// Paging links of a list response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Pagination {
    /// Absolute URL of the next page
    #[serde(default)]
    pub next: Option<Link>,
}

/// `{ "href": ... }`
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    /// Absolute URL
    pub href: String,
}

/// An organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Organization {
    /// Organization GUID
    pub guid: String,
    /// Organization name
    pub name: String,
}

/// Relationships of a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpaceRelationships {
    /// Owning organization
    #[serde(default)]
    pub organization: ToOne,
}

/// A space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Space {
    /// Space GUID
    pub guid: String,
    /// Space name
    pub name: String,
    /// Relationships
    #[serde(default)]
    pub relationships: SpaceRelationships,
}

impl Space {
    /// Owning organization GUID.
    pub fn org_guid(&self) -> Option<&str> {
        self.relationships.organization.guid()
    }
}

/// Relationships of a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InstanceRelationships {
    /// Owning space
    #[serde(default)]
    pub space: ToOne,
    /// Plan; absent for user-provided instances
    #[serde(default)]
    pub service_plan: Option<ToOne>,
}

/// A service instance as listed by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceInstanceResource {
    /// Instance GUID
    pub guid: String,
    /// Instance name
    pub name: String,
    /// Managed or user-provided
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Broker dashboard URL
    #[serde(default)]
    pub dashboard_url: Option<String>,
    /// Syslog drain URL (user-provided)
    #[serde(default)]
    pub syslog_drain_url: Option<String>,
    /// Route service URL
    #[serde(default)]
    pub route_service_url: Option<String>,
    /// Relationships
    #[serde(default)]
    pub relationships: InstanceRelationships,
}

impl ServiceInstanceResource {
    /// Owning space GUID.
    pub fn space_guid(&self) -> Option<&str> {
        self.relationships.space.guid()
    }

    /// Plan GUID, for managed instances.
    pub fn plan_guid(&self) -> Option<&str> {
        self.relationships.service_plan.as_ref().and_then(ToOne::guid)
    }
}

/// Relationships of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlanRelationships {
    /// Offering the plan belongs to
    #[serde(default)]
    pub service_offering: ToOne,
}

/// A service plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServicePlan {
    /// Plan GUID
    pub guid: String,
    /// Plan name
    pub name: String,
    /// Relationships
    #[serde(default)]
    pub relationships: PlanRelationships,
}

impl ServicePlan {
    /// Offering GUID.
    pub fn offering_guid(&self) -> Option<&str> {
        self.relationships.service_offering.guid()
    }
}

/// A service offering; `name` is the label the registry dispatches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceOffering {
    /// Offering GUID
    pub guid: String,
    /// Offering label
    pub name: String,
}

/// Relationships of a credential binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BindingRelationships {
    /// Bound app; absent for service keys
    #[serde(default)]
    pub app: Option<ToOne>,
    /// Bound instance
    #[serde(default)]
    pub service_instance: ToOne,
}

/// An app binding or service key (`service_credential_bindings`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CredentialBinding {
    /// Binding GUID
    pub guid: String,
    /// Binding name
    #[serde(default)]
    pub name: Option<String>,
    /// `app` or `key`
    #[serde(rename = "type", default)]
    pub binding_type: String,
    /// Relationships
    #[serde(default)]
    pub relationships: BindingRelationships,
}

impl CredentialBinding {
    /// Bound app GUID, for app bindings.
    pub fn app_guid(&self) -> Option<&str> {
        self.relationships.app.as_ref().and_then(ToOne::guid)
    }

    /// Bound instance GUID.
    pub fn service_instance_guid(&self) -> Option<&str> {
        self.relationships.service_instance.guid()
    }
}

/// Credentials of a binding or key.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct BindingDetails {
    /// Credential map
    #[serde(default)]
    pub credentials: CredentialMap,
    /// Volume mounts, when present and non-empty
    #[serde(default, deserialize_with = "non_empty")]
    pub volume_mounts: Option<Value>,
}

fn non_empty<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.filter(|v| match v {
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }))
}

/// Relationships of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppRelationships {
    /// Owning space
    #[serde(default)]
    pub space: ToOne,
}

/// An application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct App {
    /// App GUID
    pub guid: String,
    /// App name
    pub name: String,
    /// `STARTED` or `STOPPED`
    #[serde(default)]
    pub state: String,
    /// Relationships
    #[serde(default)]
    pub relationships: AppRelationships,
}

/// Body of a managed instance create.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewManagedInstance {
    /// Instance name
    pub name: String,
    /// Target space GUID
    pub space_guid: String,
    /// Target plan GUID
    pub plan_guid: String,
    /// Tags
    pub tags: Vec<String>,
    /// Provisioning parameters
    pub parameters: CredentialMap,
}

impl NewManagedInstance {
    /// JSON request body.
    pub fn to_body(&self) -> Value {
        json!({
            "type": "managed",
            "name": self.name,
            "tags": self.tags,
            "parameters": self.parameters,
            "relationships": {
                "space": ToOne::to(&self.space_guid),
                "service_plan": ToOne::to(&self.plan_guid),
            },
        })
    }
}

/// Body of a user-provided instance create.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewUserProvidedInstance {
    /// Instance name
    pub name: String,
    /// Target space GUID
    pub space_guid: String,
    /// Credentials
    pub credentials: CredentialMap,
    /// Tags
    pub tags: Vec<String>,
    /// Syslog drain URL
    pub syslog_drain_url: Option<String>,
    /// Route service URL
    pub route_service_url: Option<String>,
}

impl NewUserProvidedInstance {
    /// JSON request body.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "type": "user-provided",
            "name": self.name,
            "credentials": self.credentials,
            "tags": self.tags,
            "relationships": { "space": ToOne::to(&self.space_guid) },
        });
        if let Some(url) = &self.syslog_drain_url {
            body["syslog_drain_url"] = json!(url);
        }
        if let Some(url) = &self.route_service_url {
            body["route_service_url"] = json!(url);
        }
        body
    }
}

/// Fields to change on an existing instance; `None` leaves a field as is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstanceUpdate {
    /// Replacement tags
    pub tags: Option<Vec<String>>,
    /// Replacement parameters (managed)
    pub parameters: Option<CredentialMap>,
    /// Replacement credentials (user-provided)
    pub credentials: Option<CredentialMap>,
    /// Replacement syslog drain URL (user-provided)
    pub syslog_drain_url: Option<String>,
    /// Replacement route service URL
    pub route_service_url: Option<String>,
}

impl InstanceUpdate {
    /// JSON request body with only the set fields.
    pub fn to_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        if let Some(tags) = &self.tags {
            body.insert("tags".into(), json!(tags));
        }
        if let Some(parameters) = &self.parameters {
            body.insert("parameters".into(), json!(parameters));
        }
        if let Some(credentials) = &self.credentials {
            body.insert("credentials".into(), json!(credentials));
        }
        if let Some(url) = &self.syslog_drain_url {
            body.insert("syslog_drain_url".into(), json!(url));
        }
        if let Some(url) = &self.route_service_url {
            body.insert("route_service_url".into(), json!(url));
        }
        Value::Object(body)
    }
}
