//! In-memory foundation, CCDB and context builders shared by integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};
use tenantshift_ccdb::memory::MemoryDatabase;
use tenantshift_ccdb::{CcdbRepository, CcdbSettings, StoreError};
use tenantshift_core::{CredentialMap, InstanceType};
use tenantshift_migrate::config::CcdbMigratorSettings;
use tenantshift_migrate::{CcdbConnector, MigrationConfig, MigrationContext, YamlMarshaller};
use tenantshift_platform::resources::{
    AppRelationships, BindingRelationships, InstanceRelationships, PlanRelationships,
    SpaceRelationships, ToOne,
};
use tenantshift_platform::{
    App, BindingDetails, CredentialBinding, InstanceUpdate, NewManagedInstance,
    NewUserProvidedInstance, Organization, PlatformClient, PlatformError, Result,
    ServiceInstanceResource, ServiceOffering, ServicePlan, Space,
};
use tokio_util::sync::CancellationToken;

pub const ENCRYPTION_KEY: &str = "ccdb-key";

#[derive(Default)]
struct State {
    orgs: Vec<Organization>,
    spaces: Vec<Space>,
    instances: Vec<ServiceInstanceResource>,
    shares: Vec<(String, String)>,
    plans: Vec<ServicePlan>,
    offerings: Vec<ServiceOffering>,
    bindings: Vec<CredentialBinding>,
    binding_details: HashMap<String, BindingDetails>,
    keys: Vec<CredentialBinding>,
    key_credentials: HashMap<String, CredentialMap>,
    apps: Vec<App>,
    manifests: HashMap<String, String>,
    params: HashMap<String, CredentialMap>,
    ups_credentials: HashMap<String, CredentialMap>,

    created_managed: Vec<NewManagedInstance>,
    created_user_provided: Vec<NewUserProvidedInstance>,
    updates: Vec<(String, InstanceUpdate)>,
    created_apps: Vec<String>,
    created_keys: Vec<String>,
    deleted_keys: Vec<String>,
}

/// A foundation held in memory. Writes are recorded, and created resources
/// become visible to later reads.
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<State>>,
}

fn not_found(what: &str, guid: &str) -> PlatformError {
    PlatformError::NotFound(format!("{} {}", what, guid))
}

fn visible_in(state: &State, instance: &ServiceInstanceResource, space_guid: &str) -> bool {
    instance.space_guid() == Some(space_guid)
        || state
            .shares
            .iter()
            .any(|(guid, space)| *guid == instance.guid && space == space_guid)
}

pub fn map(value: Value) -> CredentialMap {
    match value {
        Value::Object(m) => m,
        _ => CredentialMap::new(),
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn org(self, guid: &str, name: &str) -> Self {
        self.state.lock().orgs.push(Organization {
            guid: guid.into(),
            name: name.into(),
        });
        self
    }

    pub fn space(self, org_guid: &str, guid: &str, name: &str) -> Self {
        self.state.lock().spaces.push(Space {
            guid: guid.into(),
            name: name.into(),
            relationships: SpaceRelationships {
                organization: ToOne::to(org_guid),
            },
        });
        self
    }

    pub fn offering(self, guid: &str, label: &str) -> Self {
        self.state.lock().offerings.push(ServiceOffering {
            guid: guid.into(),
            name: label.into(),
        });
        self
    }

    pub fn plan(self, guid: &str, name: &str, offering_guid: &str) -> Self {
        self.state.lock().plans.push(ServicePlan {
            guid: guid.into(),
            name: name.into(),
            relationships: PlanRelationships {
                service_offering: ToOne::to(offering_guid),
            },
        });
        self
    }

    pub fn managed(self, guid: &str, name: &str, space_guid: &str, plan_guid: &str) -> Self {
        self.state.lock().instances.push(ServiceInstanceResource {
            guid: guid.into(),
            name: name.into(),
            instance_type: InstanceType::Managed,
            relationships: InstanceRelationships {
                space: ToOne::to(space_guid),
                service_plan: Some(ToOne::to(plan_guid)),
            },
            ..Default::default()
        });
        self
    }

    /// Shares an instance into another space; it is listed there too.
    pub fn shared_into(self, instance_guid: &str, space_guid: &str) -> Self {
        self.state
            .lock()
            .shares
            .push((instance_guid.into(), space_guid.into()));
        self
    }

    pub fn user_provided(self, guid: &str, name: &str, space_guid: &str, credentials: Value) -> Self {
        {
            let mut state = self.state.lock();
            state.instances.push(ServiceInstanceResource {
                guid: guid.into(),
                name: name.into(),
                instance_type: InstanceType::UserProvided,
                relationships: InstanceRelationships {
                    space: ToOne::to(space_guid),
                    service_plan: None,
                },
                ..Default::default()
            });
            state.ups_credentials.insert(guid.into(), map(credentials));
        }
        self
    }

    pub fn params(self, instance_guid: &str, params: Value) -> Self {
        self.state.lock().params.insert(instance_guid.into(), map(params));
        self
    }

    pub fn app(self, guid: &str, name: &str, space_guid: &str, manifest: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.apps.push(App {
                guid: guid.into(),
                name: name.into(),
                state: "STARTED".into(),
                relationships: AppRelationships {
                    space: ToOne::to(space_guid),
                },
            });
            state.manifests.insert(guid.into(), manifest.into());
        }
        self
    }

    pub fn binding(self, guid: &str, instance_guid: &str, app_guid: &str, credentials: Value) -> Self {
        {
            let mut state = self.state.lock();
            state.bindings.push(CredentialBinding {
                guid: guid.into(),
                name: None,
                binding_type: "app".into(),
                relationships: BindingRelationships {
                    app: Some(ToOne::to(app_guid)),
                    service_instance: ToOne::to(instance_guid),
                },
            });
            state.binding_details.insert(
                guid.into(),
                BindingDetails {
                    credentials: map(credentials),
                    volume_mounts: None,
                },
            );
        }
        self
    }

    pub fn key_credentials(self, credentials: Value) -> Self {
        self.state
            .lock()
            .key_credentials
            .insert("*".into(), map(credentials));
        self
    }

    pub fn created_managed(&self) -> Vec<NewManagedInstance> {
        self.state.lock().created_managed.clone()
    }

    pub fn created_user_provided(&self) -> Vec<NewUserProvidedInstance> {
        self.state.lock().created_user_provided.clone()
    }

    pub fn updates(&self) -> Vec<(String, InstanceUpdate)> {
        self.state.lock().updates.clone()
    }

    pub fn created_apps(&self) -> Vec<String> {
        self.state.lock().created_apps.clone()
    }

    pub fn created_keys(&self) -> Vec<String> {
        self.state.lock().created_keys.clone()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.state.lock().deleted_keys.clone()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn list_orgs(&self) -> Result<Vec<Organization>> {
        Ok(self.state.lock().orgs.clone())
    }

    async fn get_org_by_name(&self, name: &str) -> Result<Option<Organization>> {
        Ok(self.state.lock().orgs.iter().find(|o| o.name == name).cloned())
    }

    async fn get_org(&self, guid: &str) -> Result<Organization> {
        let state = self.state.lock();
        state
            .orgs
            .iter()
            .find(|o| o.guid == guid)
            .cloned()
            .ok_or_else(|| not_found("org", guid))
    }

    async fn list_spaces(&self, org_guid: &str) -> Result<Vec<Space>> {
        Ok(self
            .state
            .lock()
            .spaces
            .iter()
            .filter(|s| s.org_guid() == Some(org_guid))
            .cloned()
            .collect())
    }

    async fn get_space_by_name(&self, org_guid: &str, name: &str) -> Result<Option<Space>> {
        Ok(self
            .state
            .lock()
            .spaces
            .iter()
            .find(|s| s.org_guid() == Some(org_guid) && s.name == name)
            .cloned())
    }

    async fn get_space(&self, guid: &str) -> Result<Space> {
        let state = self.state.lock();
        state
            .spaces
            .iter()
            .find(|s| s.guid == guid)
            .cloned()
            .ok_or_else(|| not_found("space", guid))
    }

    async fn list_service_instances(&self, space_guid: &str) -> Result<Vec<ServiceInstanceResource>> {
        let state = self.state.lock();
        Ok(state
            .instances
            .iter()
            .filter(|i| visible_in(&state, i, space_guid))
            .cloned()
            .collect())
    }

    async fn get_service_instance_by_name(
        &self,
        space_guid: &str,
        name: &str,
    ) -> Result<Option<ServiceInstanceResource>> {
        let state = self.state.lock();
        Ok(state
            .instances
            .iter()
            .find(|i| i.name == name && visible_in(&state, i, space_guid))
            .cloned())
    }

    async fn get_service_instance_parameters(&self, guid: &str) -> Result<Option<CredentialMap>> {
        Ok(self.state.lock().params.get(guid).cloned())
    }

    async fn get_user_provided_credentials(&self, guid: &str) -> Result<CredentialMap> {
        Ok(self
            .state
            .lock()
            .ups_credentials
            .get(guid)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_service_plan(&self, guid: &str) -> Result<ServicePlan> {
        let state = self.state.lock();
        state
            .plans
            .iter()
            .find(|p| p.guid == guid)
            .cloned()
            .ok_or_else(|| not_found("plan", guid))
    }

    async fn get_service_offering(&self, guid: &str) -> Result<ServiceOffering> {
        let state = self.state.lock();
        state
            .offerings
            .iter()
            .find(|o| o.guid == guid)
            .cloned()
            .ok_or_else(|| not_found("offering", guid))
    }

    async fn find_service_plan(&self, label: &str, plan_name: &str) -> Result<Option<ServicePlan>> {
        let state = self.state.lock();
        let Some(offering) = state.offerings.iter().find(|o| o.name == label) else {
            return Ok(None);
        };
        Ok(state
            .plans
            .iter()
            .find(|p| p.name == plan_name && p.offering_guid() == Some(offering.guid.as_str()))
            .cloned())
    }

    async fn list_service_bindings(&self, instance_guid: &str) -> Result<Vec<CredentialBinding>> {
        Ok(self
            .state
            .lock()
            .bindings
            .iter()
            .filter(|b| b.service_instance_guid() == Some(instance_guid))
            .cloned()
            .collect())
    }

    async fn get_binding_credentials(&self, binding_guid: &str) -> Result<BindingDetails> {
        let state = self.state.lock();
        state
            .binding_details
            .get(binding_guid)
            .cloned()
            .ok_or_else(|| not_found("binding", binding_guid))
    }

    async fn list_service_keys(&self, instance_guid: &str) -> Result<Vec<CredentialBinding>> {
        Ok(self
            .state
            .lock()
            .keys
            .iter()
            .filter(|k| k.service_instance_guid() == Some(instance_guid))
            .cloned()
            .collect())
    }

    async fn get_service_key_credentials(&self, key_guid: &str) -> Result<CredentialMap> {
        let state = self.state.lock();
        Ok(state
            .key_credentials
            .get(key_guid)
            .or_else(|| state.key_credentials.get("*"))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_service_key(&self, instance_guid: &str, name: &str) -> Result<CredentialBinding> {
        let key = CredentialBinding {
            guid: format!("key-{}", name),
            name: Some(name.into()),
            binding_type: "key".into(),
            relationships: BindingRelationships {
                app: None,
                service_instance: ToOne::to(instance_guid),
            },
        };
        self.state.lock().created_keys.push(name.into());
        Ok(key)
    }

    async fn delete_service_key(&self, key_guid: &str) -> Result<()> {
        self.state.lock().deleted_keys.push(key_guid.into());
        Ok(())
    }

    async fn create_managed_instance(&self, request: &NewManagedInstance) -> Result<ServiceInstanceResource> {
        let mut state = self.state.lock();
        state.created_managed.push(request.clone());
        let created = ServiceInstanceResource {
            guid: format!("new-{}", request.name),
            name: request.name.clone(),
            instance_type: InstanceType::Managed,
            tags: request.tags.clone(),
            relationships: InstanceRelationships {
                space: ToOne::to(&request.space_guid),
                service_plan: Some(ToOne::to(&request.plan_guid)),
            },
            ..Default::default()
        };
        state.instances.push(created.clone());
        Ok(created)
    }

    async fn create_user_provided_instance(
        &self,
        request: &NewUserProvidedInstance,
    ) -> Result<ServiceInstanceResource> {
        let mut state = self.state.lock();
        state.created_user_provided.push(request.clone());
        let created = ServiceInstanceResource {
            guid: format!("new-{}", request.name),
            name: request.name.clone(),
            instance_type: InstanceType::UserProvided,
            tags: request.tags.clone(),
            relationships: InstanceRelationships {
                space: ToOne::to(&request.space_guid),
                service_plan: None,
            },
            ..Default::default()
        };
        state.instances.push(created.clone());
        Ok(created)
    }

    async fn update_managed_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()> {
        self.state.lock().updates.push((guid.into(), update.clone()));
        Ok(())
    }

    async fn update_user_provided_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()> {
        self.state.lock().updates.push((guid.into(), update.clone()));
        Ok(())
    }

    async fn get_app(&self, guid: &str) -> Result<App> {
        let state = self.state.lock();
        state
            .apps
            .iter()
            .find(|a| a.guid == guid)
            .cloned()
            .ok_or_else(|| not_found("app", guid))
    }

    async fn find_app_by_name(&self, space_guid: &str, name: &str) -> Result<Option<App>> {
        Ok(self
            .state
            .lock()
            .apps
            .iter()
            .find(|a| a.name == name && a.relationships.space.guid() == Some(space_guid))
            .cloned())
    }

    async fn create_app(&self, space_guid: &str, name: &str) -> Result<App> {
        let app = App {
            guid: format!("app-{}", name),
            name: name.into(),
            state: "STOPPED".into(),
            relationships: AppRelationships {
                space: ToOne::to(space_guid),
            },
        };
        let mut state = self.state.lock();
        state.created_apps.push(name.into());
        state.apps.push(app.clone());
        Ok(app)
    }

    async fn get_app_manifest(&self, app_guid: &str) -> Result<String> {
        let state = self.state.lock();
        state
            .manifests
            .get(app_guid)
            .cloned()
            .ok_or_else(|| not_found("manifest", app_guid))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        Err(not_found("path", path))
    }

    async fn send_json(&self, _method: Method, _path: &str, body: &Value) -> Result<Value> {
        Ok(json!({ "echo": body }))
    }
}

/// Hands out repositories over fixed in-memory databases.
pub struct MemoryConnector {
    pub source: MemoryDatabase,
    pub target: MemoryDatabase,
}

#[async_trait]
impl CcdbConnector for MemoryConnector {
    async fn connect(
        &self,
        settings: &CcdbSettings,
        _cancel: &CancellationToken,
    ) -> std::result::Result<CcdbRepository, StoreError> {
        let db = if settings.host == "source-db" {
            self.source.clone()
        } else {
            self.target.clone()
        };
        Ok(CcdbRepository::new(Arc::new(db)))
    }
}

pub fn ccdb_settings(host: &str) -> CcdbSettings {
    CcdbSettings {
        host: host.into(),
        port: 3306,
        database: "ccdb".into(),
        username: "admin".into(),
        password: "secret".into(),
        encryption_key: ENCRYPTION_KEY.into(),
        tunnel: None,
    }
}

/// Config with both API endpoints set and a CCDB migrator for `ccdb_services`.
pub fn config(export_dir: &Path, ccdb_services: &[&str]) -> MigrationConfig {
    let mut config = MigrationConfig {
        export_dir: export_dir.to_path_buf(),
        parallelism: 2,
        ..Default::default()
    };
    config.source.api_url = "https://api.source.example.com".into();
    config.target.api_url = "https://api.target.example.com".into();
    if !ccdb_services.is_empty() {
        config.migrators.ccdb = Some(CcdbMigratorSettings {
            services: ccdb_services.iter().map(|s| s.to_string()).collect(),
            source: Some(ccdb_settings("source-db")),
            target: Some(ccdb_settings("target-db")),
        });
    }
    config
}

/// Context over fake foundations and in-memory CCDBs.
pub fn context(
    config: MigrationConfig,
    source: &FakePlatform,
    target: &FakePlatform,
    source_db: &MemoryDatabase,
    target_db: &MemoryDatabase,
) -> Arc<MigrationContext> {
    let marshaller = Arc::new(YamlMarshaller::new(config.export_dir.clone()));
    let ctx = MigrationContext::new(
        config,
        Arc::new(source.clone()),
        Arc::new(target.clone()),
        marshaller,
        CancellationToken::new(),
    )
    .with_ccdb_connector(Arc::new(MemoryConnector {
        source: source_db.clone(),
        target: target_db.clone(),
    }));
    Arc::new(ctx)
}

pub const MANIFEST_WEB: &str = "applications:\n- name: web\n  memory: 1024M\n  instances: 2\n  routes:\n  - route: web.apps.source.example.com\n";
pub const MANIFEST_WORKER: &str = "applications:\n- name: worker\n  memory: 512M\n  disk_quota: 2G\n";
