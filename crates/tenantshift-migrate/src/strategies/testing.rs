//! Scripted [`PlatformClient`] for strategy tests: one optional existing
//! instance, one optional plan, and a record of every write.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;
use tenantshift_core::{CredentialMap, InstanceType};
use tenantshift_platform::resources::{InstanceRelationships, PlanRelationships, ToOne};
use tenantshift_platform::{
    App, BindingDetails, CredentialBinding, InstanceUpdate, NewManagedInstance,
    NewUserProvidedInstance, Organization, PlatformClient, PlatformError, Result,
    ServiceInstanceResource, ServiceOffering, ServicePlan, Space,
};

#[derive(Default)]
pub(crate) struct ScriptedPlatform {
    existing: Option<ServiceInstanceResource>,
    plan: Option<ServicePlan>,
    pub plan_lookups: Mutex<Vec<(String, String)>>,
    pub created_managed: Mutex<Vec<NewManagedInstance>>,
    pub created_user_provided: Mutex<Vec<NewUserProvidedInstance>>,
    pub updates: Mutex<Vec<(String, InstanceUpdate)>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// An instance of `instance_type` already holds `name` in the target space.
    pub fn existing(mut self, guid: &str, name: &str, instance_type: InstanceType) -> Self {
        self.existing = Some(ServiceInstanceResource {
            guid: guid.into(),
            name: name.into(),
            instance_type,
            relationships: InstanceRelationships {
                space: ToOne::to("t-s"),
                service_plan: None,
            },
            ..Default::default()
        });
        self
    }

    /// `find_service_plan` answers with this plan for any label and name.
    pub fn plan(mut self, guid: &str, name: &str) -> Self {
        self.plan = Some(ServicePlan {
            guid: guid.into(),
            name: name.into(),
            relationships: PlanRelationships {
                service_offering: ToOne::to("off-1"),
            },
        });
        self
    }

    pub fn writes(&self) -> usize {
        self.created_managed.lock().len()
            + self.created_user_provided.lock().len()
            + self.updates.lock().len()
    }
}

fn unscripted<T>(what: &str) -> Result<T> {
    Err(PlatformError::NotFound(format!("unscripted call: {}", what)))
}

#[async_trait]
impl PlatformClient for ScriptedPlatform {
    async fn list_orgs(&self) -> Result<Vec<Organization>> {
        unscripted("list_orgs")
    }

    async fn get_org_by_name(&self, _name: &str) -> Result<Option<Organization>> {
        unscripted("get_org_by_name")
    }

    async fn get_org(&self, _guid: &str) -> Result<Organization> {
        unscripted("get_org")
    }

    async fn list_spaces(&self, _org_guid: &str) -> Result<Vec<Space>> {
        unscripted("list_spaces")
    }

    async fn get_space_by_name(&self, _org_guid: &str, _name: &str) -> Result<Option<Space>> {
        unscripted("get_space_by_name")
    }

    async fn get_space(&self, _guid: &str) -> Result<Space> {
        unscripted("get_space")
    }

    async fn list_service_instances(&self, _space_guid: &str) -> Result<Vec<ServiceInstanceResource>> {
        unscripted("list_service_instances")
    }

    async fn get_service_instance_by_name(
        &self,
        _space_guid: &str,
        name: &str,
    ) -> Result<Option<ServiceInstanceResource>> {
        Ok(self.existing.clone().filter(|i| i.name == name))
    }

    async fn get_service_instance_parameters(&self, _guid: &str) -> Result<Option<CredentialMap>> {
        unscripted("get_service_instance_parameters")
    }

    async fn get_user_provided_credentials(&self, _guid: &str) -> Result<CredentialMap> {
        unscripted("get_user_provided_credentials")
    }

    async fn get_service_plan(&self, _guid: &str) -> Result<ServicePlan> {
        unscripted("get_service_plan")
    }

    async fn get_service_offering(&self, _guid: &str) -> Result<ServiceOffering> {
        unscripted("get_service_offering")
    }

    async fn find_service_plan(&self, label: &str, plan_name: &str) -> Result<Option<ServicePlan>> {
        self.plan_lookups
            .lock()
            .push((label.to_string(), plan_name.to_string()));
        Ok(self.plan.clone())
    }

    async fn list_service_bindings(&self, _instance_guid: &str) -> Result<Vec<CredentialBinding>> {
        unscripted("list_service_bindings")
    }

    async fn get_binding_credentials(&self, _binding_guid: &str) -> Result<BindingDetails> {
        unscripted("get_binding_credentials")
    }

    async fn list_service_keys(&self, _instance_guid: &str) -> Result<Vec<CredentialBinding>> {
        unscripted("list_service_keys")
    }

    async fn get_service_key_credentials(&self, _key_guid: &str) -> Result<CredentialMap> {
        unscripted("get_service_key_credentials")
    }

    async fn create_service_key(&self, _instance_guid: &str, _name: &str) -> Result<CredentialBinding> {
        unscripted("create_service_key")
    }

    async fn delete_service_key(&self, _key_guid: &str) -> Result<()> {
        unscripted("delete_service_key")
    }

    async fn create_managed_instance(&self, request: &NewManagedInstance) -> Result<ServiceInstanceResource> {
        self.created_managed.lock().push(request.clone());
        Ok(ServiceInstanceResource {
            guid: format!("new-{}", request.name),
            name: request.name.clone(),
            ..Default::default()
        })
    }

    async fn create_user_provided_instance(
        &self,
        request: &NewUserProvidedInstance,
    ) -> Result<ServiceInstanceResource> {
        self.created_user_provided.lock().push(request.clone());
        Ok(ServiceInstanceResource {
            guid: format!("new-{}", request.name),
            name: request.name.clone(),
            instance_type: InstanceType::UserProvided,
            ..Default::default()
        })
    }

    async fn update_managed_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()> {
        self.updates.lock().push((guid.to_string(), update.clone()));
        Ok(())
    }

    async fn update_user_provided_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()> {
        self.updates.lock().push((guid.to_string(), update.clone()));
        Ok(())
    }

    async fn get_app(&self, _guid: &str) -> Result<App> {
        unscripted("get_app")
    }

    async fn find_app_by_name(&self, _space_guid: &str, _name: &str) -> Result<Option<App>> {
        unscripted("find_app_by_name")
    }

    async fn create_app(&self, _space_guid: &str, _name: &str) -> Result<App> {
        unscripted("create_app")
    }

    async fn get_app_manifest(&self, _app_guid: &str) -> Result<String> {
        unscripted("get_app_manifest")
    }

    async fn get_json(&self, _path: &str) -> Result<Value> {
        unscripted("get_json")
    }

    async fn send_json(&self, _method: Method, _path: &str, _body: &Value) -> Result<Value> {
        unscripted("send_json")
    }
}
