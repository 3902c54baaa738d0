//! `PlatformClient` capability set and its HTTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tenantshift_core::CredentialMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PlatformConfig;
use crate::error::{PlatformError, Result};
use crate::resources::{
    App, BindingDetails, CredentialBinding, InstanceUpdate, NewManagedInstance,
    NewUserProvidedInstance, Organization, Page, ServiceInstanceResource, ServiceOffering,
    ServicePlan, Space, ToOne,
};
use crate::retry::{do_with_retry, RetryConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the migrator needs from a foundation's API.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// All organizations.
    async fn list_orgs(&self) -> Result<Vec<Organization>>;
    /// Organization by exact name.
    async fn get_org_by_name(&self, name: &str) -> Result<Option<Organization>>;
    /// Organization by GUID.
    async fn get_org(&self, guid: &str) -> Result<Organization>;
    /// All spaces of an organization, across pages.
    async fn list_spaces(&self, org_guid: &str) -> Result<Vec<Space>>;
    /// Space by exact name within an organization.
    async fn get_space_by_name(&self, org_guid: &str, name: &str) -> Result<Option<Space>>;
    /// Space by GUID.
    async fn get_space(&self, guid: &str) -> Result<Space>;
    /// All service instances in a space.
    async fn list_service_instances(&self, space_guid: &str) -> Result<Vec<ServiceInstanceResource>>;
    /// Service instance by exact name within a space.
    async fn get_service_instance_by_name(
        &self,
        space_guid: &str,
        name: &str,
    ) -> Result<Option<ServiceInstanceResource>>;
    /// Provisioning parameters; `None` when the broker does not support fetching them.
    async fn get_service_instance_parameters(&self, guid: &str) -> Result<Option<CredentialMap>>;
    /// Credentials of a user-provided instance.
    async fn get_user_provided_credentials(&self, guid: &str) -> Result<CredentialMap>;
    /// Plan by GUID.
    async fn get_service_plan(&self, guid: &str) -> Result<ServicePlan>;
    /// Offering by GUID.
    async fn get_service_offering(&self, guid: &str) -> Result<ServiceOffering>;
    /// Plan by offering label and exact plan name.
    async fn find_service_plan(&self, label: &str, plan_name: &str) -> Result<Option<ServicePlan>>;
    /// App bindings of an instance.
    async fn list_service_bindings(&self, instance_guid: &str) -> Result<Vec<CredentialBinding>>;
    /// Credentials and volume mounts of a binding.
    async fn get_binding_credentials(&self, binding_guid: &str) -> Result<BindingDetails>;
    /// Service keys of an instance.
    async fn list_service_keys(&self, instance_guid: &str) -> Result<Vec<CredentialBinding>>;
    /// Credentials of a service key.
    async fn get_service_key_credentials(&self, key_guid: &str) -> Result<CredentialMap>;
    /// Creates a service key.
    async fn create_service_key(&self, instance_guid: &str, name: &str) -> Result<CredentialBinding>;
    /// Deletes a service key.
    async fn delete_service_key(&self, key_guid: &str) -> Result<()>;
    /// Creates a managed instance.
    async fn create_managed_instance(&self, request: &NewManagedInstance) -> Result<ServiceInstanceResource>;
    /// Creates a user-provided instance.
    async fn create_user_provided_instance(
        &self,
        request: &NewUserProvidedInstance,
    ) -> Result<ServiceInstanceResource>;
    /// Updates a managed instance in place.
    async fn update_managed_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()>;
    /// Updates a user-provided instance in place.
    async fn update_user_provided_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()>;
    /// App by GUID.
    async fn get_app(&self, guid: &str) -> Result<App>;
    /// App by exact name within a space.
    async fn find_app_by_name(&self, space_guid: &str, name: &str) -> Result<Option<App>>;
    /// Creates a stopped placeholder app.
    async fn create_app(&self, space_guid: &str, name: &str) -> Result<App>;
    /// Raw YAML manifest of an app.
    async fn get_app_manifest(&self, app_guid: &str) -> Result<String>;
    /// Authenticated GET of any v2 or v3 path.
    async fn get_json(&self, path: &str) -> Result<Value>;
    /// Authenticated request with a JSON body to any v2 or v3 path.
    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value>;
}

struct Session {
    http: reqwest::Client,
    token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// HTTP client for one foundation.
///
/// The HTTP client and token are built on first use and shared by every call
/// afterwards. If building them fails, every later call fails with the same
/// [`PlatformError::ClientConstruction`].
pub struct CfClient {
    config: PlatformConfig,
    retry: RetryConfig,
    cancel: CancellationToken,
    session: OnceCell<std::result::Result<Arc<Session>, String>>,
}

impl std::fmt::Debug for CfClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CfClient")
            .field("api", &self.config.api_url)
            .field("connected", &self.session.initialized())
            .finish()
    }
}

impl CfClient {
    /// Creates a client; nothing is contacted until the first call.
    pub fn new(config: PlatformConfig, retry: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            retry,
            cancel,
            session: OnceCell::new(),
        }
    }

    async fn session(&self) -> Result<Arc<Session>> {
        self.session
            .get_or_init(|| async { self.connect().await.map_err(|e| e.to_string()) })
            .await
            .clone()
            .map_err(PlatformError::ClientConstruction)
    }

    async fn connect(&self) -> Result<Arc<Session>> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.config.skip_tls_validation)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let token = match self.config.access_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => strip_bearer(token).to_string(),
            _ => self.password_grant(&http).await?,
        };
        info!(api = %self.config.api_base(), "platform session established");
        Ok(Arc::new(Session { http, token }))
    }

    async fn password_grant(&self, http: &reqwest::Client) -> Result<String> {
        let url = format!("{}/oauth/token", self.config.uaa_base());
        do_with_retry(&self.retry, &self.cancel, || async {
            let resp = http
                .post(&url)
                .basic_auth("cf", Some(""))
                .form(&[
                    ("grant_type", "password"),
                    ("username", self.config.username.as_str()),
                    ("password", self.config.password.as_str()),
                ])
                .send()
                .await
                .map_err(PlatformError::from_transport)?;
            let body = read_body(&url, resp).await?;
            let token: TokenResponse = decode(&url, &body)?;
            Ok(token.access_token)
        })
        .await
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.config.api_base(), path)
        };
        let mut url = Url::parse(&raw).map_err(|e| PlatformError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn call(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<String> {
        let session = self.session().await?;
        do_with_retry(&self.retry, &self.cancel, || {
            let session = Arc::clone(&session);
            let method = method.clone();
            async move {
                let mut req = session
                    .http
                    .request(method, url.clone())
                    .bearer_auth(&session.token);
                if let Some(body) = body {
                    req = req.json(body);
                }
                let resp = req.send().await.map_err(PlatformError::from_transport)?;
                read_body(url.as_str(), resp).await
            }
        })
        .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path, query)?;
        let body = self.call(Method::GET, &url, None).await?;
        decode(url.as_str(), &body)
    }

    async fn list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let mut url = self.url(path, query)?;
        let mut out = Vec::new();
        loop {
            let body = self.call(Method::GET, &url, None).await?;
            let page: Page<T> = decode(url.as_str(), &body)?;
            out.extend(page.resources);
            match page.pagination.next {
                Some(next) => url = self.url(&next.href, &[])?,
                None => break,
            }
        }
        Ok(out)
    }

    async fn send(&self, method: Method, path: &str, body: &Value) -> Result<String> {
        let url = self.url(path, &[])?;
        self.call(method, &url, Some(body)).await
    }
}

#[async_trait]
impl PlatformClient for CfClient {
    async fn list_orgs(&self) -> Result<Vec<Organization>> {
        self.list("/v3/organizations", &[]).await
    }

    async fn get_org_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let orgs: Vec<Organization> = self.list("/v3/organizations", &[("names", name)]).await?;
        Ok(orgs.into_iter().find(|o| o.name == name))
    }

    async fn get_org(&self, guid: &str) -> Result<Organization> {
        self.get(&format!("/v3/organizations/{}", guid), &[]).await
    }

    async fn list_spaces(&self, org_guid: &str) -> Result<Vec<Space>> {
        self.list("/v3/spaces", &[("organization_guids", org_guid)]).await
    }

    async fn get_space_by_name(&self, org_guid: &str, name: &str) -> Result<Option<Space>> {
        let spaces: Vec<Space> = self
            .list("/v3/spaces", &[("organization_guids", org_guid), ("names", name)])
            .await?;
        Ok(spaces.into_iter().find(|s| s.name == name))
    }

    async fn get_space(&self, guid: &str) -> Result<Space> {
        self.get(&format!("/v3/spaces/{}", guid), &[]).await
    }

    async fn list_service_instances(&self, space_guid: &str) -> Result<Vec<ServiceInstanceResource>> {
        self.list("/v3/service_instances", &[("space_guids", space_guid)]).await
    }

    async fn get_service_instance_by_name(
        &self,
        space_guid: &str,
        name: &str,
    ) -> Result<Option<ServiceInstanceResource>> {
        let found: Vec<ServiceInstanceResource> = self
            .list("/v3/service_instances", &[("space_guids", space_guid), ("names", name)])
            .await?;
        Ok(found.into_iter().find(|si| si.name == name))
    }

    async fn get_service_instance_parameters(&self, guid: &str) -> Result<Option<CredentialMap>> {
        match self
            .get(&format!("/v3/service_instances/{}/parameters", guid), &[])
            .await
        {
            Ok(params) => Ok(Some(params)),
            Err(PlatformError::Http { status, body }) if (400..500).contains(&status) => {
                debug!(instance = guid, status, body = %body, "parameters not retrievable");
                Ok(None)
            }
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_user_provided_credentials(&self, guid: &str) -> Result<CredentialMap> {
        self.get(&format!("/v3/service_instances/{}/credentials", guid), &[])
            .await
    }

    async fn get_service_plan(&self, guid: &str) -> Result<ServicePlan> {
        self.get(&format!("/v3/service_plans/{}", guid), &[]).await
    }

    async fn get_service_offering(&self, guid: &str) -> Result<ServiceOffering> {
        self.get(&format!("/v3/service_offerings/{}", guid), &[]).await
    }

    async fn find_service_plan(&self, label: &str, plan_name: &str) -> Result<Option<ServicePlan>> {
        let plans: Vec<ServicePlan> = self
            .list(
                "/v3/service_plans",
                &[("service_offering_names", label), ("names", plan_name)],
            )
            .await?;
        Ok(plans.into_iter().find(|p| p.name == plan_name))
    }

    async fn list_service_bindings(&self, instance_guid: &str) -> Result<Vec<CredentialBinding>> {
        self.list(
            "/v3/service_credential_bindings",
            &[("service_instance_guids", instance_guid), ("type", "app")],
        )
        .await
    }

    async fn get_binding_credentials(&self, binding_guid: &str) -> Result<BindingDetails> {
        self.get(
            &format!("/v3/service_credential_bindings/{}/details", binding_guid),
            &[],
        )
        .await
    }

    async fn list_service_keys(&self, instance_guid: &str) -> Result<Vec<CredentialBinding>> {
        self.list(
            "/v3/service_credential_bindings",
            &[("service_instance_guids", instance_guid), ("type", "key")],
        )
        .await
    }

    async fn get_service_key_credentials(&self, key_guid: &str) -> Result<CredentialMap> {
        Ok(self.get_binding_credentials(key_guid).await?.credentials)
    }

    async fn create_service_key(&self, instance_guid: &str, name: &str) -> Result<CredentialBinding> {
        let body = json!({
            "type": "key",
            "name": name,
            "relationships": { "service_instance": ToOne::to(instance_guid) },
        });
        self.send(Method::POST, "/v3/service_credential_bindings", &body)
            .await?;
        let keys: Vec<CredentialBinding> = self
            .list(
                "/v3/service_credential_bindings",
                &[
                    ("service_instance_guids", instance_guid),
                    ("type", "key"),
                    ("names", name),
                ],
            )
            .await?;
        keys.into_iter()
            .find(|k| k.name.as_deref() == Some(name))
            .ok_or_else(|| PlatformError::NotFound(format!("service key {}", name)))
    }

    async fn delete_service_key(&self, key_guid: &str) -> Result<()> {
        let url = self.url(&format!("/v3/service_credential_bindings/{}", key_guid), &[])?;
        self.call(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn create_managed_instance(&self, request: &NewManagedInstance) -> Result<ServiceInstanceResource> {
        // Managed creates are asynchronous (202 + job); read the instance back by name.
        self.send(Method::POST, "/v3/service_instances", &request.to_body())
            .await?;
        self.get_service_instance_by_name(&request.space_guid, &request.name)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("service instance {}", request.name)))
    }

    async fn create_user_provided_instance(
        &self,
        request: &NewUserProvidedInstance,
    ) -> Result<ServiceInstanceResource> {
        let body = self
            .send(Method::POST, "/v3/service_instances", &request.to_body())
            .await?;
        decode("/v3/service_instances", &body)
    }

    async fn update_managed_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()> {
        self.send(
            Method::PATCH,
            &format!("/v3/service_instances/{}", guid),
            &update.to_body(),
        )
        .await?;
        Ok(())
    }

    async fn update_user_provided_instance(&self, guid: &str, update: &InstanceUpdate) -> Result<()> {
        self.send(
            Method::PATCH,
            &format!("/v3/service_instances/{}", guid),
            &update.to_body(),
        )
        .await?;
        Ok(())
    }

    async fn get_app(&self, guid: &str) -> Result<App> {
        self.get(&format!("/v3/apps/{}", guid), &[]).await
    }

    async fn find_app_by_name(&self, space_guid: &str, name: &str) -> Result<Option<App>> {
        let apps: Vec<App> = self
            .list("/v3/apps", &[("space_guids", space_guid), ("names", name)])
            .await?;
        Ok(apps.into_iter().find(|a| a.name == name))
    }

    async fn create_app(&self, space_guid: &str, name: &str) -> Result<App> {
        let body = json!({
            "name": name,
            "relationships": { "space": ToOne::to(space_guid) },
        });
        let created = self.send(Method::POST, "/v3/apps", &body).await?;
        decode("/v3/apps", &created)
    }

    async fn get_app_manifest(&self, app_guid: &str) -> Result<String> {
        let url = self.url(&format!("/v3/apps/{}/manifest", app_guid), &[])?;
        self.call(Method::GET, &url, None).await
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path, &[])?;
        let body = self.call(Method::GET, &url, None).await?;
        decode_or_null(url.as_str(), &body)
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value> {
        let text = self.send(method, path, body).await?;
        decode_or_null(path, &text)
    }
}

fn strip_bearer(token: &str) -> &str {
    token
        .strip_prefix("bearer ")
        .or_else(|| token.strip_prefix("Bearer "))
        .unwrap_or(token)
}

async fn read_body(url: &str, resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await.map_err(PlatformError::from_transport)?;
    if status.is_success() {
        Ok(text)
    } else {
        Err(PlatformError::from_status(status.as_u16(), url, text))
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| PlatformError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn decode_or_null(url: &str, body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        Ok(Value::Null)
    } else {
        decode(url, body)
    }
}
