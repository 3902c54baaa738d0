//! Endpoint and credentials for one foundation's API.

use serde::{Deserialize, Serialize};

/// How to reach and authenticate against one foundation.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct PlatformConfig {
    /// API base URL, e.g. `https://api.sys.example.com`
    pub api_url: String,
    /// UAA base URL; derived from `api_url` when empty
    #[serde(default)]
    pub uaa_url: String,
    /// Admin user for the password grant
    #[serde(default)]
    pub username: String,
    /// Admin password for the password grant
    #[serde(default)]
    pub password: String,
    /// Static bearer token; skips the password grant when set
    #[serde(default)]
    pub access_token: Option<String>,
    /// Accept self-signed certificates
    #[serde(default)]
    pub skip_tls_validation: bool,
}

impl PlatformConfig {
    /// API URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// UAA URL without a trailing slash; `api.` is swapped for `uaa.` when unset.
    pub fn uaa_base(&self) -> String {
        if self.uaa_url.is_empty() {
            self.api_base().replacen("://api.", "://uaa.", 1)
        } else {
            self.uaa_url.trim_end_matches('/').to_string()
        }
    }
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_url", &self.api_url)
            .field("uaa_url", &self.uaa_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("skip_tls_validation", &self.skip_tls_validation)
            .finish()
    }
}
