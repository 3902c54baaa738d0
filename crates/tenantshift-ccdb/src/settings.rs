//! Connection and encryption settings for one cloud controller database.

use serde::{Deserialize, Serialize};
use tenantshift_tunnel::TunnelConfig;

use crate::cipher::EncryptionKey;
use crate::error::{Result, StoreError};

fn default_port() -> u16 {
    3306
}

fn default_database() -> String {
    "ccdb".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Where the CCDB lives and how its payloads are encrypted.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct CcdbSettings {
    /// Database host
    #[serde(default)]
    pub host: String,
    /// Database port (default: 3306)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name (default: `ccdb`)
    #[serde(default = "default_database")]
    pub database: String,
    /// Database user
    #[serde(default)]
    pub username: String,
    /// Database password
    #[serde(default)]
    pub password: String,
    /// Cloud controller database encryption key
    #[serde(default)]
    pub encryption_key: String,
    /// SSH hop, when the database is not directly routable
    #[serde(default)]
    pub tunnel: Option<TunnelSettings>,
}

/// SSH hop used to reach the database.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct TunnelSettings {
    /// SSH host
    #[serde(default)]
    pub host: String,
    /// SSH port (default: 22)
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH user
    #[serde(default)]
    pub user: String,
    /// SSH password
    #[serde(default)]
    pub password: Option<String>,
    /// PEM private key
    #[serde(default)]
    pub private_key: Option<String>,
}

impl CcdbSettings {
    /// Rejects incomplete settings: host, username, password and encryption key are
    /// required; a tunnel additionally needs host, user and a password or private key.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.encryption_key.is_empty() {
            missing.push("encryption_key");
        }
        if let Some(tunnel) = &self.tunnel {
            if tunnel.host.trim().is_empty() {
                missing.push("tunnel.host");
            }
            if tunnel.user.trim().is_empty() {
                missing.push("tunnel.user");
            }
            let has_password = tunnel.password.as_deref().is_some_and(|p| !p.is_empty());
            let has_key = tunnel.private_key.as_deref().is_some_and(|k| !k.trim().is_empty());
            if !has_password && !has_key {
                missing.push("tunnel.password or tunnel.private_key");
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::InvalidConfig(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }

    /// The configured encryption key.
    pub fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey::new(self.encryption_key.clone())
    }

    /// Tunnel configuration targeting this database, if a tunnel is configured.
    pub fn tunnel_config(&self) -> Option<TunnelConfig> {
        self.tunnel.as_ref().map(|t| {
            let mut cfg = TunnelConfig::new(self.host.clone(), self.port, t.host.clone(), t.user.clone());
            cfg.ssh_port = t.port;
            cfg.password = t.password.clone();
            cfg.private_key = t.private_key.clone();
            cfg
        })
    }
}

impl std::fmt::Debug for CcdbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CcdbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("encryption_key", &"[REDACTED]")
            .field("tunnel", &self.tunnel.as_ref().map(|t| format!("{}@{}:{}", t.user, t.host, t.port)))
            .finish()
    }
}

impl std::fmt::Debug for TunnelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> CcdbSettings {
        CcdbSettings {
            host: "10.0.16.5".into(),
            port: 3306,
            database: "ccdb".into(),
            username: "admin".into(),
            password: "pw".into(),
            encryption_key: "key".into(),
            tunnel: None,
        }
    }

    #[test]
    fn complete_settings_validate() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn reports_every_missing_field() {
        let err = CcdbSettings::default().validate().unwrap_err().to_string();
        assert!(err.contains("host"));
        assert!(err.contains("username"));
        assert!(err.contains("password"));
        assert!(err.contains("encryption_key"));
    }

    #[test]
    fn tunnel_needs_password_or_key() {
        let mut settings = complete();
        settings.tunnel = Some(TunnelSettings {
            host: "jumpbox".into(),
            port: 22,
            user: "ubuntu".into(),
            password: None,
            private_key: None,
        });
        assert!(settings.validate().is_err());

        settings.tunnel.as_mut().unwrap().private_key = Some("-----BEGIN".into());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn tunnel_config_targets_database() {
        let mut settings = complete();
        settings.tunnel = Some(TunnelSettings {
            host: "jumpbox".into(),
            port: 2222,
            user: "ubuntu".into(),
            password: Some("pw".into()),
            private_key: None,
        });
        let cfg = settings.tunnel_config().unwrap();
        assert_eq!(cfg.remote_host, "10.0.16.5");
        assert_eq!(cfg.remote_port, 3306);
        assert_eq!(cfg.ssh_addr(), "jumpbox:2222");
        assert!(complete().tunnel_config().is_none());
    }

    #[test]
    fn defaults_when_deserialized() {
        let settings: CcdbSettings = serde_json::from_str(r#"{"host":"db"}"#).unwrap();
        assert_eq!(settings.port, 3306);
        assert_eq!(settings.database, "ccdb");
    }

    #[test]
    fn debug_redacts_secrets() {
        let out = format!("{:?}", complete());
        assert!(!out.contains("\"pw\""));
        assert!(!out.contains("\"key\""));
    }
}
