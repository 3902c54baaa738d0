//! Tunnel configuration.

use std::time::Duration;

use crate::error::{Result, TunnelError};

/// Where to tunnel to, and how to authenticate the SSH hop.
#[derive(Clone)]
pub struct TunnelConfig {
    /// Database host as seen from the SSH host
    pub remote_host: String,
    /// Database port
    pub remote_port: u16,
    /// SSH host (usually the platform's jumpbox or director)
    pub ssh_host: String,
    /// SSH port (default: 22)
    pub ssh_port: u16,
    /// SSH user
    pub user: String,
    /// Password for password authentication
    pub password: Option<String>,
    /// PEM-encoded private key for key authentication
    pub private_key: Option<String>,
    /// Passphrase protecting `private_key`
    pub private_key_passphrase: Option<String>,
    /// Timeout for establishing each SSH session (default: 10 seconds)
    pub connect_timeout: Duration,
}

impl TunnelConfig {
    /// Creates a config with default SSH port and connect timeout.
    pub fn new(
        remote_host: impl Into<String>,
        remote_port: u16,
        ssh_host: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            ssh_host: ssh_host.into(),
            ssh_port: 22,
            user: user.into(),
            password: None,
            private_key: None,
            private_key_passphrase: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the PEM private key.
    pub fn with_private_key(mut self, pem: impl Into<String>) -> Self {
        self.private_key = Some(pem.into());
        self
    }

    /// Rejects configs that could never open a session.
    pub fn validate(&self) -> Result<()> {
        if self.remote_host.trim().is_empty() {
            return Err(TunnelError::InvalidConfig("remote host is required".into()));
        }
        if self.ssh_host.trim().is_empty() {
            return Err(TunnelError::InvalidConfig("tunnel host is required".into()));
        }
        if self.user.trim().is_empty() {
            return Err(TunnelError::InvalidConfig("tunnel user is required".into()));
        }
        if !has_value(&self.password) && !has_value(&self.private_key) {
            return Err(TunnelError::InvalidConfig(
                "tunnel password or private key is required".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` of the SSH hop.
    pub fn ssh_addr(&self) -> String {
        format!("{}:{}", self.ssh_host, self.ssh_port)
    }
}

fn has_value(v: &Option<String>) -> bool {
    v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

impl std::fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("ssh_host", &self.ssh_host)
            .field("ssh_port", &self.ssh_port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
