//! Error types for the SSH tunnel

use thiserror::Error;

/// Errors raised while opening or running a tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Tunnel settings are missing or inconsistent
    #[error("invalid tunnel configuration: {0}")]
    InvalidConfig(String),

    /// The jump host did not accept a connection in time
    #[error("ssh connect timeout after {timeout_ms}ms to {addr}")]
    ConnectTimeout {
        /// Jump host address
        addr: String,
        /// Configured connect timeout
        timeout_ms: u64,
    },

    /// No offered key or password was accepted
    #[error("ssh authentication failed for {user}@{host}")]
    AuthFailed {
        /// Login user
        user: String,
        /// Jump host
        host: String,
    },

    /// The local SSH agent could not be reached or used
    #[error("ssh agent: {0}")]
    Agent(String),

    /// Protocol or channel failure
    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    /// Private key could not be read or decoded
    #[error("ssh key error: {0}")]
    Key(#[from] russh_keys::Error),

    /// Local listener or socket failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;
