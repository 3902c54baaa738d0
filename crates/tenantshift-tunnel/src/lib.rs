#![warn(missing_docs)]

//! tenantshift tunnel: forwards local TCP connections through an SSH hop to a
//! database host that the migration process cannot reach directly.
//!
//! local client → 127.0.0.1:<ephemeral> → ssh session → direct-tcpip → remote host:port

pub mod config;
pub mod error;
pub mod relay;
pub mod tunnel;

pub use config::TunnelConfig;
pub use error::{Result, TunnelError};
pub use relay::relay;
pub use tunnel::Tunnel;
