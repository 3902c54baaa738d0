//! SSH tunnel: local listener on an ephemeral port, one SSH session per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client;
use russh_keys::key;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TunnelConfig;
use crate::error::{Result, TunnelError};
use crate::relay::relay;

/// How the SSH hop authenticates, in the order attempts are made.
#[derive(Clone)]
pub(crate) enum AuthMethod {
    PrivateKey(Arc<key::KeyPair>),
    Password(String),
    Agent,
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::PrivateKey(_) => write!(f, "PrivateKey"),
            AuthMethod::Password(_) => write!(f, "Password"),
            AuthMethod::Agent => write!(f, "Agent"),
        }
    }
}

/// Builds the auth attempt list: key, then password, then the agent socket when present.
pub(crate) fn auth_methods(config: &TunnelConfig, agent_available: bool) -> Result<Vec<AuthMethod>> {
    let mut methods = Vec::new();
    if let Some(pem) = config.private_key.as_deref().filter(|k| !k.trim().is_empty()) {
        let pair = russh_keys::decode_secret_key(pem, config.private_key_passphrase.as_deref())?;
        methods.push(AuthMethod::PrivateKey(Arc::new(pair)));
    }
    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        methods.push(AuthMethod::Password(password.to_string()));
    }
    if agent_available {
        methods.push(AuthMethod::Agent);
    }
    if methods.is_empty() {
        return Err(TunnelError::InvalidConfig(
            "no ssh authentication method available".into(),
        ));
    }
    Ok(methods)
}

/// Accepts any host key. The tunnel hop is an operator-managed jumpbox.
struct PermissiveHostKeys {
    host: String,
}

#[async_trait]
impl client::Handler for PermissiveHostKeys {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "accepting ssh host key"
        );
        Ok(true)
    }
}

struct Session {
    config: Arc<TunnelConfig>,
    ssh: Arc<client::Config>,
    methods: Arc<Vec<AuthMethod>>,
}

impl Session {
    async fn open(&self) -> Result<client::Handle<PermissiveHostKeys>> {
        let addr = self.config.ssh_addr();
        let handler = PermissiveHostKeys {
            host: self.config.ssh_host.clone(),
        };
        let connect = client::connect(Arc::clone(&self.ssh), addr.clone(), handler);
        let mut handle = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| TunnelError::ConnectTimeout {
                addr: addr.clone(),
                timeout_ms: self.config.connect_timeout.as_millis() as u64,
            })??;

        for method in self.methods.iter() {
            if self.authenticate(&mut handle, method).await? {
                debug!(addr = %addr, method = ?method, "ssh session authenticated");
                return Ok(handle);
            }
            debug!(addr = %addr, method = ?method, "ssh auth method rejected");
        }
        Err(TunnelError::AuthFailed {
            user: self.config.user.clone(),
            host: self.config.ssh_host.clone(),
        })
    }

    async fn authenticate(
        &self,
        handle: &mut client::Handle<PermissiveHostKeys>,
        method: &AuthMethod,
    ) -> Result<bool> {
        let user = self.config.user.as_str();
        match method {
            AuthMethod::PrivateKey(pair) => Ok(handle
                .authenticate_publickey(user, Arc::clone(pair))
                .await?),
            AuthMethod::Password(password) => {
                Ok(handle.authenticate_password(user, password).await?)
            }
            AuthMethod::Agent => authenticate_with_agent(handle, user).await,
        }
    }

    /// Opens an SSH session and relays `local` to the remote host through it.
    async fn forward(&self, local: TcpStream, peer: SocketAddr) -> Result<()> {
        let handle = self.open().await?;
        let channel = handle
            .channel_open_direct_tcpip(
                self.config.remote_host.clone(),
                u32::from(self.config.remote_port),
                peer.ip().to_string(),
                u32::from(peer.port()),
            )
            .await?;

        let copied = relay(local, channel.into_stream()).await?;
        debug!(peer = %peer, bytes = copied, "tunnel connection closed");

        if let Err(e) = handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(error = %e, "ssh disconnect failed");
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn authenticate_with_agent(
    handle: &mut client::Handle<PermissiveHostKeys>,
    user: &str,
) -> Result<bool> {
    use russh_keys::agent::client::AgentClient;

    let mut agent = AgentClient::connect_env().await?;
    let identities = agent.request_identities().await?;
    for identity in identities {
        let (returned, result) = handle.authenticate_future(user, identity, agent).await;
        agent = returned;
        if result.map_err(|e| TunnelError::Agent(e.to_string()))? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _handle: &mut client::Handle<PermissiveHostKeys>,
    _user: &str,
) -> Result<bool> {
    Ok(false)
}

/// A bound tunnel. Clients connect to [`Tunnel::local_addr`].
pub struct Tunnel {
    listener: TcpListener,
    local_addr: SocketAddr,
    session: Arc<Session>,
}

impl Tunnel {
    /// Validates the config, resolves auth methods and binds `127.0.0.1:0`.
    pub async fn bind(config: TunnelConfig) -> Result<Self> {
        config.validate()?;
        let agent_available = std::env::var_os("SSH_AUTH_SOCK").is_some();
        let methods = auth_methods(&config, agent_available)?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_addr = listener.local_addr()?;
        info!(
            local = %local_addr,
            via = %config.ssh_addr(),
            remote = %format!("{}:{}", config.remote_host, config.remote_port),
            "tunnel bound"
        );

        Ok(Self {
            listener,
            local_addr,
            session: Arc::new(Session {
                config: Arc::new(config),
                ssh: Arc::new(client::Config::default()),
                methods: Arc::new(methods),
            }),
        })
    }

    /// Local address clients should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Local port clients should connect to.
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Accepts local connections until `cancel` fires, forwarding each one
    /// through its own SSH session.
    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(local = %self.local_addr, "tunnel stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "tunnel accept failed");
                            continue;
                        }
                    };
                    let session = Arc::clone(&self.session);
                    let conn_cancel = cancel.child_token();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = conn_cancel.cancelled() => {}
                            result = session.forward(stream, peer) => {
                                if let Err(e) = result {
                                    warn!(peer = %peer, error = %e, "tunnel forward failed");
                                }
                            }
                        }
                    });
                }
            }
        }
    }

    /// Runs [`Tunnel::start`] on a background task and returns the local address.
    pub fn spawn(self, cancel: CancellationToken) -> (SocketAddr, JoinHandle<Result<()>>) {
        let addr = self.local_addr;
        (addr, tokio::spawn(self.start(cancel)))
    }
}
