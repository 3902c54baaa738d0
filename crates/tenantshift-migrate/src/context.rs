//! Shared state of one export or import run.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tenantshift_ccdb::{CcdbRepository, CcdbSettings, EncryptionKey, StoreError};
use tenantshift_core::{MigrationSummary, ServiceInstance};
use tenantshift_platform::PlatformClient;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::marshaller::FileMarshaller;

/// Export reads the source foundation; import writes the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Source foundation to files
    Export,
    /// Files to target foundation
    Import,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Export => f.write_str("export"),
            Direction::Import => f.write_str("import"),
        }
    }
}

/// Org and space an instance lives in, on the foundation being worked on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    /// Organization name
    pub org: String,
    /// Space name
    pub space: String,
    /// Organization GUID
    pub org_guid: String,
    /// Space GUID
    pub space_guid: String,
}

impl Location {
    /// Builds a location from names and GUIDs.
    pub fn new(
        org: impl Into<String>,
        space: impl Into<String>,
        org_guid: impl Into<String>,
        space_guid: impl Into<String>,
    ) -> Self {
        Self {
            org: org.into(),
            space: space.into(),
            org_guid: org_guid.into(),
            space_guid: space_guid.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.space)
    }
}

/// Object-storage seam of the relational-backup migrator.
#[async_trait]
pub trait BackupBackend: Send + Sync {
    /// Backs up the source instance's data.
    async fn backup(&self, location: &Location, instance: &ServiceInstance) -> Result<()>;
    /// Restores the data into the target instance.
    async fn restore(&self, location: &Location, instance: &ServiceInstance) -> Result<()>;
}

/// Opens CCDB repositories.
#[async_trait]
pub trait CcdbConnector: Send + Sync {
    /// Connects to the database described by `settings`.
    async fn connect(
        &self,
        settings: &CcdbSettings,
        cancel: &CancellationToken,
    ) -> std::result::Result<CcdbRepository, StoreError>;
}

/// Connects over MySQL, through an SSH tunnel when configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

#[async_trait]
impl CcdbConnector for MySqlConnector {
    async fn connect(
        &self,
        settings: &CcdbSettings,
        cancel: &CancellationToken,
    ) -> std::result::Result<CcdbRepository, StoreError> {
        CcdbRepository::connect(settings, cancel).await
    }
}

/// Collaborators and shared state of a run.
///
/// One CCDB repository is opened per foundation on first use and shared by
/// every task, so the salt length is discovered once per connection.
pub struct MigrationContext {
    /// Run configuration
    pub config: MigrationConfig,
    /// Source foundation API
    pub source: Arc<dyn PlatformClient>,
    /// Target foundation API
    pub target: Arc<dyn PlatformClient>,
    /// Record and manifest files
    pub marshaller: Arc<dyn FileMarshaller>,
    /// Outcomes of every instance
    pub summary: Arc<MigrationSummary>,
    /// Root cancellation
    pub cancel: CancellationToken,
    connector: Arc<dyn CcdbConnector>,
    source_ccdb: OnceCell<Arc<CcdbRepository>>,
    target_ccdb: OnceCell<Arc<CcdbRepository>>,
    backup: Option<Arc<dyn BackupBackend>>,
}

impl fmt::Debug for MigrationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationContext")
            .field("export_dir", &self.config.export_dir)
            .field("dry_run", &self.config.dry_run)
            .field("source_ccdb", &self.source_ccdb.get())
            .field("target_ccdb", &self.target_ccdb.get())
            .field("backup", &self.backup.is_some())
            .finish_non_exhaustive()
    }
}

impl MigrationContext {
    /// Creates a context that connects to CCDBs over MySQL and has no backup backend.
    pub fn new(
        config: MigrationConfig,
        source: Arc<dyn PlatformClient>,
        target: Arc<dyn PlatformClient>,
        marshaller: Arc<dyn FileMarshaller>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            target,
            marshaller,
            summary: Arc::new(MigrationSummary::new()),
            cancel,
            connector: Arc::new(MySqlConnector),
            source_ccdb: OnceCell::new(),
            target_ccdb: OnceCell::new(),
            backup: None,
        }
    }

    /// Replaces how CCDB repositories are opened.
    pub fn with_ccdb_connector(mut self, connector: Arc<dyn CcdbConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Installs the relational-backup backend.
    pub fn with_backup_backend(mut self, backend: Arc<dyn BackupBackend>) -> Self {
        self.backup = Some(backend);
        self
    }

    /// Foundation API used in `direction`.
    pub fn platform(&self, direction: Direction) -> Arc<dyn PlatformClient> {
        match direction {
            Direction::Export => Arc::clone(&self.source),
            Direction::Import => Arc::clone(&self.target),
        }
    }

    /// Relational-backup backend, if installed.
    pub fn backup_backend(&self) -> Option<Arc<dyn BackupBackend>> {
        self.backup.clone()
    }

    /// Validated CCDB settings for the foundation used in `direction`.
    pub fn ccdb_settings(&self, direction: Direction) -> Result<&CcdbSettings> {
        let ccdb = self
            .config
            .migrators
            .ccdb
            .as_ref()
            .ok_or_else(|| MigrateError::Config("no CCDB migrator configured".into()))?;
        let (side, settings) = match direction {
            Direction::Export => ("source", ccdb.source.as_ref()),
            Direction::Import => ("target", ccdb.target.as_ref()),
        };
        let settings = settings
            .ok_or_else(|| MigrateError::Config(format!("missing {} CCDB settings", side)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Shared repository and encryption key for the foundation used in `direction`.
    pub async fn ccdb(&self, direction: Direction) -> Result<(Arc<CcdbRepository>, EncryptionKey)> {
        let settings = self.ccdb_settings(direction)?;
        let cell = match direction {
            Direction::Export => &self.source_ccdb,
            Direction::Import => &self.target_ccdb,
        };
        let repository = cell
            .get_or_try_init(|| async {
                self.connector
                    .connect(settings, &self.cancel)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok((Arc::clone(repository), settings.encryption_key()))
    }
}
