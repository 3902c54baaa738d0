//! Migration configuration, loaded from one TOML or JSON file.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tenantshift_ccdb::CcdbSettings;
use tenantshift_core::{DomainMapping, ServiceInstance};
use tenantshift_platform::{PlatformConfig, RetryConfig};

use crate::error::{MigrateError, Result};

fn default_export_dir() -> PathBuf {
    PathBuf::from("export")
}

fn default_parallelism() -> usize {
    8
}

fn default_secret_store_service() -> String {
    "credhub".to_string()
}

fn default_relational_backup_service() -> String {
    "p.mysql".to_string()
}

/// Everything one export or import run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Foundation workloads are exported from
    pub source: PlatformConfig,
    /// Foundation workloads are imported into
    pub target: PlatformConfig,
    /// Root of the export tree (default: `export`)
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    /// Read everything, change nothing
    #[serde(default)]
    pub dry_run: bool,
    /// Migrate managed services without a dedicated migrator by create-or-update
    #[serde(default)]
    pub use_default_migrator: bool,
    /// Concurrent tasks per group (default: 8)
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Organization name patterns to include; empty includes all
    #[serde(default)]
    pub include_orgs: Vec<String>,
    /// Organization name patterns to exclude
    #[serde(default)]
    pub exclude_orgs: Vec<String>,
    /// Instance names to migrate; empty migrates all
    #[serde(default)]
    pub instances: Vec<String>,
    /// Service labels to migrate; empty migrates all
    #[serde(default)]
    pub services: Vec<String>,
    /// Ordered domain rewrites applied on import
    #[serde(default)]
    pub domains: Vec<DomainMapping>,
    /// Retry budget for platform calls
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-migrator settings
    #[serde(default)]
    pub migrators: MigratorSettings,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source: PlatformConfig::default(),
            target: PlatformConfig::default(),
            export_dir: default_export_dir(),
            dry_run: false,
            use_default_migrator: false,
            parallelism: default_parallelism(),
            include_orgs: Vec::new(),
            exclude_orgs: Vec::new(),
            instances: Vec::new(),
            services: Vec::new(),
            domains: Vec::new(),
            retry: RetryConfig::default(),
            migrators: MigratorSettings::default(),
        }
    }
}

/// Typed settings for every migrator kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigratorSettings {
    /// Services migrated by writing the CCDB directly
    #[serde(default)]
    pub ccdb: Option<CcdbMigratorSettings>,
    /// Secret-store service
    #[serde(default)]
    pub secret_store: SecretStoreSettings,
    /// Relational-backup service
    #[serde(default)]
    pub relational_backup: RelationalBackupSettings,
}

/// Settings of the CCDB migrator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CcdbMigratorSettings {
    /// Service labels handled through the CCDB
    #[serde(default)]
    pub services: Vec<String>,
    /// Source foundation database, needed for export
    #[serde(default)]
    pub source: Option<CcdbSettings>,
    /// Target foundation database, needed for import
    #[serde(default)]
    pub target: Option<CcdbSettings>,
}

/// Settings of the secret-store migrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretStoreSettings {
    /// Service label (default: `credhub`)
    #[serde(default = "default_secret_store_service")]
    pub service: String,
}

impl Default for SecretStoreSettings {
    fn default() -> Self {
        Self {
            service: default_secret_store_service(),
        }
    }
}

/// Settings of the relational-backup migrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalBackupSettings {
    /// Service label (default: `p.mysql`)
    #[serde(default = "default_relational_backup_service")]
    pub service: String,
}

impl Default for RelationalBackupSettings {
    fn default() -> Self {
        Self {
            service: default_relational_backup_service(),
        }
    }
}

/// Closed set of migration strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigratorKind {
    /// Direct CCDB export/import
    Ccdb,
    /// Credentials captured through a temporary service key
    SecretStore,
    /// Backup to and restore from object storage
    RelationalBackup,
    /// Generic managed create-or-update
    Managed,
    /// User-provided create-or-update
    UserProvided,
}

impl MigratorKind {
    /// Migrator for an instance, or `None` for a managed service with no dedicated
    /// migrator while the default migrator is disabled.
    pub fn for_instance(config: &MigrationConfig, instance: &ServiceInstance) -> Option<Self> {
        if instance.is_user_provided() {
            return Some(MigratorKind::UserProvided);
        }
        let label = instance.service.as_str();
        let migrators = &config.migrators;
        if migrators
            .ccdb
            .as_ref()
            .is_some_and(|c| c.services.iter().any(|s| s == label))
        {
            Some(MigratorKind::Ccdb)
        } else if migrators.secret_store.service == label {
            Some(MigratorKind::SecretStore)
        } else if migrators.relational_backup.service == label {
            Some(MigratorKind::RelationalBackup)
        } else if config.use_default_migrator {
            Some(MigratorKind::Managed)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MigratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MigratorKind::Ccdb => "ccdb",
            MigratorKind::SecretStore => "secret-store",
            MigratorKind::RelationalBackup => "relational-backup",
            MigratorKind::Managed => "managed",
            MigratorKind::UserProvided => "user-provided",
        };
        f.write_str(name)
    }
}

/// Compiled include/exclude organization patterns.
#[derive(Debug, Clone, Default)]
pub struct OrgFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl OrgFilter {
    /// Compiles both pattern lists.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| Regex::new(p).map_err(MigrateError::from))
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Included when no include pattern is set or one matches, and no exclude pattern matches.
    pub fn matches(&self, org: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(org));
        included && !self.exclude.iter().any(|r| r.is_match(org))
    }
}

impl MigrationConfig {
    /// Loads `path`, choosing the format by extension (`.toml` or `.json`).
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: MigrationConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                return Err(MigrateError::Config(format!(
                    "unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks what can be checked before contacting anything.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(MigrateError::Config("parallelism must be at least 1".into()));
        }
        for (side, endpoint) in [("source", &self.source), ("target", &self.target)] {
            if endpoint.api_url.trim().is_empty() {
                return Err(MigrateError::Config(format!("{}.api_url is required", side)));
            }
        }
        self.org_filter()?;
        Ok(())
    }

    /// Compiled organization filter.
    pub fn org_filter(&self) -> Result<OrgFilter> {
        OrgFilter::new(&self.include_orgs, &self.exclude_orgs)
    }

    /// Whether an instance name passes the allow-list.
    pub fn selects_instance(&self, name: &str) -> bool {
        self.instances.is_empty() || self.instances.iter().any(|n| n == name)
    }

    /// Whether a service label passes the allow-list.
    pub fn selects_service(&self, label: &str) -> bool {
        self.services.is_empty() || self.services.iter().any(|s| s == label)
    }
}
