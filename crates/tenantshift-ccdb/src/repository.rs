//! Encrypted, transactional access to the cloud controller database.
//!
//! All callers sharing one database connection must share one repository: the
//! salt length is discovered once and cached for the repository's lifetime.

use std::sync::Arc;

use serde::Serialize;
use tenantshift_core::{CredentialMap, ServiceBinding, ServiceInstance};
use tenantshift_tunnel::Tunnel;
use tokio::sync::OnceCell;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::cipher::{decrypt, encrypt, generate_salt, EncryptionKey};
use crate::db::{Database, DbTransaction, MySqlDatabase, SqlValue};
use crate::error::{Result, StoreError};
use crate::settings::CcdbSettings;

/// Tables whose numeric ids are resolved by GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// `spaces`
    Spaces,
    /// `service_plans`
    ServicePlans,
    /// `service_instances`
    ServiceInstances,
}

impl Table {
    /// SQL table name.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Spaces => "spaces",
            Table::ServicePlans => "service_plans",
            Table::ServiceInstances => "service_instances",
        }
    }

    fn id_query(&self) -> &'static str {
        match self {
            Table::Spaces => "SELECT id FROM spaces WHERE guid=?",
            Table::ServicePlans => "SELECT id FROM service_plans WHERE guid=?",
            Table::ServiceInstances => "SELECT id FROM service_instances WHERE guid=?",
        }
    }
}

/// Queried in order to learn the foundation's salt length.
pub const SALT_QUERIES: [(&str, &str); 2] = [
    (
        "service_instances",
        "SELECT salt FROM service_instances WHERE salt IS NOT NULL AND salt <> '' LIMIT 1",
    ),
    (
        "service_bindings",
        "SELECT salt FROM service_bindings WHERE salt IS NOT NULL AND salt <> '' LIMIT 1",
    ),
];

pub(crate) const INSERT_SERVICE_INSTANCE: &str = "INSERT INTO service_instances \
    (guid, name, credentials, gateway_name, gateway_data, space_id, service_plan_id, salt, \
    dashboard_url, is_gateway_service, syslog_drain_url, tags, route_service_url) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub(crate) const INSERT_USAGE_EVENT: &str = "INSERT INTO service_usage_events \
    (guid, state, org_guid, space_guid, space_name, service_instance_guid, service_instance_name, \
    service_instance_type, service_plan_guid, service_plan_name, service_guid, service_label) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub(crate) const INSERT_SERVICE_BINDING: &str = "INSERT INTO service_bindings \
    (guid, app_guid, service_instance_guid, credentials, salt, volume_mounts, volume_mounts_salt, type, name) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub(crate) const SELECT_SHARE: &str = "SELECT service_instance_guid, target_space_guid \
    FROM service_instance_shares WHERE service_instance_guid=? AND target_space_guid=?";

pub(crate) const SELECT_INSTANCE_CREDENTIALS: &str =
    "SELECT credentials, salt FROM service_instances WHERE guid=?";

pub(crate) const DELETE_BINDINGS: &str = "DELETE FROM service_bindings WHERE service_instance_guid=?";
pub(crate) const DELETE_KEYS: &str = "DELETE FROM service_keys WHERE service_instance_id=?";
pub(crate) const DELETE_OPERATIONS: &str =
    "DELETE FROM service_instance_operations WHERE service_instance_id=?";
pub(crate) const DELETE_INSTANCE: &str = "DELETE FROM service_instances WHERE guid=? AND space_id=?";

const USAGE_STATE_CREATED: &str = "CREATED";
const MANAGED_INSTANCE_TYPE: &str = "managed_service_instance";
const APP_BINDING_TYPE: &str = "app";

/// Space the instance is created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpace {
    /// Space GUID
    pub guid: String,
    /// Space name
    pub name: String,
    /// Owning organization GUID
    pub org_guid: String,
}

/// Plan the instance is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlan {
    /// Plan GUID
    pub guid: String,
    /// Plan name
    pub name: String,
}

/// Service offering the plan belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetService {
    /// Offering GUID
    pub guid: String,
    /// Offering label
    pub label: String,
}

/// A binding written together with its instance, and the target app it binds.
#[derive(Debug, Clone, Copy)]
pub struct BindingTarget<'a> {
    /// Binding to insert
    pub binding: &'a ServiceBinding,
    /// GUID of the app on the target foundation
    pub app_guid: &'a str,
}

/// Repository over one cloud controller database.
pub struct CcdbRepository {
    db: Arc<dyn Database>,
    salt_len: OnceCell<usize>,
    _tunnel: Option<DropGuard>,
}

impl std::fmt::Debug for CcdbRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CcdbRepository")
            .field("salt_len", &self.salt_len.get())
            .field("tunneled", &self._tunnel.is_some())
            .finish()
    }
}

impl CcdbRepository {
    /// Wraps an existing database handle.
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            salt_len: OnceCell::new(),
            _tunnel: None,
        }
    }

    /// Validates settings and connects, through an SSH tunnel when one is configured.
    /// The tunnel stops when the repository is dropped or `cancel` fires.
    pub async fn connect(settings: &CcdbSettings, cancel: &CancellationToken) -> Result<Self> {
        settings.validate()?;

        let mut guard = None;
        let (host, port) = match settings.tunnel_config() {
            Some(tunnel_config) => {
                let tunnel = Tunnel::bind(tunnel_config).await?;
                let tunnel_cancel = cancel.child_token();
                let (addr, _handle) = tunnel.spawn(tunnel_cancel.clone());
                guard = Some(tunnel_cancel.drop_guard());
                (addr.ip().to_string(), addr.port())
            }
            None => (settings.host.clone(), settings.port),
        };

        let options = sqlx::mysql::MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database);
        let db = MySqlDatabase::connect(options, 4).await?;
        info!(host = %settings.host, database = %settings.database, tunneled = guard.is_some(), "connected to CCDB");

        Ok(Self {
            db: Arc::new(db),
            salt_len: OnceCell::new(),
            _tunnel: guard,
        })
    }

    /// Salt length used by this foundation, discovered on first use and cached.
    pub async fn salt_len(&self) -> Result<usize> {
        self.salt_len
            .get_or_try_init(|| self.discover_salt_len())
            .await
            .copied()
    }

    async fn discover_salt_len(&self) -> Result<usize> {
        for (table, sql) in SALT_QUERIES {
            let rows = self.db.query(sql, &[]).await?;
            if let Some(salt) = rows.first().and_then(|r| r.first()).and_then(SqlValue::as_str) {
                debug!(table = table, len = salt.len(), "discovered salt length");
                return Ok(salt.len());
            }
        }
        Err(StoreError::SaltDiscovery {
            tables: SALT_QUERIES
                .iter()
                .map(|(t, _)| *t)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    async fn new_salt(&self) -> Result<String> {
        Ok(generate_salt(self.salt_len().await?))
    }

    async fn lookup_id(&self, table: Table, guid: &str) -> Result<i64> {
        let rows = self.db.query(table.id_query(), &[guid.into()]).await?;
        first_id(rows, table, guid)
    }

    /// Returns true if a service instance row with this GUID exists.
    pub async fn service_instance_exists(&self, guid: &str) -> Result<bool> {
        let rows = self
            .db
            .query(Table::ServiceInstances.id_query(), &[guid.into()])
            .await?;
        Ok(!rows.is_empty())
    }

    /// Decrypted credentials of an existing instance row, if the row exists.
    pub async fn service_instance_credentials(
        &self,
        guid: &str,
        key: &EncryptionKey,
    ) -> Result<Option<CredentialMap>> {
        let rows = self.db.query(SELECT_INSTANCE_CREDENTIALS, &[guid.into()]).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        match (row.first(), row.get(1)) {
            (Some(SqlValue::Text(ciphertext)), Some(SqlValue::Text(salt))) => {
                let plaintext = decrypt(ciphertext, salt, key)?;
                Ok(Some(serde_json::from_str(&plaintext)?))
            }
            (Some(SqlValue::Null), _) | (None, _) => Ok(Some(CredentialMap::new())),
            _ => Err(StoreError::RowShape {
                query: SELECT_INSTANCE_CREDENTIALS,
            }),
        }
    }

    /// Inserts the instance row and its usage event in one transaction.
    ///
    /// Space and plan ids are resolved first; if either is missing nothing is written.
    pub async fn create_service_instance(
        &self,
        instance: &ServiceInstance,
        space: &TargetSpace,
        plan: &TargetPlan,
        service: &TargetService,
        key: &EncryptionKey,
    ) -> Result<()> {
        self.create_service_instance_with_bindings(instance, space, plan, service, &[], key)
            .await
    }

    /// Like [`create_service_instance`](Self::create_service_instance), but the
    /// binding rows go into the same transaction: either the instance lands with
    /// every binding or nothing is written.
    pub async fn create_service_instance_with_bindings(
        &self,
        instance: &ServiceInstance,
        space: &TargetSpace,
        plan: &TargetPlan,
        service: &TargetService,
        bindings: &[BindingTarget<'_>],
        key: &EncryptionKey,
    ) -> Result<()> {
        let space_id = self.lookup_id(Table::Spaces, &space.guid).await?;
        let plan_id = self.lookup_id(Table::ServicePlans, &plan.guid).await?;

        let salt = self.new_salt().await?;
        let credentials = seal(&instance.credentials, &salt, key)?;
        let tags = seal(&instance.tags, &salt, key)?;

        let instance_args = vec![
            instance.guid.as_str().into(),
            instance.name.as_str().into(),
            credentials.into(),
            SqlValue::Null,
            SqlValue::Null,
            space_id.into(),
            plan_id.into(),
            salt.into(),
            instance.dashboard_url.clone().into(),
            true.into(),
            instance.syslog_drain_url.clone().into(),
            tags.into(),
            instance.route_service_url.clone().into(),
        ];
        let event_args = vec![
            uuid::Uuid::new_v4().to_string().into(),
            USAGE_STATE_CREATED.into(),
            space.org_guid.as_str().into(),
            space.guid.as_str().into(),
            space.name.as_str().into(),
            instance.guid.as_str().into(),
            instance.name.as_str().into(),
            MANAGED_INSTANCE_TYPE.into(),
            plan.guid.as_str().into(),
            plan.name.as_str().into(),
            service.guid.as_str().into(),
            service.label.as_str().into(),
        ];
        let mut binding_rows = Vec::with_capacity(bindings.len());
        for target in bindings {
            let salt = self.new_salt().await?;
            binding_rows.push(binding_args(target.binding, target.app_guid, salt, key)?);
        }

        let mut tx = self.db.begin().await?;
        let result = async {
            tx.execute(INSERT_SERVICE_INSTANCE, &instance_args).await?;
            tx.execute(INSERT_USAGE_EVENT, &event_args).await?;
            for args in &binding_rows {
                tx.execute(INSERT_SERVICE_BINDING, args).await?;
            }
            Ok::<(), StoreError>(())
        }
        .await;
        finish(tx, result).await?;

        info!(
            instance = %instance.name,
            guid = %instance.guid,
            space = %space.name,
            bindings = bindings.len(),
            "created service instance in CCDB"
        );
        Ok(())
    }

    /// Deletes an instance and its dependents in one transaction.
    ///
    /// Instances shared into `space_guid` are refused with
    /// [`StoreError::UnsupportedOperation`]; nothing is deleted.
    /// Missing dependent rows are logged, not fatal.
    pub async fn delete_service_instance(&self, space_guid: &str, instance_guid: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        let result = delete_in_tx(tx.as_mut(), space_guid, instance_guid).await;
        finish(tx, result).await
    }

    /// Inserts a binding row. Credentials default to `{}`; credentials and volume
    /// mounts share one salt.
    pub async fn create_service_binding(
        &self,
        binding: &ServiceBinding,
        app_guid: &str,
        key: &EncryptionKey,
    ) -> Result<()> {
        let args = binding_args(binding, app_guid, self.new_salt().await?, key)?;
        self.db.execute(INSERT_SERVICE_BINDING, &args).await?;
        debug!(binding = %binding.guid, app = app_guid, "created service binding in CCDB");
        Ok(())
    }
}

async fn delete_in_tx(
    tx: &mut dyn DbTransaction,
    space_guid: &str,
    instance_guid: &str,
) -> Result<bool> {
    let shares = tx
        .query(SELECT_SHARE, &[instance_guid.into(), space_guid.into()])
        .await?;
    if !shares.is_empty() {
        return Err(StoreError::UnsupportedOperation(format!(
            "service instance {} is shared into space {}",
            instance_guid, space_guid
        )));
    }

    let space_rows = tx.query(Table::Spaces.id_query(), &[space_guid.into()]).await?;
    let space_id = first_id(space_rows, Table::Spaces, space_guid)?;
    let instance_rows = tx
        .query(Table::ServiceInstances.id_query(), &[instance_guid.into()])
        .await?;
    let instance_id = first_id(instance_rows, Table::ServiceInstances, instance_guid)?;

    let steps: [(&str, &str, Vec<SqlValue>); 4] = [
        ("service bindings", DELETE_BINDINGS, vec![instance_guid.into()]),
        ("service keys", DELETE_KEYS, vec![instance_id.into()]),
        ("service instance operations", DELETE_OPERATIONS, vec![instance_id.into()]),
        ("service instance", DELETE_INSTANCE, vec![instance_guid.into(), space_id.into()]),
    ];
    for (what, sql, args) in steps.iter() {
        let affected = tx.execute(sql, args).await?;
        if affected == 0 {
            warn!(instance = instance_guid, "no {} deleted", what);
        } else {
            debug!(instance = instance_guid, rows = affected, "deleted {}", what);
        }
    }
    Ok(true)
}

/// Commits on success; on failure rolls back and keeps both causes if the rollback fails.
async fn finish<T>(tx: Box<dyn DbTransaction>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(cause) => match tx.rollback().await {
            Ok(()) => Err(cause),
            Err(rollback) => Err(StoreError::Rollback {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            }),
        },
    }
}

fn first_id(rows: Vec<Vec<SqlValue>>, table: Table, guid: &str) -> Result<i64> {
    let not_found = || StoreError::RowNotFound {
        table: table.name(),
        guid: guid.to_string(),
    };
    let row = rows.into_iter().next().ok_or_else(not_found)?;
    row.first().and_then(SqlValue::as_i64).ok_or(StoreError::RowShape {
        query: table.id_query(),
    })
}

/// Row for [`INSERT_SERVICE_BINDING`]. Credentials default to `{}`; credentials
/// and volume mounts share `salt`.
fn binding_args(
    binding: &ServiceBinding,
    app_guid: &str,
    salt: String,
    key: &EncryptionKey,
) -> Result<Vec<SqlValue>> {
    let credentials = seal(&binding.credentials, &salt, key)?;
    let (volume_mounts, volume_mounts_salt) = match &binding.volume_mounts {
        Some(mounts) => (
            SqlValue::Text(seal(mounts, &salt, key)?),
            SqlValue::Text(salt.clone()),
        ),
        None => (SqlValue::Null, SqlValue::Null),
    };
    Ok(vec![
        binding.guid.as_str().into(),
        app_guid.into(),
        binding.service_instance_guid.as_str().into(),
        credentials.into(),
        salt.into(),
        volume_mounts,
        volume_mounts_salt,
        APP_BINDING_TYPE.into(),
        binding.name.clone().into(),
    ])
}

fn seal<T: Serialize + ?Sized>(value: &T, salt: &str, key: &EncryptionKey) -> Result<String> {
    encrypt(&serde_json::to_string(value)?, salt, key)
}
