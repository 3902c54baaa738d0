//! In-memory scripted [`Database`] for tests. Records every statement, begin,
//! commit and rollback so tests can assert on exactly what reached the database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::{Database, DbTransaction, SqlRow, SqlValue};
use crate::error::{Result, StoreError};

/// A statement as it reached the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    /// SQL text
    pub sql: String,
    /// Bound parameters
    pub args: Vec<SqlValue>,
    /// Whether it ran inside a transaction
    pub in_transaction: bool,
}

#[derive(Debug, Default)]
struct State {
    ids: HashMap<(String, String), i64>,
    salts: HashMap<String, String>,
    shares: HashSet<(String, String)>,
    credentials: HashMap<String, (Option<String>, String)>,
    affected: HashMap<String, u64>,
    fail_on: Option<String>,
    fail_rollback: bool,
    statements: Vec<RecordedStatement>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
}

/// Scripted in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    /// Creates an empty database: every id lookup misses, no salts, no shares.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `SELECT id FROM <table> WHERE guid=?` return `id` for `guid`.
    pub fn with_id(self, table: &str, guid: &str, id: i64) -> Self {
        self.state
            .lock()
            .ids
            .insert((table.to_string(), guid.to_string()), id);
        self
    }

    /// Makes the salt lookup for `table` return `salt`.
    pub fn with_salt(self, table: &str, salt: &str) -> Self {
        self.state
            .lock()
            .salts
            .insert(table.to_string(), salt.to_string());
        self
    }

    /// Marks an instance as shared into a space.
    pub fn with_share(self, instance_guid: &str, target_space_guid: &str) -> Self {
        self.state
            .lock()
            .shares
            .insert((instance_guid.to_string(), target_space_guid.to_string()));
        self
    }

    /// Stores an encrypted credentials column for an instance.
    pub fn with_instance_credentials(self, guid: &str, ciphertext: Option<&str>, salt: &str) -> Self {
        self.state.lock().credentials.insert(
            guid.to_string(),
            (ciphertext.map(str::to_string), salt.to_string()),
        );
        self
    }

    /// Rows affected reported for statements starting with `sql_prefix` (default 1).
    pub fn with_rows_affected(self, sql_prefix: &str, rows: u64) -> Self {
        self.state
            .lock()
            .affected
            .insert(sql_prefix.to_string(), rows);
        self
    }

    /// Fails any executed statement containing `needle`.
    pub fn failing_on(self, needle: &str) -> Self {
        self.state.lock().fail_on = Some(needle.to_string());
        self
    }

    /// Makes every rollback fail.
    pub fn failing_rollback(self) -> Self {
        self.state.lock().fail_rollback = true;
        self
    }

    /// All statements in execution order.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.state.lock().statements.clone()
    }

    /// Executed statements starting with `prefix`.
    pub fn statements_starting_with(&self, prefix: &str) -> Vec<RecordedStatement> {
        self.statements()
            .into_iter()
            .filter(|s| s.sql.starts_with(prefix))
            .collect()
    }

    /// Number of transactions opened.
    pub fn begins(&self) -> usize {
        self.state.lock().begins
    }

    /// Number of commits.
    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    /// Number of rollbacks.
    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    fn run_query(&self, sql: &str, args: &[SqlValue], in_transaction: bool) -> Result<Vec<SqlRow>> {
        let mut state = self.state.lock();
        state.statements.push(RecordedStatement {
            sql: sql.to_string(),
            args: args.to_vec(),
            in_transaction,
        });

        let text = |i: usize| args.get(i).and_then(SqlValue::as_str).unwrap_or_default().to_string();

        if let Some(rest) = sql.strip_prefix("SELECT id FROM ") {
            let table = rest.split_whitespace().next().unwrap_or_default().to_string();
            return Ok(state
                .ids
                .get(&(table, text(0)))
                .map(|id| vec![vec![SqlValue::Int(*id)]])
                .unwrap_or_default());
        }
        if let Some(rest) = sql.strip_prefix("SELECT salt FROM ") {
            let table = rest.split_whitespace().next().unwrap_or_default();
            return Ok(state
                .salts
                .get(table)
                .map(|salt| vec![vec![SqlValue::Text(salt.clone())]])
                .unwrap_or_default());
        }
        if sql.contains("FROM service_instance_shares") {
            let key = (text(0), text(1));
            return Ok(if state.shares.contains(&key) {
                vec![vec![SqlValue::Text(key.0), SqlValue::Text(key.1)]]
            } else {
                Vec::new()
            });
        }
        if sql.starts_with("SELECT credentials, salt FROM service_instances") {
            return Ok(state
                .credentials
                .get(&text(0))
                .map(|(c, s)| vec![vec![c.clone().into(), SqlValue::Text(s.clone())]])
                .unwrap_or_default());
        }
        Err(StoreError::Backend(format!("unscripted query: {}", sql)))
    }

    fn run_execute(&self, sql: &str, args: &[SqlValue], in_transaction: bool) -> Result<u64> {
        let mut state = self.state.lock();
        if let Some(needle) = &state.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(StoreError::Backend(format!("injected failure on {}", needle)));
            }
        }
        state.statements.push(RecordedStatement {
            sql: sql.to_string(),
            args: args.to_vec(),
            in_transaction,
        });
        Ok(state
            .affected
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| *rows)
            .unwrap_or(1))
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.run_query(sql, args, false)
    }

    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        self.run_execute(sql, args, false)
    }

    async fn begin(&self) -> Result<Box<dyn DbTransaction>> {
        self.state.lock().begins += 1;
        Ok(Box::new(MemoryTransaction { db: self.clone() }))
    }
}

struct MemoryTransaction {
    db: MemoryDatabase,
}

#[async_trait]
impl DbTransaction for MemoryTransaction {
    async fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.db.run_query(sql, args, true)
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        self.db.run_execute(sql, args, true)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.db.state.lock().commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut state = self.db.state.lock();
        state.rollbacks += 1;
        if state.fail_rollback {
            return Err(StoreError::Backend("rollback failed".into()));
        }
        Ok(())
    }
}
