//! SQL backend seam. The repository speaks to `Database`; production uses MySQL via sqlx.

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{MySql, MySqlPool, Row};

use crate::error::Result;

/// A positional statement parameter or a result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Integer column or parameter
    Int(i64),
    /// Text column or parameter
    Text(String),
    /// Boolean column or parameter
    Bool(bool),
}

impl SqlValue {
    /// Integer value, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if this is a `Text`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        v.map(SqlValue::Text).unwrap_or(SqlValue::Null)
    }
}

/// One result row, columns in select order.
pub type SqlRow = Vec<SqlValue>;

/// A database that can run parameterized statements and open transactions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Runs a query outside any transaction.
    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// Runs a statement outside any transaction, returning rows affected.
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64>;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn DbTransaction>>;
}

/// An open transaction. Dropping it without commit rolls back.
#[async_trait]
pub trait DbTransaction: Send {
    /// Runs a query inside the transaction.
    async fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// Runs a statement inside the transaction, returning rows affected.
    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rolls the transaction back.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// MySQL-backed [`Database`].
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    /// Connects a pool with the given options.
    pub async fn connect(options: MySqlConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn bind_all<'q>(sql: &'q str, args: &'q [SqlValue]) -> Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query(sql);
    for arg in args {
        query = match arg {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Bool(b) => query.bind(*b),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> SqlRow {
    (0..row.len())
        .map(|i| {
            if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                return v.map(SqlValue::Int).unwrap_or(SqlValue::Null);
            }
            if let Ok(v) = row.try_get::<Option<String>, _>(i) {
                return v.map(SqlValue::Text).unwrap_or(SqlValue::Null);
            }
            if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
                return v.map(SqlValue::Bool).unwrap_or(SqlValue::Null);
            }
            SqlValue::Null
        })
        .collect()
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let rows = bind_all(sql, args).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let done = bind_all(sql, args).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn DbTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTransaction { tx }))
    }
}

struct MySqlTransaction {
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl DbTransaction for MySqlTransaction {
    async fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let rows = bind_all(sql, args).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64> {
        let done = bind_all(sql, args).execute(&mut *self.tx).await?;
        Ok(done.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MySqlTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let MySqlTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(SqlValue::from("a"), SqlValue::Text("a".into()));
        assert_eq!(SqlValue::from(7i64).as_i64(), Some(7));
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x".to_string())).as_str(), Some("x"));
        assert_eq!(SqlValue::from(true).as_i64(), None);
    }
}
