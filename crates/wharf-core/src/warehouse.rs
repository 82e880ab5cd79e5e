//! Warehouse SQL executor interface and Redshift implementation.
//!
//! The warehouse speaks the PostgreSQL wire protocol, so the production
//! implementation rides on a sqlx `PgPool`. The pipeline needs only two
//! operations: submit a statement, and probe whether a destination table
//! exists before any export work begins.

use std::env;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::error::WarehouseError;

/// Warehouse operations the transfer pipeline consumes.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Submit and commit one SQL statement, returning the affected row
    /// count.
    async fn execute(&self, statement: &str) -> Result<u64, WarehouseError>;

    /// Lightweight existence probe for a (possibly schema-qualified) table.
    async fn table_exists(&self, table: &str) -> Result<bool, WarehouseError>;
}

/// Connection settings for the warehouse cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl WarehouseConfig {
    /// Load settings from the standard `PG*` environment variables. The
    /// port defaults to the cluster's conventional 5439.
    pub fn from_env() -> Self {
        Self {
            host: env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("PGPORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5439),
            database: env::var("PGDATABASE").unwrap_or_else(|_| "dev".to_string()),
            user: env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("PGPASSWORD").unwrap_or_default(),
            max_connections: 2,
        }
    }

    fn connection_url(&self) -> String {
        format!(
            "postgres://{user}:{password}@{host}:{port}/{database}",
            user = self.user,
            password = self.password,
            host = self.host,
            port = self.port,
            database = self.database,
        )
    }
}

/// sqlx-backed implementation of [`Warehouse`].
#[derive(Clone)]
pub struct RedshiftWarehouse {
    pool: PgPool,
}

impl RedshiftWarehouse {
    /// Connect to the cluster described by `config`.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_url())
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Warehouse for RedshiftWarehouse {
    #[instrument(skip(self, statement))]
    async fn execute(&self, statement: &str) -> Result<u64, WarehouseError> {
        debug!("Executing warehouse statement");
        let result = sqlx::query(statement).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn table_exists(&self, table: &str) -> Result<bool, WarehouseError> {
        let (schema, name) = split_qualified_name(table);
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.tables
                 WHERE table_name = $1
                   AND ($2::text IS NULL OR table_schema = $2)
             )",
        )
        .bind(name)
        .bind(schema)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

/// Split a possibly schema-qualified relation name, stripping delimited
/// identifier quotes.
fn split_qualified_name(table: &str) -> (Option<String>, String) {
    match table.split_once('.') {
        Some((schema, name)) => (
            Some(schema.trim_matches('"').to_string()),
            name.trim_matches('"').to_string(),
        ),
        None => (None, table.trim_matches('"').to_string()),
    }
}
