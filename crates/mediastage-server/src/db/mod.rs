//! Catalog store boundary
//!
//! Durable structured records for jobs, staged assets, and import errors
//! live behind the [`Catalog`] trait. [`PgCatalog`] is the production
//! backend over PostgreSQL; [`MemoryCatalog`] backs the pipeline test
//! suites. The pipeline never issues SQL directly.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{EntityLink, ImportErrorRecord, ImportJob, StagedAsset};

pub mod memory;
pub mod postgres;

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

/// Catalog operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}")]
    Config(String),

    /// Requested record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Persisted data failed to decode into the domain model
    #[error("Corrupt catalog record: {0}")]
    Corrupt(String),
}

impl DbError {
    /// Create a not found error with resource context
    pub fn not_found(resource_type: &str, identifier: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} '{}' not found", resource_type, identifier))
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Durable relational storage for the pipeline's three record types.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn insert_job(&self, job: &ImportJob) -> DbResult<()>;
    async fn get_job(&self, job_id: Uuid) -> DbResult<Option<ImportJob>>;
    async fn update_job(&self, job: &ImportJob) -> DbResult<()>;

    async fn insert_asset(&self, asset: &StagedAsset) -> DbResult<()>;
    async fn get_asset(&self, asset_id: Uuid) -> DbResult<Option<StagedAsset>>;
    async fn update_asset(&self, asset: &StagedAsset) -> DbResult<()>;
    async fn list_assets(&self, job_id: Uuid) -> DbResult<Vec<StagedAsset>>;
    async fn count_assets(&self, job_id: Uuid) -> DbResult<usize>;

    async fn insert_error(&self, error: &ImportErrorRecord) -> DbResult<()>;
    async fn list_errors(&self, job_id: Uuid) -> DbResult<Vec<ImportErrorRecord>>;

    /// Attach a published asset to the catalog entity it links to.
    async fn link_entity(&self, asset_id: Uuid, link: &EntityLink) -> DbResult<()>;

    /// Delete every asset and error row scoped to a job. Returns the number
    /// of deleted assets. Only rollback calls this.
    async fn delete_job_children(&self, job_id: Uuid) -> DbResult<u64>;
}

/// Connection pool configuration for the PostgreSQL backend.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl From<&crate::config::DatabaseConfig> for DbConfig {
    fn from(config: &crate::config::DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: Some(config.idle_timeout_secs),
        }
    }
}

pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[test]
    fn test_pool_config_mirrors_server_database_config() {
        let database = DatabaseConfig {
            url: "postgresql://localhost:5432/mediastage".to_string(),
            max_connections: 7,
            min_connections: 3,
            connect_timeout_secs: 5,
            idle_timeout_secs: 300,
        };

        let config = DbConfig::from(&database);
        assert_eq!(config.url, database.url);
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.min_connections, 3);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.idle_timeout_secs, Some(300));
    }
}
