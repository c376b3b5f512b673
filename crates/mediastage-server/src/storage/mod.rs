//! Object storage boundary
//!
//! The pipeline addresses durable blobs by key through the [`ObjectStore`]
//! trait: staged uploads live under the staging prefix and are copied to
//! the public prefix on commit. [`S3ObjectStore`] is the production
//! backend; [`MemoryObjectStore`] backs tests and local development.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod config;
pub mod memory;
pub mod s3;

pub use config::StorageConfig;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Object storage failures at the pipeline boundary.
///
/// Per-file storage failures during upload and commit are recorded as
/// recoverable import errors by the callers; they never abort a batch.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata of a stored object, as reported by the backend.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub key: String,
    pub size: i64,
    pub content_type: Option<String>,
}

/// Path-addressed blob store with a staging and a public area.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any previous content at the key.
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> StorageResult<()>;

    /// Fetch backend metadata for an object.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Copy an object within the store.
    async fn copy(&self, source_key: &str, dest_key: &str) -> StorageResult<()>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List keys under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Key layout for staged and published objects.
///
/// Prefixes are configuration, not business logic; the default layout is
/// `staging/{job}/{asset}/{filename}` and `public/{job}/{asset}/{filename}`.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    pub staging_prefix: String,
    pub public_prefix: String,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self {
            staging_prefix: "staging".to_string(),
            public_prefix: "public".to_string(),
        }
    }
}

impl KeyScheme {
    pub fn new(staging_prefix: impl Into<String>, public_prefix: impl Into<String>) -> Self {
        Self {
            staging_prefix: staging_prefix.into(),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn staging_key(&self, job_id: Uuid, asset_id: Uuid, filename: &str) -> String {
        format!("{}/{}/{}/{}", self.staging_prefix, job_id, asset_id, filename)
    }

    pub fn public_key(&self, job_id: Uuid, asset_id: Uuid, filename: &str) -> String {
        format!("{}/{}/{}/{}", self.public_prefix, job_id, asset_id, filename)
    }

    pub fn staging_job_prefix(&self, job_id: Uuid) -> String {
        format!("{}/{}/", self.staging_prefix, job_id)
    }

    pub fn public_job_prefix(&self, job_id: Uuid) -> String {
        format!("{}/{}/", self.public_prefix, job_id)
    }
}
