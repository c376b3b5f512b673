//! In-memory object store
//!
//! Backs the pipeline test suites and local development without an S3
//! endpoint. Semantics match the S3 backend where the pipeline depends on
//! them: puts replace, deletes of missing keys succeed, copies require a
//! live source.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ObjectMeta, ObjectStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// Map-backed [`ObjectStore`].
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, for test assertions.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Raw object bytes, for test assertions.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).map(|o| o.data.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> StorageResult<()> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), StoredObject { data, content_type });
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let objects = self.objects.read().await;
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: object.data.len() as i64,
            content_type: object.content_type.clone(),
        })
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> StorageResult<()> {
        let mut objects = self.objects.write().await;
        let source = objects
            .get(source_key)
            .ok_or_else(|| StorageError::NotFound(source_key.to_string()))?
            .clone();
        objects.insert(dest_key.to_string(), source);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
