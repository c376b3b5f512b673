//! In-memory catalog backend
//!
//! Backs the pipeline test suites. Ordering guarantees match the
//! PostgreSQL backend: assets and errors list in insertion order.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Catalog, DbError, DbResult};
use crate::models::{EntityLink, ImportErrorRecord, ImportJob, StagedAsset};

#[derive(Default)]
struct CatalogState {
    jobs: HashMap<Uuid, ImportJob>,
    assets: Vec<StagedAsset>,
    errors: Vec<ImportErrorRecord>,
    links: Vec<(String, String, Uuid)>,
}

/// Map-backed [`Catalog`].
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity links recorded by commit, for test assertions.
    pub async fn entity_links(&self) -> Vec<(String, String, Uuid)> {
        self.state.read().await.links.clone()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn insert_job(&self, job: &ImportJob) -> DbResult<()> {
        self.state.write().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> DbResult<Option<ImportJob>> {
        Ok(self.state.read().await.jobs.get(&job_id).cloned())
    }

    async fn update_job(&self, job: &ImportJob) -> DbResult<()> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            },
            None => Err(DbError::not_found("import job", job.id)),
        }
    }

    async fn insert_asset(&self, asset: &StagedAsset) -> DbResult<()> {
        self.state.write().await.assets.push(asset.clone());
        Ok(())
    }

    async fn get_asset(&self, asset_id: Uuid) -> DbResult<Option<StagedAsset>> {
        Ok(self
            .state
            .read()
            .await
            .assets
            .iter()
            .find(|a| a.id == asset_id)
            .cloned())
    }

    async fn update_asset(&self, asset: &StagedAsset) -> DbResult<()> {
        let mut state = self.state.write().await;
        match state.assets.iter_mut().find(|a| a.id == asset.id) {
            Some(existing) => {
                *existing = asset.clone();
                Ok(())
            },
            None => Err(DbError::not_found("staged asset", asset.id)),
        }
    }

    async fn list_assets(&self, job_id: Uuid) -> DbResult<Vec<StagedAsset>> {
        Ok(self
            .state
            .read()
            .await
            .assets
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn count_assets(&self, job_id: Uuid) -> DbResult<usize> {
        Ok(self
            .state
            .read()
            .await
            .assets
            .iter()
            .filter(|a| a.job_id == job_id)
            .count())
    }

    async fn insert_error(&self, error: &ImportErrorRecord) -> DbResult<()> {
        self.state.write().await.errors.push(error.clone());
        Ok(())
    }

    async fn list_errors(&self, job_id: Uuid) -> DbResult<Vec<ImportErrorRecord>> {
        Ok(self
            .state
            .read()
            .await
            .errors
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn link_entity(&self, asset_id: Uuid, link: &EntityLink) -> DbResult<()> {
        let Some(reference) = link.reference() else {
            return Ok(());
        };
        let entry = (link.kind().to_string(), reference.to_string(), asset_id);
        let mut state = self.state.write().await;
        if !state.links.contains(&entry) {
            state.links.push(entry);
        }
        Ok(())
    }

    async fn delete_job_children(&self, job_id: Uuid) -> DbResult<u64> {
        let mut state = self.state.write().await;

        let asset_ids: Vec<Uuid> = state
            .assets
            .iter()
            .filter(|a| a.job_id == job_id)
            .map(|a| a.id)
            .collect();

        state.links.retain(|(_, _, asset_id)| !asset_ids.contains(asset_id));
        state.errors.retain(|e| e.job_id != job_id);

        let before = state.assets.len();
        state.assets.retain(|a| a.job_id != job_id);
        Ok((before - state.assets.len()) as u64)
    }
}
