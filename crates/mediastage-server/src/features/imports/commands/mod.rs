//! Import pipeline commands

pub mod commit;
pub mod rollback;
pub mod start;
pub mod update_asset;
pub mod upload;
pub mod validate;

use uuid::Uuid;

use crate::db::{Catalog, DbError, DbResult};
use crate::models::{ImportJob, JobStatus};

/// Fetch a job for a mutating command. A rolled-back job no longer exists
/// as far as the pipeline is concerned.
pub(crate) async fn load_job(catalog: &dyn Catalog, job_id: Uuid) -> DbResult<ImportJob> {
    match catalog.get_job(job_id).await? {
        Some(job) if job.status != JobStatus::RolledBack => Ok(job),
        _ => Err(DbError::not_found("import job", job_id)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::config::IngestPolicy;
    use crate::db::{Catalog, MemoryCatalog};
    use crate::features::imports::types::{Caller, Role};
    use crate::features::ImportState;
    use crate::storage::{KeyScheme, MemoryObjectStore, ObjectStore};

    pub fn test_state() -> (ImportState, Arc<MemoryCatalog>, Arc<MemoryObjectStore>) {
        test_state_with_policy(IngestPolicy::default())
    }

    pub fn test_state_with_policy(
        policy: IngestPolicy,
    ) -> (ImportState, Arc<MemoryCatalog>, Arc<MemoryObjectStore>) {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryObjectStore::new());
        let state = ImportState::new(
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            KeyScheme::default(),
            policy,
        );
        (state, catalog, store)
    }

    pub fn editor() -> Caller {
        Caller::new(uuid::Uuid::new_v4(), vec![Role::Editor])
    }

    pub fn admin() -> Caller {
        Caller::new(uuid::Uuid::new_v4(), vec![Role::Admin, Role::Editor])
    }
}
