//! Rollback job command
//!
//! The irreversible full-batch undo: deletes every staged and published
//! object under the job's prefixes and every asset and error record, then
//! marks the job terminally rolled back. Requires the admin role, checked
//! before anything else. A second rollback fails with NotFound because
//! nothing remains to delete; retrying is safe because the end state is
//! identical.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbError;
use crate::error::AppError;
use crate::features::imports::commands::load_job;
use crate::features::imports::coordinator::{CoordinatorError, JobCoordinator, ROLLBACK_STATES};
use crate::features::imports::types::{Caller, Role};
use crate::features::ImportState;
use crate::models::JobStatus;
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy)]
pub struct RollbackJobCommand {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RollbackOutcome {
    /// Asset records removed from the catalog.
    pub deleted_assets: u64,
    /// Objects removed from the staging and public areas.
    pub deleted_objects: usize,
}

#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("rollback requires the admin role")]
    Permission,

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<RollbackError> for AppError {
    fn from(err: RollbackError) -> Self {
        match err {
            RollbackError::Permission => AppError::Permission(err.to_string()),
            RollbackError::Coordinator(e) => e.into(),
            RollbackError::Db(e) => e.into(),
            RollbackError::Storage(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(state), fields(job_id = %command.job_id, caller = %caller.id))]
pub async fn handle(
    state: &ImportState,
    command: RollbackJobCommand,
    caller: &Caller,
) -> Result<RollbackOutcome, RollbackError> {
    if !caller.has_role(Role::Admin) {
        return Err(RollbackError::Permission);
    }

    let _guard = state.coordinator.begin_mutation(command.job_id)?;

    let mut job = load_job(state.catalog.as_ref(), command.job_id).await?;
    JobCoordinator::require_state("rollback", &job, ROLLBACK_STATES)?;

    let mut deleted_objects = 0usize;
    for prefix in [
        state.keys.staging_job_prefix(job.id),
        state.keys.public_job_prefix(job.id),
    ] {
        for key in state.store.list(&prefix).await? {
            match state.store.delete(&key).await {
                Ok(()) => deleted_objects += 1,
                // Leave orphans for out-of-band cleanup rather than abort
                // halfway through a destructive pass.
                Err(e) => warn!(%key, error = %e, "failed to delete object during rollback"),
            }
        }
    }

    let deleted_assets = state.catalog.delete_job_children(job.id).await?;

    job.status = JobStatus::RolledBack;
    job.rolled_back_at = Some(Utc::now());
    job.rolled_back_by = Some(caller.id);
    state.catalog.update_job(&job).await?;

    state.coordinator.forget(job.id);

    info!(job_id = %job.id, deleted_assets, deleted_objects, "job rolled back");
    Ok(RollbackOutcome { deleted_assets, deleted_objects })
}
