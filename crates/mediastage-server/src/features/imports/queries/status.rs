//! Job status query
//!
//! Read-only view of a job with its asset and error collections. Safe from
//! any state, including terminal ones; a rolled-back job no longer exists
//! and reports NotFound.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DbError;
use crate::error::AppError;
use crate::features::ImportState;
use crate::models::{ImportErrorRecord, ImportJob, JobStatus, StagedAsset};

#[derive(Debug, Clone, Copy)]
pub struct JobStatusQuery {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct JobStatusView {
    pub job: ImportJob,
    pub assets: Vec<StagedAsset>,
    pub errors: Vec<ImportErrorRecord>,
}

#[derive(Error, Debug)]
pub enum JobStatusError {
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<JobStatusError> for AppError {
    fn from(err: JobStatusError) -> Self {
        match err {
            JobStatusError::Db(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(state), fields(job_id = %query.job_id))]
pub async fn handle(
    state: &ImportState,
    query: JobStatusQuery,
) -> Result<JobStatusView, JobStatusError> {
    let job = match state.catalog.get_job(query.job_id).await? {
        Some(job) if job.status != JobStatus::RolledBack => job,
        _ => return Err(DbError::not_found("import job", query.job_id).into()),
    };

    let assets = state.catalog.list_assets(job.id).await?;
    let errors = state.catalog.list_errors(job.id).await?;

    Ok(JobStatusView { job, assets, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Catalog;
    use crate::features::imports::commands::testing::{editor, test_state};
    use crate::features::imports::commands::start::{self, StartJobCommand};

    #[tokio::test]
    async fn test_status_returns_job_and_collections() {
        let (state, _, _) = test_state();
        let job = start::handle(&state, StartJobCommand::default(), &editor())
            .await
            .unwrap();

        let view = handle(&state, JobStatusQuery { job_id: job.id }).await.unwrap();
        assert_eq!(view.job.id, job.id);
        assert!(view.assets.is_empty());
        assert!(view.errors.is_empty());
    }

    #[tokio::test]
    async fn test_status_of_unknown_job_is_not_found() {
        let (state, _, _) = test_state();
        let err = handle(&state, JobStatusQuery { job_id: Uuid::new_v4() })
            .await
            .unwrap_err();
        assert!(matches!(err, JobStatusError::Db(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_of_rolled_back_job_is_not_found() {
        let (state, catalog, _) = test_state();
        let job = start::handle(&state, StartJobCommand::default(), &editor())
            .await
            .unwrap();

        let mut stored = catalog.get_job(job.id).await.unwrap().unwrap();
        stored.status = JobStatus::RolledBack;
        catalog.update_job(&stored).await.unwrap();

        let err = handle(&state, JobStatusQuery { job_id: job.id })
            .await
            .unwrap_err();
        assert!(matches!(err, JobStatusError::Db(DbError::NotFound(_))));
    }
}
