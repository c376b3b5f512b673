//! Job coordinator
//!
//! Owns the per-job serialization of mutating operations and the lifecycle
//! compatibility table. Every mutating command acquires a [`MutationGuard`]
//! before touching the catalog; a second caller on the same job is rejected
//! with a conflict rather than queued, so a rollback can never race a
//! commit and two callers cannot double-commit. Jobs are fully independent
//! of each other; the registry holds one lock per live job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ImportJob, JobStatus};

/// States from which file ingestion may run.
pub const UPLOAD_STATES: &[JobStatus] = &[JobStatus::Queued, JobStatus::Uploading];

/// States from which validation may run. Validation is re-runnable at any
/// point before commit.
pub const VALIDATE_STATES: &[JobStatus] =
    &[JobStatus::Uploading, JobStatus::Validating, JobStatus::Ready];

/// States from which asset patches may be applied.
pub const UPDATE_STATES: &[JobStatus] =
    &[JobStatus::Uploading, JobStatus::Validating, JobStatus::Ready];

/// States from which commit may run. A batch must pass through validation
/// to become ready; committing straight out of upload is a state conflict.
pub const COMMIT_STATES: &[JobStatus] = &[JobStatus::Ready];

/// States from which rollback may run.
pub const ROLLBACK_STATES: &[JobStatus] =
    &[JobStatus::Ready, JobStatus::Committed, JobStatus::Failed];

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("another operation is already in flight for job {0}")]
    Busy(Uuid),

    #[error("cannot {op} while job is in state '{status}'")]
    IncompatibleState { op: &'static str, status: JobStatus },
}

impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

/// Exclusive permit for one mutating operation on one job.
///
/// Dropping the guard releases the job for the next mutation.
pub struct MutationGuard {
    _permit: OwnedMutexGuard<()>,
}

/// Registry of per-job mutation locks plus the lifecycle rules.
#[derive(Default)]
pub struct JobCoordinator {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutation permit for a job, failing immediately if
    /// another mutating operation holds it.
    pub fn begin_mutation(&self, job_id: Uuid) -> Result<MutationGuard, CoordinatorError> {
        let lock = {
            let mut locks = self.locks.lock().expect("coordinator lock poisoned");
            Arc::clone(locks.entry(job_id).or_default())
        };

        match lock.try_lock_owned() {
            Ok(permit) => Ok(MutationGuard { _permit: permit }),
            Err(_) => Err(CoordinatorError::Busy(job_id)),
        }
    }

    /// Check that `job` is in a state compatible with `op`.
    pub fn require_state(
        op: &'static str,
        job: &ImportJob,
        allowed: &[JobStatus],
    ) -> Result<(), CoordinatorError> {
        if allowed.contains(&job.status) {
            Ok(())
        } else {
            Err(CoordinatorError::IncompatibleState { op, status: job.status })
        }
    }

    /// Drop the lock entry for a job that no longer exists. Called after
    /// rollback; an in-flight guard keeps the underlying mutex alive.
    pub fn forget(&self, job_id: Uuid) {
        self.locks
            .lock()
            .expect("coordinator lock poisoned")
            .remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImportSettings;

    #[test]
    fn test_second_mutation_is_rejected_while_first_in_flight() {
        let coordinator = JobCoordinator::new();
        let job_id = Uuid::new_v4();

        let guard = coordinator.begin_mutation(job_id).unwrap();
        assert!(matches!(
            coordinator.begin_mutation(job_id),
            Err(CoordinatorError::Busy(id)) if id == job_id
        ));

        drop(guard);
        assert!(coordinator.begin_mutation(job_id).is_ok());
    }

    #[test]
    fn test_jobs_do_not_block_each_other() {
        let coordinator = JobCoordinator::new();
        let _a = coordinator.begin_mutation(Uuid::new_v4()).unwrap();
        let _b = coordinator.begin_mutation(Uuid::new_v4()).unwrap();
    }

    #[test]
    fn test_state_table() {
        let mut job = ImportJob::new(Uuid::new_v4(), ImportSettings::default(), Vec::new());

        assert!(JobCoordinator::require_state("upload", &job, UPLOAD_STATES).is_ok());
        assert!(JobCoordinator::require_state("commit", &job, COMMIT_STATES).is_err());

        job.status = JobStatus::Ready;
        assert!(JobCoordinator::require_state("commit", &job, COMMIT_STATES).is_ok());
        assert!(JobCoordinator::require_state("rollback", &job, ROLLBACK_STATES).is_ok());
        assert!(JobCoordinator::require_state("upload", &job, UPLOAD_STATES).is_err());

        // Commit straight out of upload is rejected; validation is the only
        // path to ready.
        job.status = JobStatus::Uploading;
        assert!(JobCoordinator::require_state("commit", &job, COMMIT_STATES).is_err());
        assert!(JobCoordinator::require_state("validate", &job, VALIDATE_STATES).is_ok());

        job.status = JobStatus::Committed;
        assert!(JobCoordinator::require_state("rollback", &job, ROLLBACK_STATES).is_ok());
        assert!(JobCoordinator::require_state("validate", &job, VALIDATE_STATES).is_err());
    }
}
