//! Validate job command
//!
//! Runs the content rule set over every staged asset. Each pass recomputes
//! statuses, diagnostics, and job counts from scratch, so repeated
//! validation with no intervening changes is idempotent. Asset content is
//! never touched.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::DbError;
use crate::error::AppError;
use crate::features::imports::commands::load_job;
use crate::features::imports::coordinator::{CoordinatorError, JobCoordinator, VALIDATE_STATES};
use crate::features::ImportState;
use crate::models::{
    Diagnostic, DiagnosticSeverity, DuplicatePolicy, ImportJob, JobStatus, StagedAsset,
    ValidationStatus,
};
use crate::storage::{ObjectMeta, StorageError};

#[derive(Debug, Clone, Copy)]
pub struct ValidateJobCommand {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ValidationOutcome {
    pub job: ImportJob,
    pub assets: Vec<StagedAsset>,
}

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ValidateError> for AppError {
    fn from(err: ValidateError) -> Self {
        match err {
            ValidateError::Coordinator(e) => e.into(),
            ValidateError::Db(e) => e.into(),
            ValidateError::Storage(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(state), fields(job_id = %command.job_id))]
pub async fn handle(
    state: &ImportState,
    command: ValidateJobCommand,
) -> Result<ValidationOutcome, ValidateError> {
    let _guard = state.coordinator.begin_mutation(command.job_id)?;

    let mut job = load_job(state.catalog.as_ref(), command.job_id).await?;
    JobCoordinator::require_state("validate", &job, VALIDATE_STATES)?;

    job.status = JobStatus::Validating;
    state.catalog.update_job(&job).await?;

    let mut assets = state.catalog.list_assets(job.id).await?;

    let mut fingerprints: HashMap<String, usize> = HashMap::new();
    for asset in &assets {
        *fingerprints.entry(asset.fingerprint.clone()).or_default() += 1;
    }

    for asset in &mut assets {
        let stored = match state.store.head(&asset.staging_path).await {
            Ok(meta) => Some(meta),
            Err(StorageError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let diagnostics =
            evaluate(asset, &fingerprints, job.settings.duplicate_policy, stored.as_ref());
        asset.validation_status = status_from(&diagnostics);
        asset.validation_messages = diagnostics;
        asset.updated_at = Utc::now();
        state.catalog.update_asset(asset).await?;
    }

    job.recompute_counts(&assets);
    job.status = JobStatus::Ready;
    state.catalog.update_job(&job).await?;

    info!(
        job_id = %job.id,
        valid = job.success_count,
        warnings = job.warning_count,
        errors = job.error_count,
        "validation pass complete"
    );
    Ok(ValidationOutcome { job, assets })
}

/// Apply the rule set to one asset. Pure with respect to everything except
/// the supplied inputs, so a re-run over unchanged inputs yields identical
/// diagnostics.
fn evaluate(
    asset: &StagedAsset,
    fingerprints: &HashMap<String, usize>,
    duplicate_policy: DuplicatePolicy,
    stored: Option<&ObjectMeta>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if asset.metadata.title.as_deref().unwrap_or("").trim().is_empty() {
        diagnostics.push(Diagnostic::warning("MISSING_TITLE", "asset has no title"));
    }

    if asset.entity_link.is_unlinked() {
        diagnostics.push(Diagnostic::warning(
            "UNLINKED_ASSET",
            "asset is not linked to any catalog entity",
        ));
    }

    if fingerprints.get(&asset.fingerprint).copied().unwrap_or(0) > 1 {
        let message = "another asset in this job has identical content";
        diagnostics.push(match duplicate_policy {
            DuplicatePolicy::Warn => Diagnostic::warning("DUPLICATE_FINGERPRINT", message),
            DuplicatePolicy::Error => Diagnostic::error("DUPLICATE_FINGERPRINT", message),
        });
    }

    if let Some(geo) = &asset.metadata.geo {
        if !geo.in_range() {
            diagnostics.push(Diagnostic::error(
                "GEO_OUT_OF_RANGE",
                format!("coordinates ({}, {}) are out of range", geo.latitude, geo.longitude),
            ));
        }
    }

    match stored {
        None => diagnostics.push(Diagnostic::error(
            "OBJECT_MISSING",
            "staged object is missing from storage",
        )),
        Some(meta) => {
            if meta.size != asset.size_bytes {
                diagnostics.push(Diagnostic::error(
                    "SIZE_MISMATCH",
                    format!(
                        "stored size {} does not match declared size {}",
                        meta.size, asset.size_bytes
                    ),
                ));
            }
            if let Some(content_type) = &meta.content_type {
                if !content_type.eq_ignore_ascii_case(&asset.mime_type) {
                    diagnostics.push(Diagnostic::error(
                        "MIME_MISMATCH",
                        format!(
                            "stored MIME type '{}' does not match declared '{}'",
                            content_type, asset.mime_type
                        ),
                    ));
                }
            }
        },
    }

    diagnostics
}

fn status_from(diagnostics: &[Diagnostic]) -> ValidationStatus {
    if diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Error)
    {
        ValidationStatus::Error
    } else if diagnostics.is_empty() {
        ValidationStatus::Valid
    } else {
        ValidationStatus::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::imports::commands::testing::{editor, test_state};
    use crate::features::imports::commands::start::{self, StartJobCommand};
    use crate::features::imports::commands::upload::{self, UploadFilesCommand, UploadedFile};
    use crate::models::{ImportSettings, MappingRow};
    use crate::storage::ObjectStore;

    fn jpeg(filename: &str, data: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: filename.to_string(),
            content_type: Some("image/jpeg".to_string()),
            data: data.to_vec(),
        }
    }

    async fn staged_job(
        state: &crate::features::ImportState,
        settings: ImportSettings,
        mapping: Vec<MappingRow>,
        files: Vec<UploadedFile>,
    ) -> Uuid {
        let command = StartJobCommand { settings, mapping };
        let job = start::handle(state, command, &editor()).await.unwrap();
        upload::handle(
            state,
            UploadFilesCommand { job_id: job.id, files, mapping_rows: Vec::new() },
        )
        .await
        .unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_duplicate_pair_flagged_as_warnings() {
        let (state, _, _) = test_state();
        let job_id = staged_job(
            &state,
            ImportSettings::default(),
            Vec::new(),
            vec![jpeg("a.jpg", b"same"), jpeg("b.jpg", b"other"), jpeg("a_copy.jpg", b"same")],
        )
        .await;

        let outcome = handle(&state, ValidateJobCommand { job_id }).await.unwrap();
        assert_eq!(outcome.job.status, JobStatus::Ready);
        assert_eq!(outcome.job.error_count, 0);
        assert!(outcome.job.warning_count >= 2);

        let duplicates: Vec<_> = outcome
            .assets
            .iter()
            .filter(|a| {
                a.validation_messages
                    .iter()
                    .any(|d| d.code == "DUPLICATE_FINGERPRINT")
            })
            .collect();
        assert_eq!(duplicates.len(), 2);
        assert!(duplicates
            .iter()
            .all(|a| a.original_filename != "b.jpg"));
    }

    #[tokio::test]
    async fn test_duplicate_policy_error_promotes_severity() {
        let (state, _, _) = test_state();
        let settings = ImportSettings {
            publish_by_default: false,
            duplicate_policy: DuplicatePolicy::Error,
        };
        let job_id = staged_job(
            &state,
            settings,
            Vec::new(),
            vec![jpeg("a.jpg", b"same"), jpeg("b.jpg", b"same")],
        )
        .await;

        let outcome = handle(&state, ValidateJobCommand { job_id }).await.unwrap();
        assert_eq!(outcome.job.error_count, 2);
    }

    #[tokio::test]
    async fn test_validation_is_idempotent() {
        let (state, _, _) = test_state();
        let job_id = staged_job(
            &state,
            ImportSettings::default(),
            Vec::new(),
            vec![jpeg("a.jpg", b"same"), jpeg("b.jpg", b"same"), jpeg("c.jpg", b"unique")],
        )
        .await;

        let first = handle(&state, ValidateJobCommand { job_id }).await.unwrap();
        let second = handle(&state, ValidateJobCommand { job_id }).await.unwrap();

        assert_eq!(first.job.success_count, second.job.success_count);
        assert_eq!(first.job.warning_count, second.job.warning_count);
        assert_eq!(first.job.error_count, second.job.error_count);
        for (a, b) in first.assets.iter().zip(second.assets.iter()) {
            assert_eq!(a.validation_status, b.validation_status);
            assert_eq!(a.validation_messages, b.validation_messages);
        }
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_are_an_error() {
        let (state, _, _) = test_state();
        let row = MappingRow {
            filename: "photo1.jpg".to_string(),
            entity_type: None,
            entity_ref: None,
            title: Some("Sunrise".to_string()),
            caption: None,
            credit: None,
            tags: None,
            latitude: Some(200.0),
            longitude: Some(14.2),
            publish: None,
        };
        let job_id = staged_job(
            &state,
            ImportSettings::default(),
            vec![row],
            vec![jpeg("photo1.jpg", b"pixels")],
        )
        .await;

        let outcome = handle(&state, ValidateJobCommand { job_id }).await.unwrap();
        assert_eq!(outcome.assets[0].validation_status, ValidationStatus::Error);
        assert!(outcome.assets[0]
            .validation_messages
            .iter()
            .any(|d| d.code == "GEO_OUT_OF_RANGE"));
        assert_eq!(outcome.job.error_count, 1);
    }

    #[tokio::test]
    async fn test_missing_staged_object_is_an_error() {
        let (state, _, store) = test_state();
        let job_id = staged_job(
            &state,
            ImportSettings::default(),
            Vec::new(),
            vec![jpeg("a.jpg", b"pixels")],
        )
        .await;

        // Simulate an object lost from the staging area.
        for key in store.list("staging/").await.unwrap() {
            store.delete(&key).await.unwrap();
        }

        let outcome = handle(&state, ValidateJobCommand { job_id }).await.unwrap();
        assert!(outcome.assets[0]
            .validation_messages
            .iter()
            .any(|d| d.code == "OBJECT_MISSING"));
        assert_eq!(outcome.assets[0].validation_status, ValidationStatus::Error);
    }

    #[tokio::test]
    async fn test_desynced_staged_object_fails_size_and_mime_checks() {
        let (state, _, store) = test_state();
        let job_id = staged_job(
            &state,
            ImportSettings::default(),
            Vec::new(),
            vec![jpeg("a.jpg", b"pixels")],
        )
        .await;

        // Overwrite the staged object with different bytes and MIME type.
        let key = store.list("staging/").await.unwrap().pop().unwrap();
        store
            .put(&key, b"short".to_vec(), Some("image/png".to_string()))
            .await
            .unwrap();

        let outcome = handle(&state, ValidateJobCommand { job_id }).await.unwrap();
        let asset = &outcome.assets[0];
        assert_eq!(asset.validation_status, ValidationStatus::Error);
        assert!(asset
            .validation_messages
            .iter()
            .any(|d| d.code == "SIZE_MISMATCH"));
        assert!(asset
            .validation_messages
            .iter()
            .any(|d| d.code == "MIME_MISMATCH"));
        assert_eq!(outcome.job.error_count, 1);
    }

    #[test]
    fn test_status_from_severity_ladder() {
        assert_eq!(status_from(&[]), ValidationStatus::Valid);
        assert_eq!(
            status_from(&[Diagnostic::warning("W", "w")]),
            ValidationStatus::Warning
        );
        assert_eq!(
            status_from(&[Diagnostic::warning("W", "w"), Diagnostic::error("E", "e")]),
            ValidationStatus::Error
        );
    }
}
