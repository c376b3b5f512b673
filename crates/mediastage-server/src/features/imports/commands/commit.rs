//! Commit job command
//!
//! Promotes eligible staged assets into the public catalog. A per-asset
//! failure is recorded as a recoverable commit error and the remaining
//! assets proceed; a large batch is never held hostage by one bad file.
//! The job lands in `committed` when at least one asset published,
//! otherwise in `failed`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbError;
use crate::error::AppError;
use crate::features::imports::commands::load_job;
use crate::features::imports::coordinator::{CoordinatorError, JobCoordinator, COMMIT_STATES};
use crate::features::imports::types::Caller;
use crate::features::ImportState;
use crate::models::{
    ImportErrorKind, ImportErrorRecord, ImportJob, JobStatus, PublishStatus, StagedAsset,
    ValidationStatus,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CommitJobCommand {
    #[serde(skip)]
    pub job_id: Uuid,

    /// Publish every non-error asset.
    #[serde(default)]
    pub publish_all: bool,

    /// Explicit selection, published regardless of validation status.
    #[serde(default)]
    pub asset_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct CommitOutcome {
    pub job: ImportJob,
    pub published: usize,
}

#[derive(Error, Debug)]
pub enum CommitError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<CommitError> for AppError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Coordinator(e) => e.into(),
            CommitError::Db(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(state, command), fields(job_id = %command.job_id, publish_all = command.publish_all, caller = %caller.id))]
pub async fn handle(
    state: &ImportState,
    command: CommitJobCommand,
    caller: &Caller,
) -> Result<CommitOutcome, CommitError> {
    let _guard = state.coordinator.begin_mutation(command.job_id)?;

    let mut job = load_job(state.catalog.as_ref(), command.job_id).await?;
    JobCoordinator::require_state("commit", &job, COMMIT_STATES)?;

    job.status = JobStatus::Committing;
    state.catalog.update_job(&job).await?;

    let assets = state.catalog.list_assets(job.id).await?;
    let eligible = match &command.asset_ids {
        Some(ids) => select_explicit(state, &job, &assets, ids).await?,
        None => select_by_policy(&job, assets, command.publish_all),
    };

    let mut published = 0usize;
    for mut asset in eligible {
        let public_key = state
            .keys
            .public_key(job.id, asset.id, &asset.original_filename);

        let promotion: Result<(), String> = async {
            state
                .store
                .copy(&asset.staging_path, &public_key)
                .await
                .map_err(|e| e.to_string())?;
            if !asset.entity_link.is_unlinked() {
                state
                    .catalog
                    .link_entity(asset.id, &asset.entity_link)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        .await;

        match promotion {
            Ok(()) => {
                asset.public_path = Some(public_key);
                asset.publish_status = PublishStatus::Published;
                asset.is_published = true;
                asset.updated_at = Utc::now();
                state.catalog.update_asset(&asset).await?;
                published += 1;
            },
            Err(reason) => {
                warn!(asset_id = %asset.id, %reason, "asset failed to publish");
                let error = ImportErrorRecord::new(
                    job.id,
                    Some(asset.id),
                    ImportErrorKind::Commit,
                    format!("failed to publish '{}': {}", asset.original_filename, reason),
                    true,
                )
                .with_code("PUBLISH_FAILED")
                .with_details(json!({ "filename": asset.original_filename }));
                state.catalog.insert_error(&error).await?;
            },
        }
    }

    let now = Utc::now();
    if published > 0 {
        job.status = JobStatus::Committed;
        job.committed_at = Some(now);
        job.committed_by = Some(caller.id);
    } else {
        job.status = JobStatus::Failed;
    }
    job.completed_at = Some(now);

    let assets = state.catalog.list_assets(job.id).await?;
    job.recompute_counts(&assets);
    state.catalog.update_job(&job).await?;

    info!(job_id = %job.id, published, status = %job.status, "commit finished");
    Ok(CommitOutcome { job, published })
}

/// Caller-specified selection: the named assets regardless of validation
/// status. Unknown identifiers are recorded as commit errors and skipped.
async fn select_explicit(
    state: &ImportState,
    job: &ImportJob,
    assets: &[StagedAsset],
    ids: &[Uuid],
) -> Result<Vec<StagedAsset>, CommitError> {
    let mut selected = Vec::with_capacity(ids.len());
    for id in ids {
        match assets.iter().find(|a| a.id == *id) {
            Some(asset) => selected.push(asset.clone()),
            None => {
                let error = ImportErrorRecord::new(
                    job.id,
                    None,
                    ImportErrorKind::Commit,
                    format!("asset '{}' does not belong to this job", id),
                    false,
                )
                .with_code("UNKNOWN_ASSET");
                state.catalog.insert_error(&error).await?;
            },
        }
    }
    Ok(selected)
}

/// Policy selection: non-error assets only. With `publish_all` every such
/// asset is taken; otherwise only those the mapping table (or the job's
/// default publish flag) marks for publication.
fn select_by_policy(job: &ImportJob, assets: Vec<StagedAsset>, publish_all: bool) -> Vec<StagedAsset> {
    assets
        .into_iter()
        .filter(|asset| asset.validation_status != ValidationStatus::Error)
        .filter(|asset| {
            publish_all
                || job
                    .mapping_for(&asset.original_filename)
                    .and_then(|row| row.publish)
                    .unwrap_or(job.settings.publish_by_default)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Catalog;
    use crate::features::imports::commands::testing::{editor, test_state};
    use crate::features::imports::commands::start::{self, StartJobCommand};
    use crate::features::imports::commands::upload::{self, UploadFilesCommand, UploadedFile};
    use crate::features::imports::commands::validate::{self, ValidateJobCommand};
    use crate::models::{ImportSettings, MappingRow};

    fn jpeg(filename: &str, data: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: filename.to_string(),
            content_type: Some("image/jpeg".to_string()),
            data: data.to_vec(),
        }
    }

    async fn ready_job(
        state: &crate::features::ImportState,
        mapping: Vec<MappingRow>,
        files: Vec<UploadedFile>,
    ) -> Uuid {
        let command = StartJobCommand { settings: ImportSettings::default(), mapping };
        let job = start::handle(state, command, &editor()).await.unwrap();
        upload::handle(
            state,
            UploadFilesCommand { job_id: job.id, files, mapping_rows: Vec::new() },
        )
        .await
        .unwrap();
        validate::handle(state, ValidateJobCommand { job_id: job.id })
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_commit_publishes_and_links() {
        let (state, catalog, store) = test_state();
        let row = MappingRow {
            filename: "a.jpg".to_string(),
            entity_type: Some("place".to_string()),
            entity_ref: Some("old-lighthouse".to_string()),
            title: Some("Lighthouse".to_string()),
            caption: None,
            credit: None,
            tags: None,
            latitude: None,
            longitude: None,
            publish: None,
        };
        let job_id = ready_job(&state, vec![row], vec![jpeg("a.jpg", b"pixels")]).await;

        let caller = editor();
        let outcome = handle(
            &state,
            CommitJobCommand { job_id, publish_all: true, asset_ids: None },
            &caller,
        )
        .await
        .unwrap();

        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.job.status, JobStatus::Committed);
        assert_eq!(outcome.job.committed_by, Some(caller.id));
        assert!(outcome.job.committed_at.is_some());

        let asset = &catalog.list_assets(job_id).await.unwrap()[0];
        assert!(asset.is_published);
        assert_eq!(asset.publish_status, PublishStatus::Published);
        let public_path = asset.public_path.as_deref().unwrap();
        assert_eq!(store.get(public_path).await.unwrap(), b"pixels");

        let links = catalog.entity_links().await;
        assert_eq!(links, vec![("place".to_string(), "old-lighthouse".to_string(), asset.id)]);
    }

    #[tokio::test]
    async fn test_commit_with_zero_eligible_assets_fails_job() {
        let (state, _, _) = test_state();
        // Out-of-range coordinates validate as an error, leaving nothing
        // eligible.
        let row = MappingRow {
            filename: "a.jpg".to_string(),
            entity_type: None,
            entity_ref: None,
            title: Some("Broken".to_string()),
            caption: None,
            credit: None,
            tags: None,
            latitude: Some(200.0),
            longitude: Some(0.0),
            publish: None,
        };
        let job_id = ready_job(&state, vec![row], vec![jpeg("a.jpg", b"pixels")]).await;

        let outcome = handle(
            &state,
            CommitJobCommand { job_id, publish_all: true, asset_ids: None },
            &editor(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.published, 0);
        assert_eq!(outcome.job.status, JobStatus::Failed);
        assert!(outcome.job.committed_at.is_none());
    }

    #[tokio::test]
    async fn test_explicit_selection_overrides_error_status() {
        let (state, catalog, _) = test_state();
        let row = MappingRow {
            filename: "a.jpg".to_string(),
            entity_type: None,
            entity_ref: None,
            title: Some("Broken".to_string()),
            caption: None,
            credit: None,
            tags: None,
            latitude: Some(200.0),
            longitude: Some(0.0),
            publish: None,
        };
        let job_id = ready_job(&state, vec![row], vec![jpeg("a.jpg", b"pixels")]).await;
        let asset_id = catalog.list_assets(job_id).await.unwrap()[0].id;

        let outcome = handle(
            &state,
            CommitJobCommand { job_id, publish_all: false, asset_ids: Some(vec![asset_id]) },
            &editor(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.job.status, JobStatus::Committed);
    }

    #[tokio::test]
    async fn test_unknown_asset_id_recorded_and_skipped() {
        let (state, catalog, _) = test_state();
        let job_id = ready_job(&state, Vec::new(), vec![jpeg("a.jpg", b"pixels")]).await;
        let known = catalog.list_assets(job_id).await.unwrap()[0].id;

        let outcome = handle(
            &state,
            CommitJobCommand {
                job_id,
                publish_all: false,
                asset_ids: Some(vec![known, Uuid::new_v4()]),
            },
            &editor(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.published, 1);
        let errors = catalog.list_errors(job_id).await.unwrap();
        assert!(errors
            .iter()
            .any(|e| e.code.as_deref() == Some("UNKNOWN_ASSET")));
    }

    #[tokio::test]
    async fn test_commit_requires_ready_state() {
        let (state, _, _) = test_state();
        let job = start::handle(&state, StartJobCommand::default(), &editor())
            .await
            .unwrap();
        upload::handle(
            &state,
            UploadFilesCommand {
                job_id: job.id,
                files: vec![jpeg("a.jpg", b"pixels")],
                mapping_rows: Vec::new(),
            },
        )
        .await
        .unwrap();

        // Straight from uploading, without a validation pass.
        let err = handle(
            &state,
            CommitJobCommand { job_id: job.id, publish_all: true, asset_ids: None },
            &editor(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Coordinator(CoordinatorError::IncompatibleState { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_flag_selection_without_publish_all() {
        let (state, catalog, _) = test_state();
        let rows = vec![
            MappingRow {
                filename: "yes.jpg".to_string(),
                entity_type: None,
                entity_ref: None,
                title: Some("Yes".to_string()),
                caption: None,
                credit: None,
                tags: None,
                latitude: None,
                longitude: None,
                publish: Some(true),
            },
            MappingRow {
                filename: "no.jpg".to_string(),
                entity_type: None,
                entity_ref: None,
                title: Some("No".to_string()),
                caption: None,
                credit: None,
                tags: None,
                latitude: None,
                longitude: None,
                publish: Some(false),
            },
        ];
        let job_id =
            ready_job(&state, rows, vec![jpeg("yes.jpg", b"y"), jpeg("no.jpg", b"n")]).await;

        let outcome = handle(
            &state,
            CommitJobCommand { job_id, publish_all: false, asset_ids: None },
            &editor(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.published, 1);

        let assets = catalog.list_assets(job_id).await.unwrap();
        let yes = assets.iter().find(|a| a.original_filename == "yes.jpg").unwrap();
        let no = assets.iter().find(|a| a.original_filename == "no.jpg").unwrap();
        assert!(yes.is_published);
        assert!(!no.is_published);
    }
}
