//! Upload files command
//!
//! Ingests a batch of files into a job's staging area. Per-file failures
//! never abort the batch: files rejected by the acceptance policy become
//! durable policy errors before any I/O, and staging-write failures become
//! recoverable upload errors. The progress counter advances for every
//! attempted file regardless of outcome.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use mediastage_common::content_fingerprint;

use crate::config::IngestPolicy;
use crate::db::DbError;
use crate::error::AppError;
use crate::features::imports::commands::load_job;
use crate::features::imports::coordinator::{CoordinatorError, JobCoordinator, UPLOAD_STATES};
use crate::features::ImportState;
use crate::models::{
    ImportErrorKind, ImportErrorRecord, ImportJob, JobStatus, MappingRow, StagedAsset,
};
use crate::storage::KeyScheme;

const FALLBACK_MIME: &str = "application/octet-stream";

/// One file of an upload request, already read off the wire.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct UploadFilesCommand {
    pub job_id: Uuid,

    pub files: Vec<UploadedFile>,

    /// Mapping rows supplied alongside this upload. A row for an
    /// already-mapped filename replaces the earlier row.
    pub mapping_rows: Vec<MappingRow>,
}

#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub job: ImportJob,
    /// Files staged and recorded as assets.
    pub accepted: usize,
    /// Files turned into policy or upload error records.
    pub rejected: usize,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Config(msg) => AppError::Config(msg),
            UploadError::Coordinator(e) => e.into(),
            UploadError::Db(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(state, command), fields(job_id = %command.job_id, files = command.files.len()))]
pub async fn handle(
    state: &ImportState,
    command: UploadFilesCommand,
) -> Result<UploadOutcome, UploadError> {
    let _guard = state.coordinator.begin_mutation(command.job_id)?;

    let mut job = load_job(state.catalog.as_ref(), command.job_id).await?;
    JobCoordinator::require_state("upload", &job, UPLOAD_STATES)?;

    for row in &command.mapping_rows {
        row.validate().map_err(UploadError::Config)?;
    }
    for row in command.mapping_rows {
        match job
            .csv_mapping
            .iter_mut()
            .find(|r| r.filename.eq_ignore_ascii_case(&row.filename))
        {
            Some(existing) => *existing = row,
            None => job.csv_mapping.push(row),
        }
    }

    job.status = JobStatus::Uploading;
    if job.started_at.is_none() {
        job.started_at = Some(Utc::now());
    }
    job.total_files += command.files.len() as i32;
    state.catalog.update_job(&job).await?;

    // Acceptance policy runs before any I/O.
    let existing = state.catalog.count_assets(job.id).await?;
    let mut accepted = Vec::new();
    let mut rejected = 0usize;
    for file in command.files {
        match check_policy(&state.policy, &file, existing + accepted.len()) {
            Ok(()) => accepted.push(file),
            Err(rejection) => {
                rejected += 1;
                job.processed_files += 1;
                warn!(filename = %file.filename, code = rejection.code, "file rejected by policy");
                let error = ImportErrorRecord::new(
                    job.id,
                    None,
                    ImportErrorKind::Policy,
                    rejection.message,
                    false,
                )
                .with_code(rejection.code)
                .with_details(json!({ "filename": file.filename }));
                state.catalog.insert_error(&error).await?;
            },
        }
    }
    state.catalog.update_job(&job).await?;

    // Stage accepted files with bounded concurrency; record results one at
    // a time so the catalog sees a consistent insertion order per worker
    // completion.
    let prepared: Vec<(StagedAsset, Vec<u8>, Option<String>)> = accepted
        .into_iter()
        .map(|file| {
            let asset = build_asset(&job, &state.keys, &file);
            (asset, file.data, file.content_type)
        })
        .collect();

    let mut uploads = stream::iter(prepared.into_iter().map(|(asset, data, content_type)| {
        let store = Arc::clone(&state.store);
        async move {
            let result = store.put(&asset.staging_path, data, content_type).await;
            (asset, result)
        }
    }))
    .buffer_unordered(state.policy.upload_concurrency);

    let mut stored = 0usize;
    while let Some((asset, result)) = uploads.next().await {
        job.processed_files += 1;
        match result {
            Ok(()) => {
                state.catalog.insert_asset(&asset).await?;
                stored += 1;
            },
            Err(e) => {
                rejected += 1;
                warn!(filename = %asset.original_filename, error = %e, "staging write failed");
                let error = ImportErrorRecord::new(
                    job.id,
                    None,
                    ImportErrorKind::Upload,
                    format!("failed to stage '{}': {}", asset.original_filename, e),
                    true,
                )
                .with_code("STAGING_WRITE_FAILED")
                .with_details(json!({ "filename": asset.original_filename }));
                state.catalog.insert_error(&error).await?;
            },
        }
        state.catalog.update_job(&job).await?;
    }
    drop(uploads);

    let assets = state.catalog.list_assets(job.id).await?;
    job.recompute_counts(&assets);
    state.catalog.update_job(&job).await?;

    info!(job_id = %job.id, accepted = stored, rejected, "upload batch processed");
    Ok(UploadOutcome { job, accepted: stored, rejected })
}

struct PolicyRejection {
    code: &'static str,
    message: String,
}

fn check_policy(
    policy: &IngestPolicy,
    file: &UploadedFile,
    current_count: usize,
) -> Result<(), PolicyRejection> {
    if current_count >= policy.max_files_per_job {
        return Err(PolicyRejection {
            code: "FILE_COUNT_EXCEEDED",
            message: format!(
                "'{}' rejected: job already holds the maximum of {} files",
                file.filename, policy.max_files_per_job
            ),
        });
    }

    let mime = file.content_type.as_deref().unwrap_or(FALLBACK_MIME);
    if !policy.accepts_mime(mime) {
        return Err(PolicyRejection {
            code: "MIME_NOT_ALLOWED",
            message: format!("'{}' rejected: MIME type '{}' is not accepted", file.filename, mime),
        });
    }

    if file.data.len() as i64 > policy.max_file_bytes {
        return Err(PolicyRejection {
            code: "FILE_TOO_LARGE",
            message: format!(
                "'{}' rejected: {} bytes exceeds the {} byte ceiling",
                file.filename,
                file.data.len(),
                policy.max_file_bytes
            ),
        });
    }

    Ok(())
}

/// Derive a human title from a filename: extension stripped, separators
/// turned into spaces.
fn title_from_filename(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    stem.replace(['_', '-'], " ").trim().to_string()
}

fn build_asset(job: &ImportJob, keys: &KeyScheme, file: &UploadedFile) -> StagedAsset {
    let asset_id = Uuid::new_v4();
    let staging_path = keys.staging_key(job.id, asset_id, &file.filename);
    let mime = file.content_type.clone().unwrap_or_else(|| FALLBACK_MIME.to_string());
    let fingerprint = content_fingerprint(&file.data);

    let mut asset = StagedAsset::new(
        job.id,
        &file.filename,
        staging_path,
        mime,
        file.data.len() as i64,
        fingerprint,
    );
    // Key the staging object by the same id the record carries.
    asset.id = asset_id;

    match job.mapping_for(&file.filename) {
        Some(row) => {
            asset.metadata.title = row
                .title
                .clone()
                .or_else(|| Some(title_from_filename(&file.filename)));
            asset.metadata.caption = row.caption.clone();
            asset.metadata.credit = row.credit.clone();
            asset.metadata.tags = row.parsed_tags();
            asset.metadata.geo = row.geo();
            match row.entity_link() {
                Ok(link) => asset.entity_link = link,
                Err(reason) => {
                    warn!(filename = %file.filename, %reason, "ignoring unusable entity link")
                },
            }
        },
        None => {
            asset.metadata.title = Some(title_from_filename(&file.filename));
        },
    }

    asset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Catalog;
    use crate::features::imports::commands::testing::{editor, test_state, test_state_with_policy};
    use crate::features::imports::commands::start::{self, StartJobCommand};
    use crate::models::{EntityLink, ImportSettings};

    fn jpeg(filename: &str, data: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: filename.to_string(),
            content_type: Some("image/jpeg".to_string()),
            data: data.to_vec(),
        }
    }

    async fn queued_job(state: &crate::features::ImportState, mapping: Vec<MappingRow>) -> Uuid {
        let command = StartJobCommand { settings: ImportSettings::default(), mapping };
        start::handle(state, command, &editor()).await.unwrap().id
    }

    #[tokio::test]
    async fn test_upload_stages_accepted_files() {
        let (state, catalog, store) = test_state();
        let job_id = queued_job(&state, Vec::new()).await;

        let outcome = handle(
            &state,
            UploadFilesCommand {
                job_id,
                files: vec![jpeg("a.jpg", b"aaa"), jpeg("b.jpg", b"bbb")],
                mapping_rows: Vec::new(),
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected, 0);
        assert_eq!(outcome.job.status, JobStatus::Uploading);
        assert_eq!(outcome.job.total_files, 2);
        assert_eq!(outcome.job.processed_files, 2);
        assert!(outcome.job.started_at.is_some());

        assert_eq!(catalog.count_assets(job_id).await.unwrap(), 2);
        assert_eq!(store.object_count().await, 2);
    }

    #[tokio::test]
    async fn test_policy_rejections_become_durable_errors() {
        let (state, catalog, store) = test_state();
        let job_id = queued_job(&state, Vec::new()).await;

        let outcome = handle(
            &state,
            UploadFilesCommand {
                job_id,
                files: vec![
                    jpeg("ok.jpg", b"fine"),
                    UploadedFile {
                        filename: "notes.pdf".to_string(),
                        content_type: Some("application/pdf".to_string()),
                        data: b"%PDF".to_vec(),
                    },
                ],
                mapping_rows: Vec::new(),
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected, 1);
        // Progress advances for the rejected file too.
        assert_eq!(outcome.job.processed_files, 2);

        let errors = catalog.list_errors(job_id).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ImportErrorKind::Policy);
        assert_eq!(errors[0].code.as_deref(), Some("MIME_NOT_ALLOWED"));
        assert!(!errors[0].is_recoverable);
        assert_eq!(store.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_file_count_ceiling() {
        let mut policy = IngestPolicy::default();
        policy.max_files_per_job = 2;
        let (state, catalog, _) = test_state_with_policy(policy);
        let job_id = queued_job(&state, Vec::new()).await;

        let outcome = handle(
            &state,
            UploadFilesCommand {
                job_id,
                files: vec![jpeg("a.jpg", b"a"), jpeg("b.jpg", b"b"), jpeg("c.jpg", b"c")],
                mapping_rows: Vec::new(),
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected, 1);
        let errors = catalog.list_errors(job_id).await.unwrap();
        assert_eq!(errors[0].code.as_deref(), Some("FILE_COUNT_EXCEEDED"));
    }

    #[tokio::test]
    async fn test_mapping_seeds_metadata() {
        let (state, catalog, _) = test_state();
        let row = MappingRow {
            filename: "photo1.jpg".to_string(),
            entity_type: Some("place".to_string()),
            entity_ref: Some("old-lighthouse".to_string()),
            title: Some("Sunrise".to_string()),
            caption: Some("Dawn over the bay".to_string()),
            credit: None,
            tags: Some("coast;sunrise".to_string()),
            latitude: Some(58.3),
            longitude: Some(14.2),
            publish: None,
        };
        let job_id = queued_job(&state, vec![row]).await;

        handle(
            &state,
            UploadFilesCommand {
                job_id,
                files: vec![jpeg("Photo1.JPG", b"pixels"), jpeg("other.jpg", b"more")],
                mapping_rows: Vec::new(),
            },
        )
        .await
        .unwrap();

        let assets = catalog.list_assets(job_id).await.unwrap();
        let mapped = assets
            .iter()
            .find(|a| a.original_filename == "Photo1.JPG")
            .unwrap();
        assert_eq!(mapped.metadata.title.as_deref(), Some("Sunrise"));
        assert_eq!(mapped.metadata.tags, vec!["coast", "sunrise"]);
        assert!(matches!(mapped.entity_link, EntityLink::Place(_)));
        assert_eq!(mapped.metadata.geo.unwrap().latitude, 58.3);

        let unmapped = assets
            .iter()
            .find(|a| a.original_filename == "other.jpg")
            .unwrap();
        assert_eq!(unmapped.metadata.title.as_deref(), Some("other"));
        assert!(unmapped.entity_link.is_unlinked());
    }

    #[tokio::test]
    async fn test_upload_rejected_after_validation_started() {
        let (state, catalog, _) = test_state();
        let job_id = queued_job(&state, Vec::new()).await;

        let mut job = catalog.get_job(job_id).await.unwrap().unwrap();
        job.status = JobStatus::Ready;
        catalog.update_job(&job).await.unwrap();

        let err = handle(
            &state,
            UploadFilesCommand {
                job_id,
                files: vec![jpeg("late.jpg", b"x")],
                mapping_rows: Vec::new(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Coordinator(CoordinatorError::IncompatibleState { .. })
        ));
    }

    #[test]
    fn test_title_from_filename() {
        assert_eq!(title_from_filename("harbour_at-dusk.jpg"), "harbour at dusk");
        assert_eq!(title_from_filename("photo1.jpg"), "photo1");
        assert_eq!(title_from_filename("noext"), "noext");
    }
}
