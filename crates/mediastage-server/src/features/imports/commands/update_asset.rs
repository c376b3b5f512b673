//! Asset patch commands
//!
//! Review-phase edits to staged assets, one at a time or in bulk. Patches
//! replace the fields they carry and leave everything else alone; they
//! never touch validation state, which only the next validation pass may
//! rewrite.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::DbError;
use crate::error::AppError;
use crate::features::imports::commands::load_job;
use crate::features::imports::coordinator::{CoordinatorError, JobCoordinator, UPDATE_STATES};
use crate::features::imports::types::AssetPatch;
use crate::features::ImportState;
use crate::models::StagedAsset;

#[derive(Debug, Clone)]
pub struct UpdateAssetCommand {
    pub job_id: Uuid,
    pub asset_id: Uuid,
    pub patch: AssetPatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetUpdate {
    pub asset_id: Uuid,
    pub patch: AssetPatch,
}

#[derive(Debug, Clone)]
pub struct BulkUpdateCommand {
    pub job_id: Uuid,
    pub updates: Vec<AssetUpdate>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateOutcome {
    pub updated: usize,
    /// Identifiers that do not belong to the job.
    pub skipped: Vec<Uuid>,
}

#[derive(Error, Debug)]
pub enum UpdateAssetError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<UpdateAssetError> for AppError {
    fn from(err: UpdateAssetError) -> Self {
        match err {
            UpdateAssetError::Validation(msg) => AppError::Validation(msg),
            UpdateAssetError::Coordinator(e) => e.into(),
            UpdateAssetError::Db(e) => e.into(),
        }
    }
}

#[tracing::instrument(skip(state, command), fields(job_id = %command.job_id, asset_id = %command.asset_id))]
pub async fn handle(
    state: &ImportState,
    command: UpdateAssetCommand,
) -> Result<StagedAsset, UpdateAssetError> {
    if command.patch.is_empty() {
        return Err(UpdateAssetError::Validation("patch contains no fields".to_string()));
    }

    let _guard = state.coordinator.begin_mutation(command.job_id)?;

    let job = load_job(state.catalog.as_ref(), command.job_id).await?;
    JobCoordinator::require_state("update assets", &job, UPDATE_STATES)?;

    let mut asset = fetch_owned_asset(state, command.job_id, command.asset_id).await?;
    apply_patch(&mut asset, command.patch);
    state.catalog.update_asset(&asset).await?;

    Ok(asset)
}

#[tracing::instrument(skip(state, command), fields(job_id = %command.job_id, updates = command.updates.len()))]
pub async fn handle_bulk(
    state: &ImportState,
    command: BulkUpdateCommand,
) -> Result<BulkUpdateOutcome, UpdateAssetError> {
    let _guard = state.coordinator.begin_mutation(command.job_id)?;

    let job = load_job(state.catalog.as_ref(), command.job_id).await?;
    JobCoordinator::require_state("update assets", &job, UPDATE_STATES)?;

    let mut updated = 0usize;
    let mut skipped = Vec::new();
    for update in command.updates {
        match fetch_owned_asset(state, command.job_id, update.asset_id).await {
            Ok(mut asset) => {
                apply_patch(&mut asset, update.patch);
                state.catalog.update_asset(&asset).await?;
                updated += 1;
            },
            Err(UpdateAssetError::Db(DbError::NotFound(_))) => skipped.push(update.asset_id),
            Err(e) => return Err(e),
        }
    }

    info!(job_id = %command.job_id, updated, skipped = skipped.len(), "bulk update applied");
    Ok(BulkUpdateOutcome { updated, skipped })
}

async fn fetch_owned_asset(
    state: &ImportState,
    job_id: Uuid,
    asset_id: Uuid,
) -> Result<StagedAsset, UpdateAssetError> {
    match state.catalog.get_asset(asset_id).await? {
        Some(asset) if asset.job_id == job_id => Ok(asset),
        _ => Err(DbError::not_found("staged asset", asset_id).into()),
    }
}

fn apply_patch(asset: &mut StagedAsset, patch: AssetPatch) {
    if let Some(title) = patch.title {
        asset.metadata.title = Some(title);
    }
    if let Some(caption) = patch.caption {
        asset.metadata.caption = Some(caption);
    }
    if let Some(credit) = patch.credit {
        asset.metadata.credit = Some(credit);
    }
    if let Some(alt_text) = patch.alt_text {
        asset.metadata.alt_text = Some(alt_text);
    }
    if let Some(tags) = patch.tags {
        asset.metadata.tags = tags;
    }
    if let Some(geo) = patch.geo {
        asset.metadata.geo = Some(geo);
    }
    if let Some(entity) = patch.entity {
        asset.entity_link = entity;
    }
    asset.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::imports::commands::testing::{editor, test_state};
    use crate::features::imports::commands::start::{self, StartJobCommand};
    use crate::features::imports::commands::upload::{self, UploadFilesCommand, UploadedFile};
    use crate::models::{EntityLink, EntityRef, ValidationStatus};

    async fn job_with_asset(state: &crate::features::ImportState) -> (Uuid, Uuid) {
        let job = start::handle(state, StartJobCommand::default(), &editor())
            .await
            .unwrap();
        upload::handle(
            state,
            UploadFilesCommand {
                job_id: job.id,
                files: vec![UploadedFile {
                    filename: "a.jpg".to_string(),
                    content_type: Some("image/jpeg".to_string()),
                    data: b"pixels".to_vec(),
                }],
                mapping_rows: Vec::new(),
            },
        )
        .await
        .unwrap();
        let assets = state.catalog.list_assets(job.id).await.unwrap();
        (job.id, assets[0].id)
    }

    #[tokio::test]
    async fn test_patch_replaces_only_supplied_fields() {
        let (state, _, _) = test_state();
        let (job_id, asset_id) = job_with_asset(&state).await;

        let patch = AssetPatch {
            caption: Some("A caption".to_string()),
            entity: Some(EntityLink::Place(EntityRef::Slug("harbour".to_string()))),
            ..Default::default()
        };
        let asset = handle(&state, UpdateAssetCommand { job_id, asset_id, patch })
            .await
            .unwrap();

        assert_eq!(asset.metadata.caption.as_deref(), Some("A caption"));
        // Derived title untouched by a patch that does not carry one.
        assert_eq!(asset.metadata.title.as_deref(), Some("a"));
        assert_eq!(asset.entity_link.kind(), "place");
        assert_eq!(asset.validation_status, ValidationStatus::Valid);
    }

    #[tokio::test]
    async fn test_empty_patch_rejected() {
        let (state, _, _) = test_state();
        let (job_id, asset_id) = job_with_asset(&state).await;

        let err = handle(
            &state,
            UpdateAssetCommand { job_id, asset_id, patch: AssetPatch::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpdateAssetError::Validation(_)));
    }

    #[tokio::test]
    async fn test_patch_rejects_asset_from_another_job() {
        let (state, _, _) = test_state();
        let (job_a, _) = job_with_asset(&state).await;
        let (_, asset_b) = job_with_asset(&state).await;

        let patch = AssetPatch { title: Some("X".to_string()), ..Default::default() };
        let err = handle(
            &state,
            UpdateAssetCommand { job_id: job_a, asset_id: asset_b, patch },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpdateAssetError::Db(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bulk_update_skips_unknown_ids() {
        let (state, _, _) = test_state();
        let (job_id, asset_id) = job_with_asset(&state).await;
        let stranger = Uuid::new_v4();

        let outcome = handle_bulk(
            &state,
            BulkUpdateCommand {
                job_id,
                updates: vec![
                    AssetUpdate {
                        asset_id,
                        patch: AssetPatch { credit: Some("R. Byrd".to_string()), ..Default::default() },
                    },
                    AssetUpdate { asset_id: stranger, patch: AssetPatch::default() },
                ],
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.skipped, vec![stranger]);

        let asset = state.catalog.get_asset(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.metadata.credit.as_deref(), Some("R. Byrd"));
    }
}
