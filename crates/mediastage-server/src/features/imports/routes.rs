use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::response::ApiResponse;
use crate::error::AppError;
use crate::features::ImportState;

use super::commands::commit::{self, CommitJobCommand};
use super::commands::rollback::{self, RollbackJobCommand};
use super::commands::start::{self, StartJobCommand};
use super::commands::update_asset::{self, AssetUpdate, BulkUpdateCommand, UpdateAssetCommand};
use super::commands::upload::{self, UploadFilesCommand, UploadedFile};
use super::commands::validate::{self, ValidateJobCommand};
use super::queries::status::{self, JobStatusQuery};
use super::types::{AssetPatch, Caller};

pub fn imports_routes() -> Router<ImportState> {
    Router::new()
        .route("/", post(start_import))
        .route("/:job_id", get(import_status))
        .route("/:job_id/files", post(upload_files))
        .route("/:job_id/assets/:asset_id", patch(update_asset))
        .route("/:job_id/assets", patch(bulk_update_assets))
        .route("/:job_id/validate", post(validate_import))
        .route("/:job_id/commit", post(commit_import))
        .route("/:job_id/rollback", post(rollback_import))
}

#[tracing::instrument(skip(state, command))]
async fn start_import(
    State(state): State<ImportState>,
    caller: Caller,
    Json(command): Json<StartJobCommand>,
) -> Result<Response, AppError> {
    let job = start::handle(&state, command, &caller).await?;

    tracing::info!(job_id = %job.id, "import job created via API");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(job))).into_response())
}

#[tracing::instrument(skip(state), fields(job_id = %job_id))]
async fn import_status(
    State(state): State<ImportState>,
    _caller: Caller,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let view = status::handle(&state, JobStatusQuery { job_id }).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(view))).into_response())
}

/// Multipart upload: any number of file parts, plus an optional `mapping`
/// part carrying a JSON array of mapping rows for late metadata.
#[tracing::instrument(skip(state, multipart), fields(job_id = %job_id))]
async fn upload_files(
    State(state): State<ImportState>,
    _caller: Caller,
    Path(job_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut files = Vec::new();
    let mut mapping_rows = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart payload: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        if name.as_deref() == Some("mapping") {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("unreadable mapping part: {}", e)))?;
            mapping_rows = serde_json::from_str(&text)
                .map_err(|e| AppError::Validation(format!("invalid mapping rows: {}", e)))?;
        } else {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| AppError::Validation("file part is missing a filename".to_string()))?;
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("unreadable file part: {}", e)))?
                .to_vec();
            files.push(UploadedFile { filename, content_type, data });
        }
    }

    if files.is_empty() {
        return Err(AppError::Validation("upload contains no files".to_string()));
    }

    let outcome = upload::handle(&state, UploadFilesCommand { job_id, files, mapping_rows }).await?;

    tracing::info!(
        job_id = %job_id,
        accepted = outcome.accepted,
        rejected = outcome.rejected,
        "upload batch processed via API"
    );
    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))).into_response())
}

#[tracing::instrument(skip(state, patch), fields(job_id = %job_id, asset_id = %asset_id))]
async fn update_asset(
    State(state): State<ImportState>,
    _caller: Caller,
    Path((job_id, asset_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<AssetPatch>,
) -> Result<Response, AppError> {
    let asset = update_asset::handle(&state, UpdateAssetCommand { job_id, asset_id, patch }).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(asset))).into_response())
}

#[tracing::instrument(skip(state, updates), fields(job_id = %job_id, updates = updates.len()))]
async fn bulk_update_assets(
    State(state): State<ImportState>,
    _caller: Caller,
    Path(job_id): Path<Uuid>,
    Json(updates): Json<Vec<AssetUpdate>>,
) -> Result<Response, AppError> {
    let outcome = update_asset::handle_bulk(&state, BulkUpdateCommand { job_id, updates }).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))).into_response())
}

#[tracing::instrument(skip(state), fields(job_id = %job_id))]
async fn validate_import(
    State(state): State<ImportState>,
    _caller: Caller,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let outcome = validate::handle(&state, ValidateJobCommand { job_id }).await?;

    tracing::info!(
        job_id = %job_id,
        valid = outcome.job.success_count,
        warnings = outcome.job.warning_count,
        errors = outcome.job.error_count,
        "validation pass finished via API"
    );
    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))).into_response())
}

#[tracing::instrument(skip(state, command), fields(job_id = %job_id))]
async fn commit_import(
    State(state): State<ImportState>,
    caller: Caller,
    Path(job_id): Path<Uuid>,
    Json(mut command): Json<CommitJobCommand>,
) -> Result<Response, AppError> {
    command.job_id = job_id;

    let outcome = commit::handle(&state, command, &caller).await?;

    tracing::info!(
        job_id = %job_id,
        published = outcome.published,
        status = %outcome.job.status,
        "commit finished via API"
    );
    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))).into_response())
}

#[tracing::instrument(skip(state), fields(job_id = %job_id, caller = %caller.id))]
async fn rollback_import(
    State(state): State<ImportState>,
    caller: Caller,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let outcome = rollback::handle(&state, RollbackJobCommand { job_id }, &caller).await?;

    tracing::info!(
        job_id = %job_id,
        deleted_assets = outcome.deleted_assets,
        deleted_objects = outcome.deleted_objects,
        "job rolled back via API"
    );
    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))).into_response())
}
