//! PostgreSQL catalog backend
//!
//! Row structs decode via `FromRow` with JSONB columns for the structured
//! fields; enum-like columns are stored as text and parsed back through the
//! domain model, surfacing `DbError::Corrupt` on anything unrecognized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Catalog, DbError, DbResult};
use crate::models::{
    AssetMetadata, Diagnostic, EntityLink, ImportErrorKind, ImportErrorRecord, ImportJob,
    ImportSettings, JobStatus, MappingRow, PublishStatus, StagedAsset, ValidationStatus,
};

/// Production [`Catalog`] over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    total_files: i32,
    processed_files: i32,
    success_count: i32,
    warning_count: i32,
    error_count: i32,
    settings: Json<ImportSettings>,
    csv_mapping: Json<Vec<MappingRow>>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    committed_at: Option<DateTime<Utc>>,
    committed_by: Option<Uuid>,
    rolled_back_at: Option<DateTime<Utc>>,
    rolled_back_by: Option<Uuid>,
}

impl TryFrom<JobRow> for ImportJob {
    type Error = DbError;

    fn try_from(row: JobRow) -> DbResult<Self> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| DbError::Corrupt(format!("unknown job status '{}'", row.status)))?;
        Ok(ImportJob {
            id: row.id,
            status,
            total_files: row.total_files,
            processed_files: row.processed_files,
            success_count: row.success_count,
            warning_count: row.warning_count,
            error_count: row.error_count,
            settings: row.settings.0,
            csv_mapping: row.csv_mapping.0,
            created_by: row.created_by,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            committed_at: row.committed_at,
            committed_by: row.committed_by,
            rolled_back_at: row.rolled_back_at,
            rolled_back_by: row.rolled_back_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    job_id: Uuid,
    original_filename: String,
    staging_path: String,
    public_path: Option<String>,
    thumbnail_path: Option<String>,
    mime_type: String,
    size_bytes: i64,
    fingerprint: String,
    perceptual_hash: Option<String>,
    metadata: Json<AssetMetadata>,
    entity_type: String,
    entity_ref: Option<String>,
    validation_status: String,
    validation_messages: Json<Vec<Diagnostic>>,
    publish_status: String,
    is_published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for StagedAsset {
    type Error = DbError;

    fn try_from(row: AssetRow) -> DbResult<Self> {
        let validation_status = ValidationStatus::parse(&row.validation_status).ok_or_else(|| {
            DbError::Corrupt(format!("unknown validation status '{}'", row.validation_status))
        })?;
        let publish_status = PublishStatus::parse(&row.publish_status).ok_or_else(|| {
            DbError::Corrupt(format!("unknown publish status '{}'", row.publish_status))
        })?;
        let entity_link = EntityLink::from_parts(&row.entity_type, row.entity_ref.as_deref())
            .map_err(DbError::Corrupt)?;

        Ok(StagedAsset {
            id: row.id,
            job_id: row.job_id,
            original_filename: row.original_filename,
            staging_path: row.staging_path,
            public_path: row.public_path,
            thumbnail_path: row.thumbnail_path,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            fingerprint: row.fingerprint,
            perceptual_hash: row.perceptual_hash,
            metadata: row.metadata.0,
            entity_link,
            validation_status,
            validation_messages: row.validation_messages.0,
            publish_status,
            is_published: row.is_published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ErrorRow {
    id: Uuid,
    job_id: Uuid,
    asset_id: Option<Uuid>,
    error_type: String,
    code: Option<String>,
    message: String,
    details: Json<serde_json::Value>,
    is_recoverable: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ErrorRow> for ImportErrorRecord {
    type Error = DbError;

    fn try_from(row: ErrorRow) -> DbResult<Self> {
        let error_type = ImportErrorKind::parse(&row.error_type)
            .ok_or_else(|| DbError::Corrupt(format!("unknown error type '{}'", row.error_type)))?;
        Ok(ImportErrorRecord {
            id: row.id,
            job_id: row.job_id,
            asset_id: row.asset_id,
            error_type,
            code: row.code,
            message: row.message,
            details: row.details.0,
            is_recoverable: row.is_recoverable,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn insert_job(&self, job: &ImportJob) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO import_jobs (
                id, status, total_files, processed_files,
                success_count, warning_count, error_count,
                settings, csv_mapping, created_by, created_at,
                started_at, completed_at, committed_at, committed_by,
                rolled_back_at, rolled_back_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_files)
        .bind(job.processed_files)
        .bind(job.success_count)
        .bind(job.warning_count)
        .bind(job.error_count)
        .bind(Json(&job.settings))
        .bind(Json(&job.csv_mapping))
        .bind(job.created_by)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.committed_at)
        .bind(job.committed_by)
        .bind(job.rolled_back_at)
        .bind(job.rolled_back_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> DbResult<Option<ImportJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM import_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ImportJob::try_from).transpose()
    }

    async fn update_job(&self, job: &ImportJob) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs SET
                status = $2,
                total_files = $3,
                processed_files = $4,
                success_count = $5,
                warning_count = $6,
                error_count = $7,
                settings = $8,
                csv_mapping = $9,
                started_at = $10,
                completed_at = $11,
                committed_at = $12,
                committed_by = $13,
                rolled_back_at = $14,
                rolled_back_by = $15
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_files)
        .bind(job.processed_files)
        .bind(job.success_count)
        .bind(job.warning_count)
        .bind(job.error_count)
        .bind(Json(&job.settings))
        .bind(Json(&job.csv_mapping))
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.committed_at)
        .bind(job.committed_by)
        .bind(job.rolled_back_at)
        .bind(job.rolled_back_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("import job", job.id));
        }
        Ok(())
    }

    async fn insert_asset(&self, asset: &StagedAsset) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO staged_assets (
                id, job_id, original_filename, staging_path, public_path,
                thumbnail_path, mime_type, size_bytes, fingerprint,
                perceptual_hash, metadata, entity_type, entity_ref,
                validation_status, validation_messages, publish_status,
                is_published, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(asset.id)
        .bind(asset.job_id)
        .bind(&asset.original_filename)
        .bind(&asset.staging_path)
        .bind(&asset.public_path)
        .bind(&asset.thumbnail_path)
        .bind(&asset.mime_type)
        .bind(asset.size_bytes)
        .bind(&asset.fingerprint)
        .bind(&asset.perceptual_hash)
        .bind(Json(&asset.metadata))
        .bind(asset.entity_link.kind())
        .bind(asset.entity_link.reference().map(|r| r.to_string()))
        .bind(asset.validation_status.as_str())
        .bind(Json(&asset.validation_messages))
        .bind(asset.publish_status.as_str())
        .bind(asset.is_published)
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_asset(&self, asset_id: Uuid) -> DbResult<Option<StagedAsset>> {
        let row = sqlx::query_as::<_, AssetRow>("SELECT * FROM staged_assets WHERE id = $1")
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StagedAsset::try_from).transpose()
    }

    async fn update_asset(&self, asset: &StagedAsset) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE staged_assets SET
                public_path = $2,
                thumbnail_path = $3,
                metadata = $4,
                entity_type = $5,
                entity_ref = $6,
                validation_status = $7,
                validation_messages = $8,
                publish_status = $9,
                is_published = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(asset.id)
        .bind(&asset.public_path)
        .bind(&asset.thumbnail_path)
        .bind(Json(&asset.metadata))
        .bind(asset.entity_link.kind())
        .bind(asset.entity_link.reference().map(|r| r.to_string()))
        .bind(asset.validation_status.as_str())
        .bind(Json(&asset.validation_messages))
        .bind(asset.publish_status.as_str())
        .bind(asset.is_published)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("staged asset", asset.id));
        }
        Ok(())
    }

    async fn list_assets(&self, job_id: Uuid) -> DbResult<Vec<StagedAsset>> {
        let rows = sqlx::query_as::<_, AssetRow>(
            "SELECT * FROM staged_assets WHERE job_id = $1 ORDER BY created_at, id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StagedAsset::try_from).collect()
    }

    async fn count_assets(&self, job_id: Uuid) -> DbResult<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM staged_assets WHERE job_id = $1")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn insert_error(&self, error: &ImportErrorRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO import_errors (
                id, job_id, asset_id, error_type, code, message, details,
                is_recoverable, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(error.id)
        .bind(error.job_id)
        .bind(error.asset_id)
        .bind(error.error_type.as_str())
        .bind(&error.code)
        .bind(&error.message)
        .bind(Json(&error.details))
        .bind(error.is_recoverable)
        .bind(error.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_errors(&self, job_id: Uuid) -> DbResult<Vec<ImportErrorRecord>> {
        let rows = sqlx::query_as::<_, ErrorRow>(
            "SELECT * FROM import_errors WHERE job_id = $1 ORDER BY created_at, id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ImportErrorRecord::try_from).collect()
    }

    async fn link_entity(&self, asset_id: Uuid, link: &EntityLink) -> DbResult<()> {
        let Some(reference) = link.reference() else {
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO entity_media (entity_type, entity_ref, asset_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (entity_type, entity_ref, asset_id) DO NOTHING
            "#,
        )
        .bind(link.kind())
        .bind(reference.to_string())
        .bind(asset_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_job_children(&self, job_id: Uuid) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entity_media WHERE asset_id IN (SELECT id FROM staged_assets WHERE job_id = $1)")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM import_errors WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM staged_assets WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }
}
