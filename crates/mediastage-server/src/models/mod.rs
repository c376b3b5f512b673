//! Domain model for the bulk media ingestion pipeline
//!
//! Three durable record types back the pipeline: [`ImportJob`] (one batch
//! and its lifecycle state), [`StagedAsset`] (one file within a batch), and
//! [`ImportErrorRecord`] (a processing failure tied to a job and optionally
//! an asset). Job-level counts are always derived from the current asset
//! set via [`ImportJob::recompute_counts`]; nothing increments them ad hoc.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an import job.
///
/// `queued → uploading → validating → ready → committing → {committed |
/// failed}`, with `rolled_back` reachable from `ready`, `committed`, or
/// `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Uploading,
    Validating,
    Ready,
    Committing,
    Committed,
    Failed,
    RolledBack,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Uploading => "uploading",
            JobStatus::Validating => "validating",
            JobStatus::Ready => "ready",
            JobStatus::Committing => "committing",
            JobStatus::Committed => "committed",
            JobStatus::Failed => "failed",
            JobStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "uploading" => Some(JobStatus::Uploading),
            "validating" => Some(JobStatus::Validating),
            "ready" => Some(JobStatus::Ready),
            "committing" => Some(JobStatus::Committing),
            "committed" => Some(JobStatus::Committed),
            "failed" => Some(JobStatus::Failed),
            "rolled_back" => Some(JobStatus::RolledBack),
            _ => None,
        }
    }

    /// Terminal states permit no further mutation except rollback
    /// (and rollback itself is terminal).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Committed | JobStatus::Failed | JobStatus::RolledBack
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the validation rule set for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Valid,
    Warning,
    Error,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Warning => "warning",
            ValidationStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(ValidationStatus::Valid),
            "warning" => Some(ValidationStatus::Warning),
            "error" => Some(ValidationStatus::Error),
            _ => None,
        }
    }
}

/// Whether an asset is still staged or has been promoted to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    #[default]
    Staged,
    Published,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Staged => "staged",
            PublishStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "staged" => Some(PublishStatus::Staged),
            "published" => Some(PublishStatus::Published),
            _ => None,
        }
    }
}

/// Severity of a single validation diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Warning,
    Error,
}

/// One validation finding on an asset.
///
/// Diagnostics record content-policy violations. They are distinct from
/// [`ImportErrorRecord`], which records processing failures (upload or
/// commit errors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Geographic coordinates attached to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Reference to a catalog entity, either by stable id or by slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Id(Uuid),
    Slug(String),
}

impl EntityRef {
    pub fn parse(s: &str) -> Self {
        match Uuid::parse_str(s) {
            Ok(id) => EntityRef::Id(id),
            Err(_) => EntityRef::Slug(s.to_string()),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "{}", id),
            EntityRef::Slug(slug) => f.write_str(slug),
        }
    }
}

/// Linkage from an asset to a catalog entity.
///
/// A closed set of entity kinds rather than a free-form table name; each
/// variant carries its own reference. `Unlinked` is the sentinel for assets
/// that are importable but not yet attached to anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "entity_type", content = "entity_ref", rename_all = "snake_case")]
pub enum EntityLink {
    #[default]
    Unlinked,
    Place(EntityRef),
    Listing(EntityRef),
    Event(EntityRef),
}

impl EntityLink {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityLink::Unlinked => "unlinked",
            EntityLink::Place(_) => "place",
            EntityLink::Listing(_) => "listing",
            EntityLink::Event(_) => "event",
        }
    }

    pub fn reference(&self) -> Option<&EntityRef> {
        match self {
            EntityLink::Unlinked => None,
            EntityLink::Place(r) | EntityLink::Listing(r) | EntityLink::Event(r) => Some(r),
        }
    }

    pub fn is_unlinked(&self) -> bool {
        matches!(self, EntityLink::Unlinked)
    }

    /// Reconstruct a link from its persisted `(entity_type, entity_ref)`
    /// column pair.
    pub fn from_parts(kind: &str, reference: Option<&str>) -> Result<Self, String> {
        match (kind, reference) {
            ("unlinked", _) => Ok(EntityLink::Unlinked),
            ("place", Some(r)) => Ok(EntityLink::Place(EntityRef::parse(r))),
            ("listing", Some(r)) => Ok(EntityLink::Listing(EntityRef::parse(r))),
            ("event", Some(r)) => Ok(EntityLink::Event(EntityRef::parse(r))),
            ("place" | "listing" | "event", None) => {
                Err(format!("entity_type '{}' requires an entity reference", kind))
            },
            (other, _) => Err(format!("unknown entity_type '{}'", other)),
        }
    }
}

/// How fingerprint duplicates within a job are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Warn,
    Error,
}

/// Operator-supplied options for one import batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImportSettings {
    /// Default publish flag applied when a mapping row does not override it.
    #[serde(default)]
    pub publish_by_default: bool,

    /// Whether in-job fingerprint duplicates validate as warnings or errors.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

/// One row of the optional metadata mapping table, matched to an uploaded
/// file by case-insensitive filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
    pub filename: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_ref: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub credit: Option<String>,
    /// Semicolon-delimited tag list.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub publish: Option<bool>,
}

impl MappingRow {
    /// Structural validation, applied before a job is created. Content
    /// checks (coordinate ranges etc.) belong to the validation engine.
    pub fn validate(&self) -> Result<(), String> {
        if self.filename.trim().is_empty() {
            return Err("mapping row filename cannot be empty".to_string());
        }
        if let Some(kind) = &self.entity_type {
            if !matches!(kind.as_str(), "place" | "listing" | "event" | "unlinked") {
                return Err(format!(
                    "mapping row '{}': unknown entity_type '{}'",
                    self.filename, kind
                ));
            }
            if kind != "unlinked" && self.entity_ref.as_deref().unwrap_or("").trim().is_empty() {
                return Err(format!(
                    "mapping row '{}': entity_type '{}' requires entity_ref",
                    self.filename, kind
                ));
            }
        }
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err(format!(
                "mapping row '{}': latitude and longitude must be supplied together",
                self.filename
            ));
        }
        Ok(())
    }

    pub fn parsed_tags(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn geo(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        }
    }

    pub fn entity_link(&self) -> Result<EntityLink, String> {
        match &self.entity_type {
            None => Ok(EntityLink::Unlinked),
            Some(kind) => EntityLink::from_parts(kind, self.entity_ref.as_deref()),
        }
    }
}

/// Descriptive metadata of a staged asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AssetMetadata {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub credit: Option<String>,
    pub alt_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub geo: Option<GeoPoint>,
    pub exif: Option<serde_json::Value>,
}

/// One bulk-ingestion batch and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub total_files: i32,
    pub processed_files: i32,
    pub success_count: i32,
    pub warning_count: i32,
    pub error_count: i32,
    pub settings: ImportSettings,
    pub csv_mapping: Vec<MappingRow>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
    pub committed_by: Option<Uuid>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rolled_back_by: Option<Uuid>,
}

impl ImportJob {
    pub fn new(created_by: Uuid, settings: ImportSettings, csv_mapping: Vec<MappingRow>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            total_files: 0,
            processed_files: 0,
            success_count: 0,
            warning_count: 0,
            error_count: 0,
            settings,
            csv_mapping,
            created_by,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            committed_at: None,
            committed_by: None,
            rolled_back_at: None,
            rolled_back_by: None,
        }
    }

    /// Recompute the per-status counts from the current asset set.
    ///
    /// This is the only sanctioned way to write `success_count`,
    /// `warning_count`, and `error_count`.
    pub fn recompute_counts(&mut self, assets: &[StagedAsset]) {
        self.success_count = 0;
        self.warning_count = 0;
        self.error_count = 0;
        for asset in assets {
            match asset.validation_status {
                ValidationStatus::Valid => self.success_count += 1,
                ValidationStatus::Warning => self.warning_count += 1,
                ValidationStatus::Error => self.error_count += 1,
            }
        }
    }

    /// Case-insensitive mapping lookup for an uploaded filename.
    pub fn mapping_for(&self, filename: &str) -> Option<&MappingRow> {
        self.csv_mapping
            .iter()
            .find(|row| row.filename.eq_ignore_ascii_case(filename))
    }
}

/// One file's record within a job, from upload through publish or deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedAsset {
    pub id: Uuid,
    pub job_id: Uuid,
    pub original_filename: String,
    pub staging_path: String,
    pub public_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub mime_type: String,
    pub size_bytes: i64,
    pub fingerprint: String,
    pub perceptual_hash: Option<String>,
    pub metadata: AssetMetadata,
    pub entity_link: EntityLink,
    pub validation_status: ValidationStatus,
    pub validation_messages: Vec<Diagnostic>,
    pub publish_status: PublishStatus,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StagedAsset {
    pub fn new(
        job_id: Uuid,
        original_filename: impl Into<String>,
        staging_path: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: i64,
        fingerprint: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            original_filename: original_filename.into(),
            staging_path: staging_path.into(),
            public_path: None,
            thumbnail_path: None,
            mime_type: mime_type.into(),
            size_bytes,
            fingerprint: fingerprint.into(),
            perceptual_hash: None,
            metadata: AssetMetadata::default(),
            entity_link: EntityLink::Unlinked,
            validation_status: ValidationStatus::Valid,
            validation_messages: Vec::new(),
            publish_status: PublishStatus::Staged,
            is_published: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Classification of a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorKind {
    /// File rejected by the type/size/count policy before any I/O.
    Policy,
    /// Storage or record failure while ingesting a file.
    Upload,
    /// Failure while promoting an asset during commit.
    Commit,
}

impl ImportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportErrorKind::Policy => "policy",
            ImportErrorKind::Upload => "upload",
            ImportErrorKind::Commit => "commit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "policy" => Some(ImportErrorKind::Policy),
            "upload" => Some(ImportErrorKind::Upload),
            "commit" => Some(ImportErrorKind::Commit),
            _ => None,
        }
    }
}

/// A durable processing-failure record tied to a job and, optionally, to a
/// specific asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportErrorRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub asset_id: Option<Uuid>,
    pub error_type: ImportErrorKind,
    pub code: Option<String>,
    pub message: String,
    pub details: serde_json::Value,
    pub is_recoverable: bool,
    pub created_at: DateTime<Utc>,
}

impl ImportErrorRecord {
    pub fn new(
        job_id: Uuid,
        asset_id: Option<Uuid>,
        error_type: ImportErrorKind,
        message: impl Into<String>,
        is_recoverable: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            asset_id,
            error_type,
            code: None,
            message: message.into(),
            details: serde_json::Value::Null,
            is_recoverable,
            created_at: Utc::now(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
