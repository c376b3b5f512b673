//! Start import job command

use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

use crate::db::DbError;
use crate::error::AppError;
use crate::features::imports::types::Caller;
use crate::features::ImportState;
use crate::models::{ImportJob, ImportSettings, MappingRow};

/// Command to create a new import job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartJobCommand {
    #[serde(default)]
    pub settings: ImportSettings,

    /// Optional metadata mapping table, one row per expected filename.
    #[serde(default)]
    pub mapping: Vec<MappingRow>,
}

#[derive(Error, Debug)]
pub enum StartJobError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<StartJobError> for AppError {
    fn from(err: StartJobError) -> Self {
        match err {
            StartJobError::Config(msg) => AppError::Config(msg),
            StartJobError::Db(e) => e.into(),
        }
    }
}

impl StartJobCommand {
    /// Reject malformed settings or mapping tables before any job exists.
    fn validate(&self) -> Result<(), StartJobError> {
        let mut seen = HashSet::new();
        for row in &self.mapping {
            row.validate().map_err(StartJobError::Config)?;
            if !seen.insert(row.filename.to_ascii_lowercase()) {
                return Err(StartJobError::Config(format!(
                    "duplicate mapping row for '{}'",
                    row.filename
                )));
            }
        }
        Ok(())
    }
}

#[tracing::instrument(skip(state, command), fields(mapping_rows = command.mapping.len(), caller = %caller.id))]
pub async fn handle(
    state: &ImportState,
    command: StartJobCommand,
    caller: &Caller,
) -> Result<ImportJob, StartJobError> {
    command.validate()?;

    let job = ImportJob::new(caller.id, command.settings, command.mapping);
    state.catalog.insert_job(&job).await?;

    info!(job_id = %job.id, "import job created");
    Ok(job)
}
