//! Feature modules implementing the Mediastage API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes. The only feature in this service is `imports`: the staged bulk
//! media ingestion pipeline (upload → validate → review → commit or
//! rollback).

pub mod imports;

use axum::Router;
use std::sync::Arc;

use crate::config::IngestPolicy;
use crate::db::Catalog;
use crate::features::imports::coordinator::JobCoordinator;
use crate::storage::{KeyScheme, ObjectStore};

/// Shared state for all feature routes.
///
/// The catalog and object store are trait objects so the pipeline runs
/// identically over PostgreSQL + S3 in production and over the in-memory
/// backends in tests.
#[derive(Clone)]
pub struct ImportState {
    pub catalog: Arc<dyn Catalog>,
    pub store: Arc<dyn ObjectStore>,
    pub keys: Arc<KeyScheme>,
    pub policy: Arc<IngestPolicy>,
    pub coordinator: Arc<JobCoordinator>,
}

impl ImportState {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ObjectStore>,
        keys: KeyScheme,
        policy: IngestPolicy,
    ) -> Self {
        Self {
            catalog,
            store,
            keys: Arc::new(keys),
            policy: Arc::new(policy),
            coordinator: Arc::new(JobCoordinator::new()),
        }
    }
}

/// Creates the main API router with all feature routes mounted.
pub fn router(state: ImportState) -> Router<()> {
    Router::new().nest("/imports", imports::imports_routes().with_state(state))
}
