//! Bulk media import pipeline
//!
//! The staged ingestion flow for an import batch:
//!
//! 1. `start` creates a job with operator settings and an optional
//!    metadata mapping table.
//! 2. `upload` ingests files into the staging area with per-file
//!    continue-on-error semantics.
//! 3. `validate` runs the content rule set, recomputing every asset's
//!    status and the job counts from scratch.
//! 4. The operator reviews, patching assets via `update-asset` /
//!    `bulk-update` and re-validating as needed.
//! 5. `commit` promotes eligible assets into the public catalog, or
//!    `rollback` (admin only) erases the batch entirely.

pub mod commands;
pub mod coordinator;
pub mod queries;
pub mod routes;
pub mod types;

pub use routes::imports_routes;
