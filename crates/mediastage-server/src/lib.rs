//! Mediastage Server Library
//!
//! HTTP server for the bulk media ingestion pipeline of a regional
//! tourism CMS.
//!
//! # Overview
//!
//! A batch of image files moves through a staged pipeline:
//!
//! - **Start**: create an import job with settings and an optional
//!   metadata mapping table
//! - **Upload**: stage files with per-file policy enforcement and
//!   continue-on-error semantics
//! - **Validate**: recompute every asset's diagnostics and the job counts
//!   from scratch (idempotent)
//! - **Review**: patch asset metadata and entity links, re-validate
//! - **Commit**: promote eligible assets to the public catalog, partial
//!   success allowed
//! - **Rollback**: admin-only full-batch undo of objects and records
//!
//! # Architecture
//!
//! Features follow a CQRS layout: each command is a module with its own
//! typed error, and queries are read-only. The catalog (PostgreSQL via
//! SQLx) and the object store (S3-compatible) sit behind traits so the
//! pipeline runs against in-memory backends in tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod models;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
