//! Shared types and utilities for Mediastage components
//!
//! This crate provides the pieces that both the ingestion server and any
//! auxiliary tooling need:
//!
//! - **Error types**: the common `MediastageError` taxonomy
//! - **Logging**: centralized `tracing` initialization with console/file
//!   targets and text/JSON formats
//! - **Fingerprinting**: content-hash computation used for duplicate
//!   detection within an import batch

pub mod error;
pub mod fingerprint;
pub mod logging;

pub use error::{MediastageError, Result};
pub use fingerprint::content_fingerprint;
