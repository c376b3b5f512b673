//! Import pipeline queries

pub mod status;
