//! API layer shared pieces

pub mod response;
