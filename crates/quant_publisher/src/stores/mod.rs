//! Upload destinations

pub mod artifact_trait;
pub mod file_host;
