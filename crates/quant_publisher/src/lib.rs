//! Quant Publisher Library
//!
//! Drives an external model quantizer, packs the resulting artifact directory
//! into a tar.gz and publishes it to a remote file host.

pub mod config;
pub mod models;

// Services
pub mod services;

// Upload destinations
pub mod stores;

// Utilities
pub mod utils;

pub use config::Config;
pub use models::error::{ArchiveError, PipelineError, UploadError};
pub use models::types::{Archive, ArtifactDirectory, PublishOutcome, PublishReport};
pub use services::artifact_compressor::ArtifactCompressor;
pub use services::pipeline::PublishPipeline;
pub use stores::artifact_trait::ArchiveUploader;
pub use stores::file_host::{upload_archive, FileHostUploader};
