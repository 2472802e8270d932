use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Quantization failed: {0}")]
    Quantize(#[from] QuantizeError),

    #[error("Archive creation failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum QuantizeError {
    #[error("Quantizer command is empty")]
    EmptyCommand,

    #[error("Failed to launch quantizer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Quantizer exited with {0}")]
    CommandFailed(String),

    #[error("Quantizer finished but produced no artifact at {0}")]
    MissingOutput(PathBuf),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Source is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Source path has no usable directory name: {0}")]
    InvalidSourceName(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload target is not configured: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("Failed to read archive: {0}")]
    ArchiveRead(#[from] std::io::Error),

    #[error("Malformed upload response ({reason}): {body}")]
    Protocol { reason: String, body: String },
}

/// Coarse failure class of an upload, logged as the `category` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorCategory {
    Configuration,
    Transport,
    Protocol,
}

impl UploadErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadErrorCategory::Configuration => "configuration",
            UploadErrorCategory::Transport => "transport",
            UploadErrorCategory::Protocol => "protocol",
        }
    }
}

impl std::fmt::Display for UploadErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UploadError {
    pub fn category(&self) -> UploadErrorCategory {
        match self {
            UploadError::Configuration(_) => UploadErrorCategory::Configuration,
            UploadError::NetworkError(_)
            | UploadError::HttpError { .. }
            | UploadError::ArchiveRead(_) => UploadErrorCategory::Transport,
            UploadError::Protocol { .. } => UploadErrorCategory::Protocol,
        }
    }
}
