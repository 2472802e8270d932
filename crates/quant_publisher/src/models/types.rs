use std::fmt;
use std::path::{Path, PathBuf};

use crate::models::error::UploadErrorCategory;

/// Directory written by the quantizer for one model/bit-width combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDirectory {
    pub name: String,
    pub path: PathBuf,
}

impl ArtifactDirectory {
    /// `meta-llama/Llama-3-8B` at 4 bits under `/out` becomes `/out/Llama-3-8B-4bit`.
    pub fn for_model(output_root: &Path, model_id: &str, bits: u8) -> Self {
        let name = artifact_name(model_id, bits);
        Self {
            path: output_root.join(&name),
            name,
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        archive_path_for(&self.path, &self.name)
    }
}

pub fn artifact_name(model_id: &str, bits: u8) -> String {
    let base = model_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(model_id);
    format!("{}-{}bit", base, bits)
}

/// Sibling of `dir` named `<name>.tar.gz`.
pub fn archive_path_for(dir: &Path, name: &str) -> PathBuf {
    dir.with_file_name(format!("{}.tar.gz", name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Archiving,
    UploadDisabled,
    Uploading,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Uploading is switched off.
    Disabled,
    /// The `local` target: the archive stays where it was written.
    KeptLocal,
    UnsupportedTarget(String),
    Uploaded { url: String, archive_removed: bool },
    UploadFailed {
        category: UploadErrorCategory,
        message: String,
    },
}

impl PublishOutcome {
    pub fn archive_retained(&self) -> bool {
        !matches!(
            self,
            PublishOutcome::Uploaded {
                archive_removed: true,
                ..
            }
        )
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishOutcome::Disabled => write!(f, "upload disabled"),
            PublishOutcome::KeptLocal => write!(f, "kept on local disk"),
            PublishOutcome::UnsupportedTarget(name) => write!(f, "unsupported upload target '{}'", name),
            PublishOutcome::Uploaded { url, .. } => write!(f, "uploaded to {}", url),
            PublishOutcome::UploadFailed { category, message } => {
                write!(f, "upload failed ({}): {}", category, message)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishReport {
    pub archive: Archive,
    pub states: Vec<PipelineState>,
    pub outcome: PublishOutcome,
}

impl PublishReport {
    pub fn final_state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }
}
