//! Post-processing pipeline: archive, upload, clean up
//!
//! Only archive creation can fail the pipeline. Upload problems are logged and
//! reported in the outcome, and the local archive is removed only after the
//! host has returned a locator for it.

use crate::config::{UploadConfig, UploadTarget};
use crate::models::error::{ArchiveError, UploadErrorCategory};
use crate::models::types::{Archive, PipelineState, PublishOutcome, PublishReport};
use crate::services::artifact_compressor::ArtifactCompressor;
use crate::stores::artifact_trait::ArchiveUploader;
use crate::stores::file_host::FileHostUploader;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

enum UploadPlan {
    Disabled,
    Local,
    Unsupported(String),
    Remote(Box<dyn ArchiveUploader>),
    Unavailable {
        target: String,
        category: UploadErrorCategory,
        message: String,
    },
}

pub struct PublishPipeline {
    plan: UploadPlan,
}

impl PublishPipeline {
    pub fn from_config(config: &UploadConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let plan = match &config.target {
            UploadTarget::Local => UploadPlan::Local,
            UploadTarget::Unsupported(name) => UploadPlan::Unsupported(name.clone()),
            UploadTarget::Zipline(host) => match FileHostUploader::new(host.clone()) {
                Ok(uploader) => UploadPlan::Remote(Box::new(uploader)),
                Err(e) => UploadPlan::Unavailable {
                    target: config.target.name().to_string(),
                    category: e.category(),
                    message: e.to_string(),
                },
            },
        };

        Self { plan }
    }

    pub fn disabled() -> Self {
        Self {
            plan: UploadPlan::Disabled,
        }
    }

    /// Upload-enabled pipeline sending archives through `uploader`.
    pub fn with_uploader(uploader: Box<dyn ArchiveUploader>) -> Self {
        Self {
            plan: UploadPlan::Remote(uploader),
        }
    }

    pub async fn run(&self, artifact_dir: &Path) -> Result<PublishReport, ArchiveError> {
        let mut states = vec![PipelineState::Idle];

        transition(&mut states, PipelineState::Archiving);
        let archive = ArtifactCompressor::compress(artifact_dir).await?;

        let outcome = match &self.plan {
            UploadPlan::Disabled => {
                transition(&mut states, PipelineState::UploadDisabled);
                info!(archive = %archive.path.display(), "Upload disabled, archive kept");
                PublishOutcome::Disabled
            }
            UploadPlan::Local => {
                debug!(upload_target = "local", "Upload skipped");
                info!(archive = %archive.path.display(), "Upload target is local, archive kept");
                PublishOutcome::KeptLocal
            }
            UploadPlan::Unsupported(name) => {
                debug!(upload_target = %name, "Upload skipped");
                warn!(
                    upload_target = %name,
                    archive = %archive.path.display(),
                    "Unsupported upload target, archive kept"
                );
                PublishOutcome::UnsupportedTarget(name.clone())
            }
            UploadPlan::Unavailable {
                target,
                category,
                message,
            } => {
                transition(&mut states, PipelineState::Uploading);
                warn!(
                    upload_target = %target,
                    category = %category,
                    error = %message,
                    archive = %archive.path.display(),
                    "Upload client unavailable, archive kept for manual retry"
                );
                PublishOutcome::UploadFailed {
                    category: *category,
                    message: message.clone(),
                }
            }
            UploadPlan::Remote(uploader) => {
                transition(&mut states, PipelineState::Uploading);
                Self::upload(uploader.as_ref(), &archive).await
            }
        };

        transition(&mut states, PipelineState::Done);

        Ok(PublishReport {
            archive,
            states,
            outcome,
        })
    }

    async fn upload(uploader: &dyn ArchiveUploader, archive: &Archive) -> PublishOutcome {
        match uploader.upload(&archive.path).await {
            Ok(url) => {
                info!(url = %url, upload_target = uploader.name(), "Archive uploaded");
                let archive_removed = match fs::remove_file(&archive.path).await {
                    Ok(()) => {
                        info!(archive = %archive.path.display(), "Removed local archive");
                        true
                    }
                    Err(e) => {
                        warn!(
                            archive = %archive.path.display(),
                            error = %e,
                            "Failed to remove local archive after upload"
                        );
                        false
                    }
                };
                PublishOutcome::Uploaded { url, archive_removed }
            }
            Err(e) => {
                warn!(
                    upload_target = uploader.name(),
                    destination = %uploader.destination(),
                    category = %e.category(),
                    error = %e,
                    archive = %archive.path.display(),
                    "Upload failed, archive kept for manual retry"
                );
                PublishOutcome::UploadFailed {
                    category: e.category(),
                    message: e.to_string(),
                }
            }
        }
    }
}

fn transition(states: &mut Vec<PipelineState>, next: PipelineState) {
    debug!(from = ?states.last(), to = ?next, "Pipeline state change");
    states.push(next);
}
