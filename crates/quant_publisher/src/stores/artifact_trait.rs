//! Trait for remote archive destinations

use crate::models::error::UploadError;
use std::path::Path;

#[async_trait::async_trait]
pub trait ArchiveUploader: Send + Sync {
    /// Short target name used in logs
    fn name(&self) -> &str;

    /// Where uploads are sent, for log context
    fn destination(&self) -> String;

    /// Send the archive once and return the locator the remote assigned to it
    async fn upload(&self, archive_path: &Path) -> Result<String, UploadError>;
}
