//! Artifact compression service
//! Packs a quantized artifact directory into a single tar.gz next to it

use crate::models::error::ArchiveError;
use crate::models::types::{archive_path_for, Archive};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tokio::fs;
use tracing::{info, warn};

/// What ends up in the archive for one path under the source directory.
///
/// Symlinks are resolved while walking, so the archive carries the linked
/// content. Only links that cannot be followed (dangling, or pointing back at
/// a directory being walked) are stored as links.
#[derive(Debug)]
enum EntryKind {
    Dir,
    File,
    Link(PathBuf),
}

#[derive(Debug)]
struct ArchiveEntry {
    path: PathBuf,
    kind: EntryKind,
}

pub struct ArtifactCompressor;

impl ArtifactCompressor {
    /// Compress `source` into `<parent>/<basename>.tar.gz`.
    ///
    /// Entries are rooted at the directory's base name and appended in sorted
    /// order. The file is synced and closed before this returns. A file already
    /// at the target path is replaced. On failure a partially written archive
    /// is left behind.
    pub async fn compress(source: &Path) -> Result<Archive, ArchiveError> {
        let metadata = match fs::metadata(source).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::SourceNotFound(source.to_path_buf()));
            }
            Err(e) => return Err(ArchiveError::IoError(e)),
        };
        if !metadata.is_dir() {
            return Err(ArchiveError::NotADirectory(source.to_path_buf()));
        }

        // `.` and `..` style paths carry no base name until resolved
        let source = match source.file_name() {
            Some(_) => source.to_path_buf(),
            None => fs::canonicalize(source).await?,
        };

        let root_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ArchiveError::InvalidSourceName(source.clone()))?
            .to_string();

        let output_path = archive_path_for(&source, &root_name);
        if fs::try_exists(&output_path).await.unwrap_or(false) {
            warn!(path = %output_path.display(), "Overwriting existing archive");
        }

        let mut entries = Vec::new();
        let mut ancestors = vec![fs::canonicalize(&source).await?];
        Self::collect_entries(&source, &mut ancestors, &mut entries).await?;

        info!(
            source = %source.display(),
            entries = entries.len(),
            "Compressing artifact directory"
        );

        let target = output_path.clone();
        tokio::task::spawn_blocking(move || Self::create_tar_gz(&source, &root_name, &entries, &target))
            .await
            .map_err(|e| ArchiveError::IoError(std::io::Error::other(format!("Task join error: {}", e))))??;

        let size = fs::metadata(&output_path).await?.len();
        info!(path = %output_path.display(), size = size, "Created archive");

        Ok(Archive {
            path: output_path,
            size,
        })
    }

    /// Depth-first walk; each directory is listed before its children and
    /// siblings are sorted by name. `ancestors` holds the resolved paths of
    /// the directories currently being walked.
    async fn collect_entries(
        current: &Path,
        ancestors: &mut Vec<PathBuf>,
        entries: &mut Vec<ArchiveEntry>,
    ) -> Result<(), ArchiveError> {
        let mut dir = fs::read_dir(current).await?;
        let mut children = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            children.push(entry.path());
        }
        children.sort();

        for child in children {
            let link_metadata = fs::symlink_metadata(&child).await?;
            let metadata = if link_metadata.file_type().is_symlink() {
                match fs::metadata(&child).await {
                    Ok(metadata) => metadata,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        warn!(path = %child.display(), "Dangling symlink, stored as a link");
                        let target = fs::read_link(&child).await?;
                        entries.push(ArchiveEntry {
                            path: child,
                            kind: EntryKind::Link(target),
                        });
                        continue;
                    }
                    Err(e) => return Err(ArchiveError::IoError(e)),
                }
            } else {
                link_metadata
            };

            if !metadata.is_dir() {
                entries.push(ArchiveEntry {
                    path: child,
                    kind: EntryKind::File,
                });
                continue;
            }

            let resolved = fs::canonicalize(&child).await?;
            if ancestors.contains(&resolved) {
                warn!(path = %child.display(), "Symlink loops back into the archive, stored as a link");
                let target = fs::read_link(&child).await?;
                entries.push(ArchiveEntry {
                    path: child,
                    kind: EntryKind::Link(target),
                });
                continue;
            }

            entries.push(ArchiveEntry {
                path: child.clone(),
                kind: EntryKind::Dir,
            });
            ancestors.push(resolved);
            Box::pin(Self::collect_entries(&child, ancestors, entries)).await?;
            ancestors.pop();
        }

        Ok(())
    }

    fn create_tar_gz(
        source: &Path,
        root_name: &str,
        entries: &[ArchiveEntry],
        output_path: &Path,
    ) -> Result<(), ArchiveError> {
        let file = File::create(output_path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = Builder::new(encoder);

        tar.append_dir(root_name, source)?;

        for entry in entries {
            let relative = entry.path.strip_prefix(source).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("Path error: {}", e))
            })?;
            let name = Path::new(root_name).join(relative);

            match &entry.kind {
                EntryKind::Dir => tar.append_dir(&name, &entry.path)?,
                EntryKind::File => tar.append_path_with_name(&entry.path, &name)?,
                EntryKind::Link(target) => {
                    let mut header = Header::new_gnu();
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    tar.append_link(&mut header, &name, target)?;
                }
            }
        }

        let encoder = tar.into_inner()?;
        let file = encoder.finish()?;
        file.sync_all()?;

        Ok(())
    }
}
