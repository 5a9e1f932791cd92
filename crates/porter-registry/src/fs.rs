//! Filesystem and archive-extraction collaborators.
//!
//! The download pipeline only ever touches disk through these traits, so
//! tests can substitute failing or recording implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{RegistryError, RegistryResult};

/// Filesystem operations used by the download pipeline.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Whether a path exists.
    async fn exists(&self, path: &Path) -> bool;

    /// Create a directory, optionally with all missing parents.
    async fn create_directory(&self, path: &Path, recursive: bool) -> RegistryResult<()>;

    /// Remove a file or directory tree. Missing paths are not an error.
    async fn remove_file_tree(&self, path: &Path) -> RegistryResult<()>;

    /// Read a file into memory.
    async fn read_file_contents(&self, path: &Path) -> RegistryResult<Vec<u8>>;

    /// Write a file, creating or truncating it.
    async fn write_file_contents(&self, path: &Path, contents: &[u8]) -> RegistryResult<()>;

    /// Move the contents of a directory's single top-level subdirectory up
    /// one level and remove the subdirectory.
    async fn strip_first_level(&self, path: &Path) -> RegistryResult<()>;
}

/// Archive extraction.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into the existing directory `destination`.
    async fn extract(&self, archive: &Path, destination: &Path) -> RegistryResult<()>;
}

/// [`FileSystem`] over the local disk via `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn create_directory(&self, path: &Path, recursive: bool) -> RegistryResult<()> {
        if recursive {
            tokio::fs::create_dir_all(path).await?;
        } else {
            tokio::fs::create_dir(path).await?;
        }
        Ok(())
    }

    async fn remove_file_tree(&self, path: &Path) -> RegistryResult<()> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await?,
            Ok(_) => tokio::fs::remove_file(path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn read_file_contents(&self, path: &Path) -> RegistryResult<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write_file_contents(&self, path: &Path, contents: &[u8]) -> RegistryResult<()> {
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn strip_first_level(&self, path: &Path) -> RegistryResult<()> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut children: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            children.push(entry.path());
        }

        let [top] = children.as_slice() else {
            return Err(RegistryError::Io {
                message: format!(
                    "cannot strip first level of {}: expected a single top-level directory",
                    path.display()
                ),
            });
        };
        if !tokio::fs::metadata(top).await?.is_dir() {
            return Err(RegistryError::Io {
                message: format!(
                    "cannot strip first level of {}: top-level entry is not a directory",
                    path.display()
                ),
            });
        }

        let mut inner = tokio::fs::read_dir(top).await?;
        while let Some(entry) = inner.next_entry().await? {
            let target = path.join(entry.file_name());
            tokio::fs::rename(entry.path(), target).await?;
        }
        tokio::fs::remove_dir(top).await?;
        Ok(())
    }
}

/// [`ArchiveExtractor`] for zip archives.
///
/// Extraction is blocking, so it runs on the blocking thread pool.
#[derive(Debug, Clone, Default)]
pub struct ZipExtractor;

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, destination: &Path) -> RegistryResult<()> {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || -> RegistryResult<()> {
            let file = std::fs::File::open(&archive)?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| RegistryError::Io {
                message: format!("failed to open archive {}: {}", archive.display(), e),
            })?;
            zip.extract(&destination).map_err(|e| RegistryError::Io {
                message: format!("failed to extract {}: {}", archive.display(), e),
            })?;
            Ok(())
        })
        .await
        .map_err(|e| RegistryError::Io {
            message: format!("extraction task failed: {}", e),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_fs_roundtrip() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem;
        let file = dir.path().join("data.bin");

        assert!(!fs.exists(&file).await);
        fs.write_file_contents(&file, b"hello").await.unwrap();
        assert!(fs.exists(&file).await);
        assert_eq!(fs.read_file_contents(&file).await.unwrap(), b"hello");

        fs.remove_file_tree(&file).await.unwrap();
        assert!(!fs.exists(&file).await);

        // Removing a missing path is fine.
        fs.remove_file_tree(&file).await.unwrap();
    }

    #[tokio::test]
    async fn test_strip_first_level() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem;
        let root = dir.path().join("package");
        std::fs::create_dir_all(root.join("linkedlist-1.0.0/sources")).unwrap();
        std::fs::write(root.join("linkedlist-1.0.0/manifest.txt"), b"m").unwrap();
        std::fs::write(root.join("linkedlist-1.0.0/sources/lib.txt"), b"l").unwrap();

        fs.strip_first_level(&root).await.unwrap();

        assert!(root.join("manifest.txt").exists());
        assert!(root.join("sources/lib.txt").exists());
        assert!(!root.join("linkedlist-1.0.0").exists());
    }

    #[tokio::test]
    async fn test_strip_first_level_requires_single_directory() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem;
        let root = dir.path().join("package");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();

        assert!(fs.strip_first_level(&root).await.is_err());
    }

    #[tokio::test]
    async fn test_zip_extractor() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("package.zip");

        let file = std::fs::File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("linkedlist-1.0.0/manifest.txt", options)
            .unwrap();
        writer.write_all(b"// swift-tools-version:5.5").unwrap();
        writer.finish().unwrap();

        let destination = dir.path().join("out");
        std::fs::create_dir_all(&destination).unwrap();
        ZipExtractor
            .extract(&archive_path, &destination)
            .await
            .unwrap();

        let extracted = destination.join("linkedlist-1.0.0/manifest.txt");
        assert!(extracted.exists());
    }
}
