//! Filesystem storage for finished videos and in-flight downloads
//!
//! - [`ArtifactStore`]: the permanent, append-only directory served over HTTP
//! - [`WorkArea`]: a scratch directory owned by one downloader instance,
//!   removed when the instance is dropped
//! - [`Scratch`]: a per-fetch subdirectory of the work area

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Failed to prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to promote {filename}: {source}")]
    Promote {
        filename: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// A media file in the permanent store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub storage_path: PathBuf,
    pub size_bytes: u64,
}

/// Permanent store for downloaded videos
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    public_prefix: String,
    media_extension: String,
}

impl ArtifactStore {
    /// Open the store, creating the directory if needed
    pub fn open(config: &StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.videos_dir).map_err(|source| StorageError::Prepare {
            path: config.videos_dir.clone(),
            source,
        })?;

        info!(path = %config.videos_dir.display(), "Artifact store ready");

        Ok(Self {
            root: config.videos_dir.clone(),
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
            media_extension: config.media_extension.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn media_extension(&self) -> &str {
        &self.media_extension
    }

    /// Checks a client-supplied filename without touching the filesystem
    pub fn validate_filename(&self, filename: &str) -> Result<()> {
        let suffix = format!(".{}", self.media_extension);
        let valid = !filename.is_empty()
            && !filename.contains("..")
            && !filename.contains(['/', '\\', '\0'])
            && !filename.starts_with('.')
            && filename.len() > suffix.len()
            && filename.ends_with(&suffix);

        if valid {
            Ok(())
        } else {
            Err(StorageError::InvalidFilename(filename.to_string()))
        }
    }

    /// Public URL path for an artifact, if the retrieval endpoint would serve it
    pub fn public_url(&self, artifact: &Artifact) -> Option<String> {
        self.validate_filename(&artifact.filename)
            .ok()
            .map(|_| format!("{}/{}", self.public_prefix, artifact.filename))
    }

    /// Open a stored file for reading; `None` when absent
    pub async fn open_file(&self, filename: &str) -> Result<Option<(fs::File, u64)>> {
        self.validate_filename(filename)?;
        let path = self.root.join(filename);

        match fs::File::open(&path).await {
            Ok(file) => {
                let len = file.metadata().await?.len();
                Ok(Some((file, len)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy a finished download into the store
    ///
    /// The copy goes to a hidden staging name first and is linked into place,
    /// so readers never observe a partial file. An existing file with the same
    /// name is kept as is.
    pub async fn promote(&self, source: &Path, filename: &str) -> Result<Artifact> {
        let destination = self.root.join(filename);
        let staging = self
            .root
            .join(format!(".{filename}.{}.partial", Uuid::new_v4().simple()));

        let promote_err = |source| StorageError::Promote {
            filename: filename.to_string(),
            source,
        };

        fs::copy(source, &staging).await.map_err(promote_err)?;

        let linked = fs::hard_link(&staging, &destination).await;
        if let Err(e) = fs::remove_file(&staging).await {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging file");
        }

        match linked {
            Ok(()) => debug!(filename, "Artifact promoted"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(filename, "Artifact already stored, keeping existing file");
            }
            Err(e) => return Err(promote_err(e)),
        }

        let size_bytes = fs::metadata(&destination).await.map_err(promote_err)?.len();

        Ok(Artifact {
            filename: filename.to_string(),
            storage_path: destination,
            size_bytes,
        })
    }
}

/// Scratch directory owned by one downloader instance
#[derive(Debug)]
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    /// Create a fresh area under `parent`, or the system temp dir
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vidfetch-");

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::Prepare {
                    path: parent.to_path_buf(),
                    source,
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|source| StorageError::Prepare {
            path: parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;

        debug!(path = %dir.path().display(), "Work area created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Private subdirectory for one fetch; removed when the guard drops
    pub fn scratch(&self) -> Result<Scratch> {
        let dir = tempfile::Builder::new()
            .prefix("fetch-")
            .tempdir_in(self.dir.path())?;
        Ok(Scratch { dir })
    }
}

/// Per-fetch scratch directory
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// First file (by name) whose name starts with `prefix`, skipping partial leftovers
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Option<PathBuf>> {
        let mut entries = fs::read_dir(self.dir.path()).await?;
        let mut matches = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let partial = name.ends_with(".part") || name.ends_with(".ytdl");
            if name.starts_with(prefix) && !partial && entry.file_type().await?.is_file() {
                matches.push(entry.path());
            }
        }

        matches.sort();
        Ok(matches.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::open(&StorageConfig {
            videos_dir: dir.path().join("videos"),
            ..StorageConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_validate_filename() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        assert!(store.validate_filename("abc123.mp4").is_ok());
        assert!(store.validate_filename("../etc/passwd.mp4").is_err());
        assert!(store.validate_filename("a..b.mp4").is_err());
        assert!(store.validate_filename("dir/abc.mp4").is_err());
        assert!(store.validate_filename("dir\\abc.mp4").is_err());
        assert!(store.validate_filename("abc123.webm").is_err());
        assert!(store.validate_filename(".mp4").is_err());
        assert!(store.validate_filename(".hidden.mp4").is_err());
        assert!(store.validate_filename("").is_err());
    }

    #[test]
    fn test_public_url_only_for_servable_files() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut artifact = Artifact {
            filename: "abc123.mp4".to_string(),
            storage_path: store.root().join("abc123.mp4"),
            size_bytes: 10,
        };
        assert_eq!(store.public_url(&artifact).as_deref(), Some("/video/abc123.mp4"));

        artifact.filename = "abc123.webm".to_string();
        assert_eq!(store.public_url(&artifact), None);
    }

    #[tokio::test]
    async fn test_promote_copies_and_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let first = temp.path().join("first.mp4");
        std::fs::write(&first, b"first").unwrap();
        let artifact = store.promote(&first, "abc123.mp4").await.unwrap();
        assert_eq!(artifact.size_bytes, 5);
        // copied, not moved
        assert!(first.exists());

        let second = temp.path().join("second.mp4");
        std::fs::write(&second, b"second-version").unwrap();
        let again = store.promote(&second, "abc123.mp4").await.unwrap();
        assert_eq!(again.size_bytes, 5);
        assert_eq!(std::fs::read(store.root().join("abc123.mp4")).unwrap(), b"first");

        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_promote_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let err = store
            .promote(&temp.path().join("nope.mp4"), "nope.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Promote { .. }));
    }

    #[tokio::test]
    async fn test_open_file_absent_and_present() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        assert!(store.open_file("missing.mp4").await.unwrap().is_none());

        std::fs::write(store.root().join("here.mp4"), b"12345").unwrap();
        let (_, len) = store.open_file("here.mp4").await.unwrap().unwrap();
        assert_eq!(len, 5);
    }

    #[tokio::test]
    async fn test_scratch_lookup_and_cleanup() {
        let temp = TempDir::new().unwrap();
        let area = WorkArea::create(Some(temp.path())).unwrap();

        let scratch = area.scratch().unwrap();
        let scratch_path = scratch.path().to_path_buf();
        std::fs::write(scratch_path.join("abc123.mp4.part"), b"partial").unwrap();
        assert!(scratch.find_by_prefix("abc123").await.unwrap().is_none());

        std::fs::write(scratch_path.join("abc123.mp4"), b"done").unwrap();
        let found = scratch.find_by_prefix("abc123").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "abc123.mp4");

        let other = area.scratch().unwrap();
        drop(scratch);
        assert!(!scratch_path.exists());
        assert!(other.path().exists());

        let area_path = area.path().to_path_buf();
        drop(other);
        drop(area);
        assert!(!area_path.exists());
    }
}
