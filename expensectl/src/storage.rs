//! Uploaded bill files on local disk.
//!
//! Files live under `<root>/<user_id>/<random>.<ext>`. Stored paths include the root, so they can
//! be opened directly; paths coming from clients go through [`FileStore::resolve`] first.

use std::path::{Component, Path, PathBuf};

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::UploadsConfig;
use crate::errors::{Error, Result};
use crate::types::{UserId, abbrev_uuid};

/// A bill file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
}

impl StoredFile {
    /// Path as persisted on the expense record.
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    max_file_size: u64,
}

impl FileStore {
    pub fn new(config: &UploadsConfig) -> Self {
        Self {
            root: config.folder.clone(),
            allowed_extensions: config.allowed_extensions.iter().map(|e| e.to_lowercase()).collect(),
            max_file_size: config.max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check an upload before anything is written. Returns the lowercased extension.
    pub fn validate(&self, filename: Option<&str>, size: u64) -> Result<String> {
        let filename = filename.filter(|f| !f.is_empty()).ok_or_else(|| Error::bad_request("No file provided"))?;

        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| self.allowed_extensions.contains(ext))
            .ok_or_else(|| {
                let allowed: Vec<String> = self.allowed_extensions.iter().map(|e| e.to_uppercase()).collect();
                Error::bad_request(format!("File type not allowed. Allowed types: {}", allowed.join(", ")))
            })?;

        if size > self.max_file_size {
            let megabytes = self.max_file_size as f64 / 1024.0 / 1024.0;
            return Err(Error::bad_request(format!("File size exceeds maximum allowed size ({megabytes:?}MB)")));
        }

        Ok(extension)
    }

    /// Write `bytes` under the user's folder with a fresh random name.
    #[instrument(skip(self, bytes), fields(user_id = %abbrev_uuid(&user_id), bytes = bytes.len()), err)]
    pub async fn save(&self, user_id: UserId, extension: &str, bytes: &[u8]) -> Result<StoredFile> {
        let folder = self.root.join(user_id.to_string());
        tokio::fs::create_dir_all(&folder).await.map_err(|e| Error::Internal {
            operation: format!("create upload folder {}: {e}", folder.display()),
        })?;

        let path = folder.join(format!("{}.{extension}", Uuid::new_v4().simple()));
        tokio::fs::write(&path, bytes).await.map_err(|e| Error::Internal {
            operation: format!("write upload {}: {e}", path.display()),
        })?;

        info!(file = %path.display(), "File saved");
        Ok(StoredFile { path })
    }

    /// Remove a stored file. Returns whether something was deleted; never fails.
    pub async fn delete(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(file = %path.display(), "File deleted");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                error!(file = %path.display(), "Error deleting file: {e}");
                false
            }
        }
    }

    pub async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Map a client-supplied path onto the upload root, refusing anything that could leave it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative);
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes || relative.as_os_str().is_empty() {
            return Err(Error::Forbidden {
                message: "Invalid file path".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileStore {
        FileStore::new(&UploadsConfig {
            folder: dir.path().to_path_buf(),
            max_file_size: 1024,
            ..Default::default()
        })
    }

    #[test]
    fn test_validate_messages() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);

        assert_eq!(files.validate(Some("bill.JPG"), 10).unwrap(), "jpg");
        assert_eq!(files.validate(None, 10).unwrap_err().user_message(), "No file provided");
        assert_eq!(files.validate(Some(""), 10).unwrap_err().user_message(), "No file provided");
        assert_eq!(
            files.validate(Some("bill.gif"), 10).unwrap_err().user_message(),
            "File type not allowed. Allowed types: PNG, JPG, JPEG, PDF"
        );
        assert_eq!(
            files.validate(Some("no_extension"), 10).unwrap_err().user_message(),
            "File type not allowed. Allowed types: PNG, JPG, JPEG, PDF"
        );
    }

    #[test]
    fn test_size_limit_message() {
        let dir = TempDir::new().unwrap();
        let files = FileStore::new(&UploadsConfig {
            folder: dir.path().to_path_buf(),
            ..Default::default()
        });
        assert_eq!(
            files.validate(Some("bill.png"), 10 * 1024 * 1024 + 1).unwrap_err().user_message(),
            "File size exceeds maximum allowed size (10.0MB)"
        );
    }

    #[tokio::test]
    async fn test_save_read_delete() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);
        let user_id = Uuid::new_v4();

        let stored = files.save(user_id, "png", b"image").await.unwrap();
        assert!(stored.path.starts_with(dir.path().join(user_id.to_string())));
        assert_eq!(stored.path.extension().unwrap(), "png");
        assert_eq!(files.read(&stored.path).await.unwrap(), b"image");

        assert!(files.delete(&stored.path).await);
        assert!(!files.exists(&stored.path).await);
        assert!(!files.delete(&stored.path).await);
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);

        assert_eq!(files.resolve("abc/def.png").unwrap(), dir.path().join("abc/def.png"));
        for bad in ["../secret", "a/../../b", "/etc/passwd", ""] {
            let err = files.resolve(bad).unwrap_err();
            assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN, "path {bad:?}");
            assert_eq!(err.user_message(), "Invalid file path");
        }
    }
}
