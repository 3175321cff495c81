// SPDX-License-Identifier: Apache-2.0
use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite};
use crate::config::app::StorageConfig;
use crate::driver::StorageDriver;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;

/// Storage driver writing into a local folder
#[derive(Clone, Debug)]
pub struct FilesystemStorage {
    root: PathBuf
}

#[async_trait]
impl StorageDriver for FilesystemStorage {

    async fn writer(&self, path: &str) -> Result<Pin<Box<dyn AsyncWrite + Send>>, RegistryError> {
        let file_path = self.resolve(path)?;

        // Make sure the parent folders are there
        self.create_parent(&file_path).await?;

        // Open the file
        let file = self.open_file_for_write(&file_path).await.map_err(|e| map_io_error(path, e))?;

        // Box it and pin it
        Ok(Box::pin(file))
    }

    async fn reader(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>, RegistryError> {
        let file_path = self.resolve(path)?;

        // Open the file
        let file = self.open_file_for_read(&file_path).await.map_err(|e| map_io_error(path, e))?;

        // Box it and pin it
        Ok(Box::pin(file))
    }

    async fn exists(&self, path: &str) -> Result<bool, RegistryError> {
        Ok(self.size(path).await?.is_some())
    }

    async fn size(&self, path: &str) -> Result<Option<u64>, RegistryError> {
        let file_path = self.resolve(path)?;
        match tokio::fs::metadata(&file_path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io_error(path, e)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), RegistryError> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;

        self.create_parent(&to_path).await?;

        tokio::fs::rename(&from_path, &to_path).await.map_err(|e| map_io_error(from, e))?;

        // Clean up the folder the content came from, if it is now empty
        self.remove_empty_parent(&from_path).await;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RegistryError> {
        let file_path = self.resolve(path)?;
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => {
                self.remove_empty_parent(&file_path).await;
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io_error(path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        let start = self.resolve(prefix)?;
        let mut paths = Vec::new();
        let mut folders = vec![start];

        while let Some(folder) = folders.pop() {
            let mut entries = match tokio::fs::read_dir(&folder).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => return Err(map_io_error(prefix, e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                if entry.file_type().await?.is_dir() {
                    folders.push(entry_path);
                } else if let Ok(relative) = entry_path.strip_prefix(&self.root) {
                    let relative = relative.components()
                        .map(|component| component.as_os_str().to_string_lossy().to_string())
                        .collect::<Vec<String>>()
                        .join("/");
                    paths.push(relative);
                }
            }
        }

        paths.sort();
        Ok(paths)
    }
}

impl FilesystemStorage {

    /// New instance of the FilesystemStorage
    pub fn new(config: &StorageConfig) -> FilesystemStorage {
        FilesystemStorage::with_root(&config.folder)
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> FilesystemStorage {
        FilesystemStorage {
            root: root.as_ref().to_path_buf()
        }
    }

    /// Build the local path, refusing anything escaping the storage folder
    fn resolve(&self, path: &str) -> Result<PathBuf, RegistryError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|component| !matches!(component, Component::Normal(_)));
        if escapes {
            return Err(RegistryError::new(ErrorKind::InternalError)
                .with_context("refusing storage path")
                .with_error(path));
        }
        Ok(self.root.join(relative))
    }

    async fn create_parent(&self, file_path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn remove_empty_parent(&self, file_path: &Path) {
        if let Some(parent) = file_path.parent() {
            if parent != self.root {
                // fails when the folder still has content, which is fine
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
    }

    /// Get an async read File handle
    async fn open_file_for_read(&self, file_path: &PathBuf) -> Result<File,  std::io::Error> {
        // Create the file options
        let mut options = OpenOptions::new();

        // We need to have a reference otherwise the Options get freed
        let options = options.read(true);

        // Now open the file
        options.open(&file_path).await

    }

    /// Get an async write/create/truncate File handle
    async fn open_file_for_write(&self, file_path: &PathBuf) -> Result<File,  std::io::Error> {
        // Create the file options
        let mut options = OpenOptions::new();

        // We need to have a reference otherwise the Options get freed
        let options = options.write(true).create(true).truncate(true);

        // Now open the file
        options.open(&file_path).await

    }

}

fn map_io_error(path: &str, e: std::io::Error) -> RegistryError {
    let kind = if e.kind() == IoErrorKind::NotFound {
        ErrorKind::NotFound
    } else {
        ErrorKind::StorageUnavailable
    };
    RegistryError::new(kind)
        .with_context(format!("storage operation failed on {}", path))
        .with_error(e.to_string())
}
