//! Filesystem store for todo images.
//!
//! Files are written as `<upload_dir>/todo_<uuid>.jpg` and referenced from todos by
//! their public path `/uploads/todos/todo_<uuid>.jpg`.

use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

/// Public URL prefix for stored todo images.
pub const PUBLIC_PREFIX: &str = "/uploads/todos/";

lazy_static! {
    // Names we generate ourselves; anything else is refused so paths cannot escape the store.
    static ref STORED_NAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]+\.jpg$").unwrap();
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under a fresh name and returns its public path.
    pub async fn save_jpeg(&self, bytes: &[u8]) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let name = format!("todo_{}.jpg", Uuid::new_v4().simple());
        tokio::fs::write(self.root.join(&name), bytes).await?;
        log::debug!("stored image {} ({} bytes)", name, bytes.len());
        Ok(format!("{}{}", PUBLIC_PREFIX, name))
    }

    /// Removes the file behind a public path.
    pub async fn delete(&self, public_path: &str) -> io::Result<()> {
        let path = self.resolve(public_path)?;
        tokio::fs::remove_file(path).await
    }

    /// Deletes a superseded or orphaned image, logging instead of failing.
    pub async fn delete_quietly(&self, public_path: &str) {
        if let Err(e) = self.delete(public_path).await {
            log::warn!("could not delete stored image {}: {}", public_path, e);
        }
    }

    /// Reads a stored image by its file name.
    pub async fn read(&self, file_name: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path_for_name(file_name)?).await
    }

    /// Maps a public path back to the file inside the store.
    pub fn resolve(&self, public_path: &str) -> io::Result<PathBuf> {
        let name = public_path.strip_prefix(PUBLIC_PREFIX).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a stored image path: {}", public_path),
            )
        })?;
        self.path_for_name(name)
    }

    fn path_for_name(&self, name: &str) -> io::Result<PathBuf> {
        if !STORED_NAME_REGEX.is_match(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid stored image name: {}", name),
            ));
        }
        Ok(self.root.join(name))
    }
}
