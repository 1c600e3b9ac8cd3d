//! Storage backend abstraction for client assets and page snapshots.
//!
//! Paths are `/`-separated and relative to the backend root. Implementations
//! live in `infra::storage`; the active one is chosen once at startup.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("`{0}` does not exist")]
    NotFound(String),
    #[error("invalid stored path `{0}`")]
    InvalidPath(String),
    #[error("parent directory of `{0}` does not exist")]
    MissingParent(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Filesystem,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::Filesystem => "filesystem",
        }
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// An open stored file. `len` is the size at open time.
pub struct StoredFile {
    pub len: u64,
    pub body: ByteStream,
}

impl std::fmt::Debug for StoredFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredFile").field("len", &self.len).finish()
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> StorageKind;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn read_stream(&self, path: &str) -> Result<StoredFile, StorageError>;

    /// Replace the file at `path` with `data`.
    async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError>;

    async fn create_dir_all(&self, path: &str) -> Result<(), StorageError>;
}

/// Parent directory of a stored path, or `""` for the root.
pub fn parent_dir(path: &str) -> &str {
    path.trim_matches('/')
        .rsplit_once('/')
        .map_or("", |(parent, _)| parent)
}
