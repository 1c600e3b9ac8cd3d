use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};

use crate::application::storage::{
    StorageBackend, StorageError, StorageKind, StoredFile, parent_dir,
};

use super::normalize;

/// In-memory file tree. Contents vanish with the process.
///
/// Like a real filesystem, a write fails unless the parent directory was
/// created first.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: DashMap<String, Bytes>,
    dirs: DashSet<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn dir_exists(&self, dir: &str) -> bool {
        dir.is_empty() || self.dirs.contains(dir)
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = normalize(path)?;
        Ok(self.files.contains_key(&path) || self.dir_exists(&path))
    }

    async fn read_stream(&self, path: &str) -> Result<StoredFile, StorageError> {
        let key = normalize(path)?;
        let data = self
            .files
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;

        Ok(StoredFile {
            len: data.len() as u64,
            body: Box::pin(stream! {
                yield Ok(data);
            }),
        })
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        let key = normalize(path)?;
        if key.is_empty() || self.dirs.contains(&key) {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        if !self.dir_exists(parent_dir(&key)) {
            return Err(StorageError::MissingParent(path.to_string()));
        }
        self.files.insert(key, data);
        Ok(())
    }

    async fn create_dir_all(&self, path: &str) -> Result<(), StorageError> {
        let key = normalize(path)?;
        let mut current = String::new();
        for part in key.split('/').filter(|part| !part.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            if self.files.contains_key(&current) {
                return Err(StorageError::InvalidPath(path.to_string()));
            }
            self.dirs.insert(current.clone());
        }
        Ok(())
    }
}
