use std::path::PathBuf;

use async_stream::stream;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
};
use uuid::Uuid;

use crate::application::storage::{StorageBackend, StorageError, StorageKind, StoredFile};

use super::normalize;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Host filesystem storage rooted at the output directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = normalize(path)?;
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for FsStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Filesystem
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let absolute = self.resolve(path)?;
        Ok(fs::try_exists(absolute).await?)
    }

    async fn read_stream(&self, path: &str) -> Result<StoredFile, StorageError> {
        let absolute = self.resolve(path)?;
        let mut file = match fs::File::open(&absolute).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err)),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        Ok(StoredFile {
            len: metadata.len(),
            body: Box::pin(stream! {
                loop {
                    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
                    match file.read_buf(&mut buf).await {
                        Ok(0) => break,
                        Ok(_) => yield Ok(buf.freeze()),
                        Err(err) => {
                            yield Err(StorageError::Io(err));
                            break;
                        }
                    }
                }
            }),
        })
    }

    /// Write to a sibling temp file, then rename over the target so readers
    /// only ever see complete files.
    async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        let absolute = self.resolve(path)?;
        let Some(file_name) = absolute.file_name().and_then(|name| name.to_str()) else {
            return Err(StorageError::InvalidPath(path.to_string()));
        };
        let temp = absolute.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            drop(file);
            fs::rename(&temp, &absolute).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::MissingParent(path.to_string())
            } else {
                StorageError::Io(err)
            });
        }
        Ok(())
    }

    async fn create_dir_all(&self, path: &str) -> Result<(), StorageError> {
        let absolute = self.resolve(path)?;
        fs::create_dir_all(absolute).await?;
        Ok(())
    }
}
