//! Storage backends: an ephemeral in-memory tree for development and the
//! host filesystem for production.

mod fs;
mod memory;

use std::path::{Component, Path};

use crate::application::storage::StorageError;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

/// Normalize a stored path, rejecting absolute paths and traversal.
fn normalize(path: &str) -> Result<String, StorageError> {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    let relative = Path::new(trimmed);
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return Err(StorageError::InvalidPath(path.to_string())),
            },
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(path.to_string()));
            }
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_slashes_and_rejects_traversal() {
        assert_eq!(normalize("/static/home.html").expect("valid"), "static/home.html");
        assert_eq!(normalize("static/./all.html").expect("valid"), "static/all.html");
        assert_eq!(normalize("/").expect("valid"), "");
        assert!(matches!(
            normalize("static/../../etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
    }
}
