use std::path::{Path, PathBuf};

use crate::error::{ConfigurationError, LoadError};

/// The file holding the serialized authorization policy.
#[derive(Debug, Clone)]
pub struct PolicyFile {
    path: PathBuf,
}

impl PolicyFile {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ConfigurationError::EmptySource);
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document.
    pub async fn read(&self) -> Result<Vec<u8>, LoadError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| LoadError::SourceRead {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_rejected() {
        assert_eq!(PolicyFile::new("").unwrap_err(), ConfigurationError::EmptySource);
    }

    #[tokio::test]
    async fn read_missing_file() {
        let source = PolicyFile::new("/does/not/exist/policy.json").unwrap();
        let err = source.read().await.unwrap_err();
        assert!(
            err.to_string()
                .starts_with("policy file(/does/not/exist/policy.json) read failed"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn read_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, b"{\"name\":\"p\"}").unwrap();
        let source = PolicyFile::new(&path).unwrap();
        assert_eq!(source.path(), path);
        assert_eq!(source.read().await.unwrap(), b"{\"name\":\"p\"}");
    }
}
