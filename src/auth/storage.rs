use super::CredentialPair;
use crate::types::StorageError;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable home of the credential pair.
///
/// Only [`TokenStore`](super::TokenStore) writes through this trait.
pub trait TokenStorage: Send + Sync + 'static {
    fn load(&self) -> Result<Option<CredentialPair>, StorageError>;
    fn save(&self, pair: &CredentialPair) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// Process-lifetime storage
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    pair: Mutex<Option<CredentialPair>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(pair: CredentialPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<CredentialPair>, StorageError> {
        Ok(self.pair.lock().clone())
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StorageError> {
        *self.pair.lock() = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.pair.lock().take();
        Ok(())
    }
}

/// JSON file storage that survives restarts.
///
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<CredentialPair>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(pair)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryTokenStorage::new();
        assert!(storage.load().unwrap().is_none());

        storage.save(&CredentialPair::new("a", "r")).unwrap();
        assert_eq!(storage.load().unwrap(), Some(CredentialPair::new("a", "r")));

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("credentials.json");

        FileTokenStorage::new(&path)
            .save(&CredentialPair::new("access", "refresh"))
            .unwrap();

        let reopened = FileTokenStorage::new(&path);
        assert_eq!(
            reopened.load().unwrap(),
            Some(CredentialPair::new("access", "refresh"))
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("absent.json"));

        assert!(storage.load().unwrap().is_none());
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("credentials.json"));

        storage.save(&CredentialPair::new("a", "r")).unwrap();
        storage.clear().unwrap();

        assert!(!storage.path().exists());
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_storage_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = FileTokenStorage::new(&path).load().unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }
}
