use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::app::{DatabaseError, Result};
use crate::domain::Credential;

/// Persisted credentials, at most one per account id.
pub trait CredentialStore: Send + Sync {
    fn credentials(&self) -> Result<Vec<Credential>>;

    /// Insert `credential`, replacing any entry for the same account.
    fn store(&self, credential: &Credential) -> Result<()>;

    fn delete(&self, credential: &Credential) -> Result<()>;

    fn credential_for(&self, account_id: &str) -> Result<Option<Credential>> {
        Ok(self
            .credentials()?
            .into_iter()
            .find(|c| c.account_id == account_id))
    }
}

/// JSON file holding every credential. Writes go to a temporary file that
/// is renamed over the original.
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<Credential>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read(&self.path)?;
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&content).map_err(|e| {
            DatabaseError::Unknown(format!(
                "corrupt credential file {}: {}",
                self.path.display(),
                e
            ))
            .into()
        })
    }

    fn write(&self, credentials: &[Credential]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(credentials)?)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn credentials(&self) -> Result<Vec<Credential>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read()
    }

    fn store(&self, credential: &Credential) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut credentials = self.read()?;
        credentials.retain(|c| c.account_id != credential.account_id);
        credentials.push(credential.clone());
        self.write(&credentials)
    }

    fn delete(&self, credential: &Credential) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut credentials = self.read()?;
        credentials.retain(|c| c.account_id != credential.account_id);
        self.write(&credentials)
    }
}

/// Process-local credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Vec<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn credentials(&self) -> Result<Vec<Credential>> {
        Ok(self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn store(&self, credential: &Credential) -> Result<()> {
        let mut credentials = self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        credentials.retain(|c| c.account_id != credential.account_id);
        credentials.push(credential.clone());
        Ok(())
    }

    fn delete(&self, credential: &Credential) -> Result<()> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|c| c.account_id != credential.account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::TethysError;
    use crate::domain::AccountType;
    use chrono::Utc;

    fn credential(account: &str, access: &str) -> Credential {
        Credential {
            access: access.into(),
            expiration: Utc::now(),
            refresh: "refresh".into(),
            account_id: account.into(),
            account_type: AccountType::Inoreader,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.credentials().unwrap().is_empty());
    }

    #[test]
    fn test_store_replaces_same_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested").join("credentials.json"));

        store.store(&credential("a", "one")).unwrap();
        store.store(&credential("b", "two")).unwrap();
        store.store(&credential("a", "three")).unwrap();

        let reopened = FileCredentialStore::new(store.path());
        let credentials = reopened.credentials().unwrap();
        assert_eq!(credentials.len(), 2);
        assert_eq!(reopened.credential_for("a").unwrap().unwrap().access, "three");
    }

    #[test]
    fn test_delete_removes_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        let a = credential("a", "one");

        store.store(&a).unwrap();
        store.delete(&a).unwrap();
        assert!(store.credential_for("a").unwrap().is_none());
        assert!(!dir.path().join("credentials.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_database_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(
            store.credentials(),
            Err(TethysError::Database(DatabaseError::Unknown(_)))
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        store.store(&credential("a", "one")).unwrap();
        store.store(&credential("a", "two")).unwrap();
        assert_eq!(store.credentials().unwrap().len(), 1);
        store.delete(&credential("a", "")).unwrap();
        assert!(store.credentials().unwrap().is_empty());
    }
}
