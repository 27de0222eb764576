//! Account storage persisted in a filesystem storage root

use crate::{Error, FilesystemStorage, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the account file inside the storage root
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// A user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier
    pub id: String,

    /// Display name
    pub name: String,
}

/// Account storage backed by a file in a [`FilesystemStorage`] root
///
/// A freshly created account storage is detached; [`attach`] binds it to a
/// filesystem storage and loads the accounts stored there.
///
/// [`attach`]: FilesystemAccountStorage::attach
#[derive(Debug, Default)]
pub struct FilesystemAccountStorage {
    storage: Option<FilesystemStorage>,
    accounts: BTreeMap<String, Account>,
}

impl FilesystemAccountStorage {
    /// Create a detached account storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `storage` and load its account file
    ///
    /// Nothing is created on disk; a missing root has no accounts. Fails if
    /// the root is not a directory or the account file is unreadable or
    /// malformed. On failure the account storage stays as it was.
    pub fn attach(&mut self, storage: &FilesystemStorage) -> Result<()> {
        storage.check_root()?;

        let path = Self::file_path(storage);
        let accounts = match fs::read_to_string(&path) {
            Ok(content) => {
                let list: Vec<Account> =
                    serde_json::from_str(&content).map_err(|e| Error::AccountFile {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                list.into_iter().map(|a| (a.id.clone(), a)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::io(path, e)),
        };

        info!(
            root = %storage.root_directory().display(),
            accounts = accounts.len(),
            "Account storage attached"
        );

        self.storage = Some(storage.clone());
        self.accounts = accounts;
        Ok(())
    }

    /// Whether the account storage is bound to a filesystem storage
    pub fn is_attached(&self) -> bool {
        self.storage.is_some()
    }

    /// Root directory of the attached storage
    pub fn root_directory(&self) -> Option<&Path> {
        self.storage.as_ref().map(FilesystemStorage::root_directory)
    }

    /// Look up an account by id
    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Look up accounts by display name
    pub fn lookup_by_name(&self, name: &str) -> Vec<&Account> {
        self.accounts.values().filter(|a| a.name == name).collect()
    }

    /// Number of known accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether there are no accounts
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Add an account and persist the account file
    pub fn add_account(&mut self, account: Account) -> Result<()> {
        let storage = self.storage.as_ref().ok_or(Error::NotAttached)?;

        if self.accounts.contains_key(&account.id) {
            return Err(Error::AccountExists(account.id));
        }

        storage.ensure_root()?;
        let path = Self::file_path(storage);
        let mut next = self.accounts.clone();
        next.insert(account.id.clone(), account);
        Self::persist(&path, &next)?;

        self.accounts = next;
        Ok(())
    }

    fn file_path(storage: &FilesystemStorage) -> PathBuf {
        storage.root_directory().join(ACCOUNTS_FILE)
    }

    fn persist(path: &Path, accounts: &BTreeMap<String, Account>) -> Result<()> {
        let list: Vec<&Account> = accounts.values().collect();
        let content = serde_json::to_string_pretty(&list).map_err(|e| Error::AccountFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, content).map_err(|e| Error::io(path, e))?;
        debug!(path = %path.display(), accounts = list.len(), "Account file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, name: &str) -> Account {
        Account {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_attach_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("root"));
        let mut accounts = FilesystemAccountStorage::new();

        accounts.attach(&storage).unwrap();
        assert!(accounts.is_attached());
        assert!(accounts.is_empty());
        assert!(!dir.path().join("root").exists());

        accounts.add_account(account("u1", "alice")).unwrap();
        assert!(dir.path().join("root").join(ACCOUNTS_FILE).is_file());
    }

    #[test]
    fn test_accounts_persist_across_attach() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        let mut accounts = FilesystemAccountStorage::new();
        accounts.attach(&storage).unwrap();
        accounts.add_account(account("u1", "alice")).unwrap();

        let mut reloaded = FilesystemAccountStorage::new();
        reloaded.attach(&storage).unwrap();
        assert_eq!(reloaded.get("u1").map(|a| a.name.as_str()), Some("alice"));
        assert_eq!(reloaded.lookup_by_name("alice").len(), 1);
    }

    #[test]
    fn test_attach_fails_on_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ACCOUNTS_FILE), "not json").unwrap();

        let storage = FilesystemStorage::new(dir.path());
        let mut accounts = FilesystemAccountStorage::new();

        assert!(matches!(
            accounts.attach(&storage),
            Err(Error::AccountFile { .. })
        ));
        assert!(!accounts.is_attached());
    }

    #[test]
    fn test_attach_fails_when_root_is_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();

        let mut accounts = FilesystemAccountStorage::new();
        assert!(accounts.attach(&FilesystemStorage::new(&file)).is_err());
    }

    #[test]
    fn test_add_requires_attachment() {
        let mut accounts = FilesystemAccountStorage::new();
        assert!(matches!(
            accounts.add_account(account("u1", "alice")),
            Err(Error::NotAttached)
        ));
    }

    #[test]
    fn test_duplicate_account_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        let mut accounts = FilesystemAccountStorage::new();
        accounts.attach(&storage).unwrap();

        accounts.add_account(account("u1", "alice")).unwrap();
        assert!(matches!(
            accounts.add_account(account("u1", "bob")),
            Err(Error::AccountExists(_))
        ));
    }
}
