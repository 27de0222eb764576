//! Filesystem document storage

use crate::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// File extension of stored documents
const DOCUMENT_EXTENSION: &str = "xml";

/// Document storage rooted at a directory
///
/// Constructing the storage does not touch the filesystem; the root is
/// created lazily by [`FilesystemStorage::ensure_root`] or by the first write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Create a storage rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the storage
    pub fn root_directory(&self) -> &Path {
        &self.root
    }

    /// Check the root without creating it
    ///
    /// Returns whether the root exists. A root that is not a directory is an
    /// error.
    pub fn check_root(&self) -> Result<bool> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(Error::NotADirectory(self.root.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(&self.root, e)),
        }
    }

    /// Create the root directory if it does not exist yet
    pub fn ensure_root(&self) -> Result<()> {
        if !self.check_root()? {
            fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
            debug!(root = %self.root.display(), "Created storage root");
        }
        Ok(())
    }

    /// Resolve a slash-separated document path below the root
    pub fn document_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let valid = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if name.is_empty() || !valid {
            return Err(Error::InvalidName(name.to_string()));
        }

        Ok(self.root.join(relative).with_extension(DOCUMENT_EXTENSION))
    }

    /// Read a document
    pub fn read_document(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.document_path(name)?;
        fs::read(&path).map_err(|e| Error::io(path, e))
    }

    /// Write a document, creating intermediate directories
    pub fn write_document(&self, name: &str, content: &[u8]) -> Result<()> {
        let path = self.document_path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
        trace!(document = %name, bytes = content.len(), "Document written");
        Ok(())
    }

    /// List document names directly below `dir` (slash-separated, relative to root)
    pub fn list_documents(&self, dir: &str) -> Result<Vec<String>> {
        let base = if dir.trim_matches('/').is_empty() {
            self.root.clone()
        } else {
            let relative = Path::new(dir.trim_matches('/'));
            if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
                return Err(Error::InvalidName(dir.to_string()));
            }
            self.root.join(relative)
        };

        let entries = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(base, e)),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(DOCUMENT_EXTENSION)
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        storage.write_document("notes/todo", b"<doc/>").unwrap();
        assert_eq!(storage.read_document("notes/todo").unwrap(), b"<doc/>");
        assert_eq!(storage.list_documents("notes").unwrap(), vec!["todo"]);
    }

    #[test]
    fn test_rejects_escaping_names() {
        let storage = FilesystemStorage::new("/srv/tandem");
        assert!(matches!(
            storage.document_path("../etc/passwd"),
            Err(Error::InvalidName(_))
        ));
        assert!(storage.document_path("").is_err());
    }

    #[test]
    fn test_ensure_root_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let storage = FilesystemStorage::new(&root);

        storage.ensure_root().unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_check_root_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let storage = FilesystemStorage::new(&root);

        assert!(!storage.check_root().unwrap());
        assert!(!root.exists());

        storage.ensure_root().unwrap();
        assert!(storage.check_root().unwrap());
    }

    #[test]
    fn test_ensure_root_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();

        let storage = FilesystemStorage::new(&file);
        assert!(matches!(storage.ensure_root(), Err(Error::NotADirectory(_))));
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        assert!(storage.list_documents("nothing-here").unwrap().is_empty());
    }
}
