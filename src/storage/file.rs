use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use super::KeyValueStore;
use crate::error::{Result, StoreError};

/// Store persisted as a single JSON object on disk.
///
/// Entries are cached in memory; every mutation rewrites the file through a
/// sibling temp file and a rename, so a crash never leaves half a file behind.
/// A mutation whose write fails leaves the cache untouched.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, reading existing entries. A missing file is
    /// an empty store; it is created on the first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(StoreError::Corrupt)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e).into()),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "opened file store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> std::result::Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> std::result::Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        f(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> std::result::Result<(), StoreError> {
        if self.get(key)?.is_none() {
            return Ok(());
        }
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> std::result::Result<(), StoreError> {
        self.mutate(BTreeMap::clear)
    }

    fn len(&self) -> std::result::Result<usize, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }

    /// Checks permissions instead of writing: the file, if present, and the
    /// nearest existing directory it would be created under must be writable.
    fn is_available(&self) -> bool {
        if let Ok(meta) = fs::metadata(&self.path) {
            if meta.permissions().readonly() {
                return false;
            }
        }

        let dir = self
            .path
            .ancestors()
            .skip(1)
            .find(|dir| dir.as_os_str().is_empty() || dir.exists())
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        fs::metadata(dir).is_ok_and(|meta| meta.is_dir() && !meta.permissions().readonly())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("theme", "dark").unwrap();
        store.set("volume", "7").unwrap();
        store.remove("volume").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(reopened.get("volume").unwrap(), None);
        assert_eq!(reopened.len().unwrap(), 1);
    }

    #[test]
    fn missing_file_is_empty_and_not_created_until_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::open(&path).unwrap();
        assert!(store.is_empty().unwrap());
        assert!(!path.exists());

        store.set("a", "1").unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("store.json.tmp").exists());
    }

    #[test]
    fn clear_empties_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("a", "1").unwrap();
        store.clear().unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.is_empty().unwrap());
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Corrupt(_))));
    }

    #[test]
    fn availability_check_does_not_touch_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("store.json");
        let store = FileStore::open(&path).unwrap();

        assert!(store.is_available());
        assert!(store.is_empty().unwrap());
        assert!(!path.exists());
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn availability_check_does_not_rewrite_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"a":"1"}"#).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.is_available());
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"a":"1"}"#);
    }

    #[test]
    fn read_only_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"a":"1"}"#).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(!store.is_available());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
    }
}
