//! File-based local store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, LocalStore};
use fs2::FileExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = ".lock";
const EXTENSION: &str = "json";

/// A directory-backed local store.
///
/// Each key is stored as `<dir>/<key>.json`. Documents survive process
/// restarts.
///
/// # Durability
///
/// `set` writes the document to a temporary file, calls `File::sync_all()`,
/// and renames it over the previous document. A crash leaves either the
/// old or the new document, never a torn one.
///
/// # Locking
///
/// [`FileStore::open`] takes an exclusive advisory lock on `<dir>/.lock`
/// for as long as the store lives, so two processes cannot drain the same
/// queue concurrently. [`FileStore::open_unlocked`] skips the lock and is
/// meant for inspection tools.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use tenantry_storage::{FileStore, LocalStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("data")).unwrap();
/// store.set("properties", &json!([])).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    lock: Option<File>,
    write_guard: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store in `dir` and takes the directory lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the store,
    /// or an I/O error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if let Err(err) = FileExt::try_lock_exclusive(&lock) {
            if err.kind() == fs2::lock_contended_error().kind() {
                return Err(StorageError::Locked(dir.to_path_buf()));
            }
            return Err(err.into());
        }

        tracing::debug!(dir = %dir.display(), "opened local store");

        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Some(lock),
            write_guard: Mutex::new(()),
        })
    }

    /// Opens a store without taking the directory lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist.
    pub fn open_unlocked(dir: &Path) -> StorageResult<Self> {
        if !dir.is_dir() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no store directory at {}", dir.display()),
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: None,
            write_guard: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Returns true if this handle holds the directory lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    fn document_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{EXTENSION}"))
    }

    fn sync_dir(&self) {
        // Directory fsync is unsupported on some platforms; the rename is
        // already complete at this point.
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        let bytes = match fs::read(self.document_path(key)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let value = serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        validate_key(key)?;
        let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;

        let _guard = self.write_guard.lock();
        let target = self.document_path(key);
        let tmp = self.dir.join(format!("{key}.{EXTENSION}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        self.sync_dir();
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_guard.lock();
        match fs::remove_file(self.document_path(key)) {
            Ok(()) => {
                self.sync_dir();
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let _ = FileExt::unlock(&lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");

        let store = FileStore::open(&path).unwrap();
        assert!(path.is_dir());
        assert!(store.is_locked());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn file_set_and_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store
            .set("properties", &json!([{"id": "p1", "name": "A"}]))
            .unwrap();
        assert_eq!(
            store.get("properties").unwrap(),
            Some(json!([{"id": "p1", "name": "A"}]))
        );
        assert_eq!(store.get("tenants").unwrap(), None);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("pending_changes", &json!([{"id": "c1"}])).unwrap();
        }

        {
            let store = FileStore::open(dir.path()).unwrap();
            assert_eq!(
                store.get("pending_changes").unwrap(),
                Some(json!([{"id": "c1"}]))
            );
        }
    }

    #[test]
    fn file_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("tenants", &json!([1, 2, 3])).unwrap();
        store.set("tenants", &json!([4])).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(store.keys().unwrap(), vec!["tenants".to_string()]);
    }

    #[test]
    fn file_corrupt_document_is_reported() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("tenants.json"), b"{not json").unwrap();

        let result = store.get("tenants");
        assert!(matches!(result, Err(StorageError::Json { .. })));
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("documents", &json!([])).unwrap();
        store.remove("documents").unwrap();
        store.remove("documents").unwrap();
        assert_eq!(store.get("documents").unwrap(), None);
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileStore::open(dir.path()).unwrap();

        let second = FileStore::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked(_))));

        let reader = FileStore::open_unlocked(dir.path()).unwrap();
        assert!(!reader.is_locked());
    }

    #[test]
    fn file_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(FileStore::open(dir.path()).unwrap());
        assert!(FileStore::open(dir.path()).is_ok());
    }

    #[test]
    fn file_open_unlocked_requires_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(FileStore::open_unlocked(&missing).is_err());
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.path(), dir.path());
    }
}
