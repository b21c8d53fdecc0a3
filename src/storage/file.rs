use super::{Storage, StorageError};
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

/// Storage persisted to a single JSON file.
///
/// The whole map is kept in memory and the file is rewritten after every
/// mutation, so values survive a restart of the process. A mutation only
/// shows up in memory once it has been written to disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the storage file at `path`. A missing file is an empty store.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StorageError> {
        let path = path.into();

        let values = match fs::read_to_string(&path) {
            Ok(raw) => {
                let values: BTreeMap<String, String> =
                    serde_json::from_str(&raw).map_err(|inner| {
                        StorageError::Corrupted {
                            path: path.clone(),
                            inner,
                        }
                    })?;
                log::debug!(
                    "Loaded {} stored values from {}",
                    values.len(),
                    path.display()
                );
                values
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No storage file at {} yet", path.display());
                BTreeMap::new()
            },
            Err(inner) => return Err(StorageError::Io { path, inner }),
        };

        Ok(FileStorage {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write `next` out, and only then make it the current state.
    fn commit<F>(&self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut values = self.values();
        let mut next = values.clone();
        change(&mut next);

        self.flush(&next)?;
        *values = next;

        Ok(())
    }

    fn flush(
        &self,
        values: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        let serialized = serde_json::to_string_pretty(values)?;

        let io_error = |inner| StorageError::Io {
            path: self.path.clone(),
            inner,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&self.path, serialized).map_err(io_error)?;

        log::trace!("Flushed {} values to {}", values.len(), self.path.display());

        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.commit(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if !self.values().contains_key(key) {
            return Ok(());
        }

        self.commit(|values| {
            values.remove(key);
        })
    }

    fn keys(&self) -> Vec<String> { self.values().keys().cloned().collect() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allmeet").join("storage.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("accessToken", "abc").unwrap();
        storage.set("userProfileImage:7", "color:#ef4444").unwrap();
        storage.remove("accessToken").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();

        assert_eq!(reopened.get("accessToken"), None);
        assert_eq!(
            reopened.get("userProfileImage:7").as_deref(),
            Some("color:#ef4444")
        );
    }

    #[test]
    fn garbage_on_disk_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();

        let err = FileStorage::open(&path).unwrap_err();

        assert!(matches!(err, StorageError::Corrupted { .. }));
    }

    #[test]
    fn failed_writes_change_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("allmeet");
        let storage = FileStorage::open(parent.join("storage.json")).unwrap();
        // a file where the directory should be
        fs::write(&parent, "").unwrap();

        let err = storage.set("accessToken", "abc").unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(storage.get("accessToken"), None);
        assert!(storage.keys().is_empty());
    }
}
