use super::{Storage, StorageError};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

/// Storage that only lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { MemoryStorage::default() }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // nothing panics while holding the lock, so a poisoned map is
        // still consistent
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values().remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> { self.values().keys().cloned().collect() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let storage = MemoryStorage::new();

        storage.set("accessToken", "abc").unwrap();
        assert_eq!(storage.get("accessToken").as_deref(), Some("abc"));

        storage.remove("accessToken").unwrap();
        assert_eq!(storage.get("accessToken"), None);

        // removing twice is fine
        storage.remove("accessToken").unwrap();
    }
}
