//! Durable string key-value storage, the equivalent of a browser's
//! `localStorage`.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::{profile_image, session::UserRecord};
use std::fmt::Debug;

/// The JSON-encoded [`UserRecord`] of whoever is logged in.
pub const CURRENT_USER: &str = "currentUser";
/// The bearer token belonging to [`CURRENT_USER`].
pub const ACCESS_TOKEN: &str = "accessToken";
/// Older builds stored the user here.
pub const LEGACY_USER: &str = "user";
/// Older builds stored the token here.
pub const LEGACY_TOKEN: &str = "token";

/// Scratch keys recording where to send the user after logging in.
pub const NAVIGATION_INTENT_KEYS: &[&str] =
    &["pendingCourseJoin", "notificationTarget", "returnToCourseboard"];

pub const REMEMBERED_EMAIL: &str = "rememberedEmail";
pub const REMEMBER_ME: &str = "rememberMe";

/// Every key that describes the current session. All of them go away on
/// logout.
pub fn session_keys() -> impl Iterator<Item = &'static str> {
    const CREDENTIALS: &[&str] =
        &[CURRENT_USER, ACCESS_TOKEN, LEGACY_USER, LEGACY_TOKEN];

    CREDENTIALS.iter().chain(NAVIGATION_INTENT_KEYS).copied()
}

/// A string key-value store shared by everything in the process.
///
/// Methods take `&self`; implementations handle their own locking.
pub trait Storage: Debug + Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a key that isn't there is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn keys(&self) -> Vec<String>;
}

/// Remove every key starting with `prefix`.
pub(crate) fn remove_prefixed(
    storage: &dyn Storage,
    prefix: &str,
) -> Result<(), StorageError> {
    for key in storage.keys() {
        if key.starts_with(prefix) {
            storage.remove(&key)?;
        }
    }

    Ok(())
}

/// Move anything written under the old key names over to the canonical
/// schema, then drop the old names.
pub fn migrate_legacy_keys(storage: &dyn Storage) -> Result<(), StorageError> {
    if storage.get(CURRENT_USER).is_none() {
        let legacy_user = storage.get(LEGACY_USER);
        let legacy_token = storage
            .get(LEGACY_TOKEN)
            .or_else(|| storage.get(ACCESS_TOKEN));

        if let (Some(user), Some(token)) = (legacy_user, legacy_token) {
            log::debug!("Migrating the stored session to the current key names");
            storage.set(CURRENT_USER, &user)?;
            storage.set(ACCESS_TOKEN, &token)?;
        }
    }

    storage.remove(LEGACY_USER)?;
    storage.remove(LEGACY_TOKEN)?;

    // the unscoped image belonged to whoever was logged in at the time
    let user_id = storage
        .get(CURRENT_USER)
        .and_then(|raw| serde_json::from_str::<UserRecord>(&raw).ok())
        .map(|user| user.id);

    if let Some(id) = user_id {
        let legacy_key = profile_image::storage_key(None);
        let scoped_key = profile_image::storage_key(Some(id));

        if let Some(image) = storage.get(&legacy_key) {
            if storage.get(&scoped_key).is_none() {
                storage.set(&scoped_key, &image)?;
            }
            storage.remove(&legacy_key)?;
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Unable to access \"{}\"", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        inner: std::io::Error,
    },
    #[error("The storage file \"{}\" is corrupted", path.display())]
    Corrupted {
        path: std::path::PathBuf,
        #[source]
        inner: serde_json::Error,
    },
    #[error("Unable to serialize the stored values")]
    Serialize(#[from] serde_json::Error),
}
