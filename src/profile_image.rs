//! A per-user avatar preference kept in local storage, plus a channel that
//! tells every interested view when it changes.

use crate::{
    session::UserId,
    storage::{self, Storage, StorageError},
};
use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// The unscoped key older builds used. Scoped keys append `:<user id>`.
pub const STORAGE_KEY_PREFIX: &str = "userProfileImage";

const COLOR_PREFIX: &str = "color:";

pub fn storage_key(user_id: Option<UserId>) -> String {
    match user_id {
        Some(id) => format!("{}:{}", STORAGE_KEY_PREFIX, id),
        None => STORAGE_KEY_PREFIX.to_string(),
    }
}

/// What a stored profile image string means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileImage {
    /// A solid background colour, stored as `color:<hex>`.
    Color(String),
    Url(String),
}

impl ProfileImage {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(COLOR_PREFIX) {
            Some(hex) => ProfileImage::Color(hex.to_string()),
            None => ProfileImage::Url(raw.to_string()),
        }
    }

    pub fn color<S: Into<String>>(hex: S) -> Self {
        ProfileImage::Color(hex.into())
    }
}

impl Display for ProfileImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProfileImage::Color(hex) => write!(f, "{}{}", COLOR_PREFIX, hex),
            ProfileImage::Url(url) => f.write_str(url),
        }
    }
}

/// The payload sent to listeners whenever a user's image changes.
///
/// `profile_image: None` means "show the default avatar".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileImageUpdate {
    pub user_id: Option<UserId>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileImageCache {
    storage: Arc<dyn Storage>,
    updates: broadcast::Sender<ProfileImageUpdate>,
}

impl ProfileImageCache {
    pub fn new(storage: Arc<dyn Storage>, capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));

        ProfileImageCache { storage, updates }
    }

    /// Look up the image for `user_id`.
    ///
    /// The unscoped key is only consulted when no user id is known. A known
    /// user without a scoped entry has no image.
    pub fn read(&self, user_id: Option<UserId>) -> Option<String> {
        let scoped = self.storage.get(&storage_key(user_id));

        match (scoped, user_id) {
            (Some(image), _) => Some(image),
            (None, None) => self.storage.get(STORAGE_KEY_PREFIX),
            (None, Some(_)) => None,
        }
    }

    /// Store (or, for `None` and empty strings, forget) a user's image.
    pub fn write(
        &self,
        user_id: Option<UserId>,
        image: Option<&str>,
    ) -> Result<(), StorageError> {
        let key = storage_key(user_id);

        match image.filter(|image| !image.is_empty()) {
            Some(image) => {
                log::trace!("Caching the profile image under {}", key);
                self.storage.set(&key, image)?;
            },
            None => {
                log::trace!("Clearing the cached profile image at {}", key);
                self.storage.remove(&key)?;
            },
        }

        if key != STORAGE_KEY_PREFIX {
            self.storage.remove(STORAGE_KEY_PREFIX)?;
        }

        Ok(())
    }

    /// Tell every current listener about a change. Listeners that subscribe
    /// later won't see it.
    pub fn notify_updated(&self, update: ProfileImageUpdate) {
        match self.updates.send(update) {
            Ok(listeners) => {
                log::trace!("Profile image update sent to {} listeners", listeners)
            },
            Err(_) => log::trace!("Nobody is listening for profile image updates"),
        }
    }

    pub fn subscribe(&self) -> ProfileImageListener {
        ProfileImageListener {
            updates: self.updates.subscribe(),
        }
    }

    /// Remove every cached image, scoped or not.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        storage::remove_prefixed(self.storage.as_ref(), STORAGE_KEY_PREFIX)
    }
}

/// A subscription to [`ProfileImageUpdate`]s. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ProfileImageListener {
    updates: broadcast::Receiver<ProfileImageUpdate>,
}

impl ProfileImageListener {
    /// Wait for the next update, or `None` once the cache has gone away.
    pub async fn recv(&mut self) -> Option<ProfileImageUpdate> {
        loop {
            match self.updates.recv().await {
                Ok(update) => return Some(update),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Missed {} profile image updates", skipped);
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next update if one has already been sent.
    pub fn try_recv(&mut self) -> Option<ProfileImageUpdate> {
        loop {
            match self.updates.try_recv() {
                Ok(update) => return Some(update),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("Missed {} profile image updates", skipped);
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => {
                    return None
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn cache() -> (Arc<MemoryStorage>, ProfileImageCache) {
        let storage = Arc::new(MemoryStorage::new());
        let cache = ProfileImageCache::new(storage.clone(), 8);

        (storage, cache)
    }

    #[test]
    fn scoped_and_unscoped_keys() {
        assert_eq!(storage_key(None), "userProfileImage");
        assert_eq!(storage_key(Some(UserId::new(42))), "userProfileImage:42");
    }

    #[test]
    fn write_then_read() {
        let (_, cache) = cache();
        let user = Some(UserId::new(1));

        for image in &["https://example.com/a.png", "color:#3b82f6"] {
            cache.write(user, Some(image)).unwrap();
            assert_eq!(cache.read(user).as_deref(), Some(*image));
        }

        cache.write(user, None).unwrap();
        assert_eq!(cache.read(user), None);
    }

    #[test]
    fn empty_image_means_no_image() {
        let (storage, cache) = cache();
        let user = Some(UserId::new(1));
        cache.write(user, Some("color:#3b82f6")).unwrap();

        cache.write(user, Some("")).unwrap();

        assert_eq!(cache.read(user), None);
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn writing_a_scoped_image_drops_the_legacy_one() {
        let (storage, cache) = cache();
        storage.set(STORAGE_KEY_PREFIX, "color:#000000").unwrap();

        cache.write(Some(UserId::new(9)), Some("color:#ffffff")).unwrap();

        assert_eq!(storage.get(STORAGE_KEY_PREFIX), None);
    }

    #[test]
    fn legacy_fallback_only_without_a_user() {
        let (storage, cache) = cache();
        storage.set(STORAGE_KEY_PREFIX, "color:#000000").unwrap();

        assert_eq!(cache.read(None).as_deref(), Some("color:#000000"));
        assert_eq!(cache.read(Some(UserId::new(9))), None);
    }

    #[test]
    fn clear_all_removes_every_image() {
        let (storage, cache) = cache();
        storage.set(STORAGE_KEY_PREFIX, "a").unwrap();
        cache.write(Some(UserId::new(1)), Some("b")).unwrap();
        storage.set("userProfileImage:2", "c").unwrap();
        storage.set("rememberMe", "true").unwrap();

        cache.clear_all().unwrap();

        assert_eq!(storage.keys(), vec![String::from("rememberMe")]);
    }

    #[test]
    fn listeners_see_updates_immediately() {
        let (_, cache) = cache();
        let mut first = cache.subscribe();
        let mut second = cache.subscribe();
        let update = ProfileImageUpdate {
            user_id: Some(UserId::new(3)),
            profile_image: Some(String::from("color:#ff0000")),
        };

        cache.notify_updated(update.clone());

        assert_eq!(first.try_recv(), Some(update.clone()));
        assert_eq!(second.try_recv(), Some(update));
        assert_eq!(first.try_recv(), None);
    }

    #[test]
    fn late_listeners_miss_earlier_updates() {
        let (_, cache) = cache();
        cache.notify_updated(ProfileImageUpdate {
            user_id: None,
            profile_image: None,
        });

        let mut late = cache.subscribe();

        assert_eq!(late.try_recv(), None);
    }

    #[tokio::test]
    async fn recv_ends_when_the_cache_is_dropped() {
        let (_, cache) = cache();
        let mut listener = cache.subscribe();

        drop(cache);

        assert_eq!(listener.recv().await, None);
    }

    #[test]
    fn parse_image_values() {
        assert_eq!(
            ProfileImage::parse("color:#a855f7"),
            ProfileImage::color("#a855f7")
        );
        assert_eq!(
            ProfileImage::parse("https://api.dicebear.com/7.x/avataaars/svg?seed=Max"),
            ProfileImage::Url(String::from(
                "https://api.dicebear.com/7.x/avataaars/svg?seed=Max"
            ))
        );
        assert_eq!(ProfileImage::color("#ec4899").to_string(), "color:#ec4899");
    }
}
