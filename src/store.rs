//! The single source of truth for who is logged in.

use crate::{
    config::{Config, NetworkErrorPolicy},
    endpoints::{self, FetchProfileError, Profile},
    profile_image::{ProfileImageCache, ProfileImageUpdate},
    session::{Authenticated, Session, UserRecord},
    storage::{self, Storage, StorageError},
};
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;
use url::Url;

/// A cheaply cloneable handle to the process's [`Session`].
///
/// [`SessionStore::login()`], [`SessionStore::logout()`],
/// [`SessionStore::refresh_profile()`] and the start up check in
/// [`SessionStore::validate_session()`] are the only things that change the
/// session. Everything they change is mirrored into [`Storage`] so it
/// survives a restart.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    client: Client,
    config: Config,
    storage: Arc<dyn Storage>,
    images: ProfileImageCache,
    state: watch::Sender<Session>,
    validated: AtomicBool,
}

impl SessionStore {
    pub fn new(
        client: Client,
        config: Config,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let images =
            ProfileImageCache::new(storage.clone(), config.broadcast_capacity);
        let (state, _) = watch::channel(Session::booting());

        SessionStore {
            inner: Arc::new(Inner {
                client,
                config,
                storage,
                images,
                state,
                validated: AtomicBool::new(false),
            }),
        }
    }

    /// A snapshot of the current session.
    pub fn session(&self) -> Session { self.inner.state.borrow().clone() }

    /// Get notified every time the session changes.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Wait until the start up check has finished.
    pub async fn loaded(&self) -> Session {
        let mut changes = self.subscribe();

        loop {
            {
                let session = changes.borrow_and_update();
                if !session.is_loading() {
                    return session.clone();
                }
            }

            if changes.changed().await.is_err() {
                return changes.borrow().clone();
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.borrow().token().map(String::from)
    }

    pub fn client(&self) -> &Client { &self.inner.client }

    pub fn api_url(&self) -> &Url { &self.inner.config.api_url }

    pub fn config(&self) -> &Config { &self.inner.config }

    pub fn images(&self) -> &ProfileImageCache { &self.inner.images }

    pub fn storage(&self) -> &dyn Storage { self.inner.storage.as_ref() }

    /// Start a session for `user`.
    pub fn login(
        &self,
        user: UserRecord,
        token: String,
    ) -> Result<(), StorageError> {
        let storage = self.storage();
        storage.set(storage::CURRENT_USER, &serde_json::to_string(&user)?)?;
        storage.set(storage::ACCESS_TOKEN, &token)?;

        self.inner.state.send_modify(|session| {
            session.set_auth(Some(Authenticated {
                user: user.clone(),
                token,
            }))
        });
        log::info!("Logged in as {} ({})", user.email, user.id);

        // even without an image, so stale avatars get cleared
        self.publish_image(&user)
    }

    /// End the session and forget everything that was stored about it.
    pub fn logout(&self) -> Result<(), StorageError> {
        let mut previous = None;
        self.inner.state.send_modify(|session| {
            previous = session.user().map(|user| user.email.clone());
            session.set_auth(None);
        });

        if let Some(email) = previous {
            log::info!("Logged out {}", email);
        }

        self.purge_storage()
    }

    /// Merge a freshly fetched or saved [`Profile`] into the logged in user.
    ///
    /// Returns the updated user, or `None` if nobody is logged in.
    pub fn refresh_profile(
        &self,
        profile: &Profile,
    ) -> Result<Option<UserRecord>, StorageError> {
        self.merge_profile(None, profile)
    }

    /// Like [`SessionStore::refresh_profile()`], but only if the session is
    /// still at `version`. Returns `None` otherwise.
    pub fn refresh_profile_at(
        &self,
        version: u64,
        profile: &Profile,
    ) -> Result<Option<UserRecord>, StorageError> {
        self.merge_profile(Some(version), profile)
    }

    /// Log out, but only if nothing else changed the session since
    /// `version`. Returns whether the session was cleared.
    pub fn logout_at(&self, version: u64) -> Result<bool, StorageError> {
        let mut previous = None;
        let cleared = self.inner.state.send_if_modified(|session| {
            if session.version() != version {
                return false;
            }
            previous = session.user().map(|user| user.email.clone());
            session.set_auth(None);
            true
        });

        if !cleared {
            log::debug!("Not logging out of a session that has since changed");
            return Ok(false);
        }

        if let Some(email) = previous {
            log::info!("Logged out {}", email);
        }
        self.purge_storage()?;

        Ok(true)
    }

    fn merge_profile(
        &self,
        expected_version: Option<u64>,
        profile: &Profile,
    ) -> Result<Option<UserRecord>, StorageError> {
        self.update_user(expected_version, |user| {
            user.name = profile.name.clone();
            user.email = profile.email.clone();
            if let Some(user_type) = profile.user_type {
                user.user_type = user_type;
            }
            if profile.student_id.is_some() {
                user.student_id = profile.student_id.clone();
            }
            user.profile_image = profile.profile_image.clone();
        })
    }

    /// Check the stored credentials against the server.
    ///
    /// Only the first call does anything. The session stops loading once
    /// this returns, whatever the outcome.
    pub async fn validate_session(&self) {
        if self.inner.validated.swap(true, Ordering::SeqCst) {
            log::debug!("The stored session was already validated");
            return;
        }

        self.restore_session().await;

        self.inner.state.send_modify(Session::finish_loading);
    }

    /// Remember (or, with `None`, forget) the email to pre-fill on the login
    /// screen. This survives logging out.
    pub fn remember_login(&self, email: Option<&str>) -> Result<(), StorageError> {
        let storage = self.storage();

        match email {
            Some(email) => {
                storage.set(storage::REMEMBERED_EMAIL, email)?;
                storage.set(storage::REMEMBER_ME, "true")?;
            },
            None => {
                storage.remove(storage::REMEMBERED_EMAIL)?;
                storage.remove(storage::REMEMBER_ME)?;
            },
        }

        Ok(())
    }

    pub fn remembered_login(&self) -> Option<String> {
        let storage = self.storage();

        if storage.get(storage::REMEMBER_ME).as_deref() == Some("true") {
            storage.get(storage::REMEMBERED_EMAIL)
        } else {
            None
        }
    }

    async fn restore_session(&self) {
        let storage = self.storage();

        if let Err(e) = storage::migrate_legacy_keys(storage) {
            log::warn!("Unable to migrate the stored session: {}", e);
        }

        let (raw_user, token) = match (
            storage.get(storage::CURRENT_USER),
            storage.get(storage::ACCESS_TOKEN),
        ) {
            (Some(user), Some(token)) => (user, token),
            (None, None) => {
                log::debug!("There is no stored session");
                return;
            },
            _ => {
                log::warn!("Discarding a half-stored session");
                self.invalidate(self.session().version());
                return;
            },
        };

        let user: UserRecord = match serde_json::from_str(&raw_user) {
            Ok(user) => user,
            Err(e) => {
                log::warn!("Unable to read the stored user: {}", e);
                self.invalidate(self.session().version());
                return;
            },
        };

        let mut version = 0;
        self.inner.state.send_modify(|session| {
            session.set_auth(Some(Authenticated {
                user,
                token: token.clone(),
            }));
            version = session.version();
        });

        let fetched = endpoints::fetch_profile(
            self.client(),
            self.api_url(),
            &token,
        )
        .await;

        match fetched {
            Ok(profile) => {
                let image = profile.profile_image;
                let updated = self.update_user(Some(version), |user| {
                    user.profile_image = image
                });

                match updated {
                    Ok(Some(user)) => {
                        log::info!("Restored the session for {}", user.email)
                    },
                    Ok(None) => log::debug!(
                        "The session changed while it was being validated"
                    ),
                    Err(e) => {
                        log::warn!("Unable to store the refreshed user: {}", e)
                    },
                }
            },
            Err(FetchProfileError::Network(e))
                if self.inner.config.network_error_policy
                    == NetworkErrorPolicy::KeepSession =>
            {
                log::warn!(
                    "Unable to reach the server, keeping the stored session: {}",
                    e
                );
            },
            Err(e) => {
                log::warn!(
                    "The stored session is invalid ({}), logging out: {}",
                    e.code(),
                    e
                );
                self.invalidate(version);
            },
        }
    }

    fn invalidate(&self, version: u64) {
        if let Err(e) = self.logout_at(version) {
            log::warn!("Unable to clear the stored session: {}", e);
        }
    }

    fn purge_storage(&self) -> Result<(), StorageError> {
        let storage = self.storage();

        for key in storage::session_keys() {
            storage.remove(key)?;
        }

        self.inner.images.clear_all()
    }

    /// Apply `change` to the logged in user, persist the result and publish
    /// its image.
    ///
    /// Nothing happens when nobody is logged in or, if `expected_version` is
    /// given, when the session has changed since then.
    fn update_user<F>(
        &self,
        expected_version: Option<u64>,
        change: F,
    ) -> Result<Option<UserRecord>, StorageError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut updated = None;

        self.inner.state.send_if_modified(|session| {
            if expected_version.map_or(false, |v| v != session.version()) {
                return false;
            }
            let auth = match session.auth_mut() {
                Some(auth) => auth,
                None => return false,
            };

            change(&mut auth.user);
            updated = Some(auth.user.clone());
            session.bump();
            true
        });

        let user = match updated {
            Some(user) => user,
            None => return Ok(None),
        };

        self.storage()
            .set(storage::CURRENT_USER, &serde_json::to_string(&user)?)?;
        self.publish_image(&user)?;

        Ok(Some(user))
    }

    fn publish_image(&self, user: &UserRecord) -> Result<(), StorageError> {
        let images = &self.inner.images;
        images.write(Some(user.id), user.profile_image.as_deref())?;
        images.notify_updated(ProfileImageUpdate {
            user_id: Some(user.id),
            profile_image: user.profile_image.clone(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        session::{UserId, UserType},
        storage::MemoryStorage,
    };

    fn user(id: u64, image: Option<&str>) -> UserRecord {
        UserRecord {
            id: UserId::new(id),
            name: String::from("Hong Gildong"),
            email: String::from("hong@example.com"),
            user_type: UserType::Student,
            student_id: Some(String::from("20231234")),
            profile_image: image.map(String::from),
        }
    }

    fn store() -> (Arc<MemoryStorage>, SessionStore) {
        let storage = Arc::new(MemoryStorage::new());
        // nothing in these tests should reach the network
        let config = Config::parse("http://127.0.0.1:9").unwrap();
        let store = SessionStore::new(Client::new(), config, storage.clone());

        (storage, store)
    }

    #[test]
    fn login_persists_the_session() {
        let (storage, store) = store();
        let mut images = store.images().subscribe();

        store
            .login(user(7, Some("color:#ff0000")), String::from("abc"))
            .unwrap();

        let session = store.session();
        assert_eq!(session.user(), Some(&user(7, Some("color:#ff0000"))));
        assert_eq!(session.token(), Some("abc"));
        assert_eq!(storage.get(storage::ACCESS_TOKEN).as_deref(), Some("abc"));
        let stored: UserRecord =
            serde_json::from_str(&storage.get(storage::CURRENT_USER).unwrap())
                .unwrap();
        assert_eq!(stored, user(7, Some("color:#ff0000")));
        assert_eq!(
            store.images().read(Some(UserId::new(7))).as_deref(),
            Some("color:#ff0000")
        );
        assert_eq!(
            images.try_recv(),
            Some(ProfileImageUpdate {
                user_id: Some(UserId::new(7)),
                profile_image: Some(String::from("color:#ff0000")),
            })
        );
    }

    #[test]
    fn login_without_an_image_still_broadcasts() {
        let (_, store) = store();
        let mut images = store.images().subscribe();

        store.login(user(7, None), String::from("abc")).unwrap();

        assert_eq!(
            images.try_recv(),
            Some(ProfileImageUpdate {
                user_id: Some(UserId::new(7)),
                profile_image: None,
            })
        );
    }

    #[test]
    fn logout_removes_every_session_key() {
        let (storage, store) = store();
        storage.set("pendingCourseJoin", "CS101").unwrap();
        storage.set("notificationTarget", "42").unwrap();
        storage.set("returnToCourseboard", "true").unwrap();
        storage.set(storage::LEGACY_TOKEN, "old").unwrap();
        storage.set("userProfileImage", "color:#000000").unwrap();
        store.remember_login(Some("hong@example.com")).unwrap();
        store
            .login(user(7, Some("color:#ff0000")), String::from("abc"))
            .unwrap();

        store.logout().unwrap();

        let session = store.session();
        assert_eq!(session.user(), None);
        assert_eq!(session.token(), None);
        assert_eq!(
            storage.keys(),
            vec![
                String::from(storage::REMEMBER_ME),
                String::from(storage::REMEMBERED_EMAIL),
            ]
        );
        assert_eq!(
            store.remembered_login().as_deref(),
            Some("hong@example.com")
        );
    }

    #[test]
    fn refresh_merges_the_profile() {
        let (storage, store) = store();
        store.login(user(7, None), String::from("abc")).unwrap();
        let profile = Profile {
            id: Some(UserId::new(7)),
            name: String::from("A"),
            email: String::from("b@x.com"),
            user_type: None,
            student_id: None,
            profile_image: Some(String::from("color:#00ff00")),
        };

        let got = store.refresh_profile(&profile).unwrap().unwrap();

        assert_eq!(got.name, "A");
        assert_eq!(got.email, "b@x.com");
        assert_eq!(got.user_type, UserType::Student);
        assert_eq!(got.student_id.as_deref(), Some("20231234"));
        assert_eq!(store.session().user(), Some(&got));
        assert!(storage
            .get(storage::CURRENT_USER)
            .unwrap()
            .contains("color:#00ff00"));
    }

    #[test]
    fn refresh_without_a_session_does_nothing() {
        let (storage, store) = store();
        let profile = Profile {
            id: None,
            name: String::from("A"),
            email: String::from("b@x.com"),
            user_type: None,
            student_id: None,
            profile_image: None,
        };

        assert_eq!(store.refresh_profile(&profile).unwrap(), None);
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn a_stale_refresh_leaves_the_next_session_alone() {
        let (storage, store) = store();
        store.login(user(7, None), String::from("abc")).unwrap();
        let version = store.session().version();
        store.logout().unwrap();
        store.login(user(8, None), String::from("def")).unwrap();
        let profile = Profile {
            id: Some(UserId::new(7)),
            name: String::from("A"),
            email: String::from("b@x.com"),
            user_type: None,
            student_id: None,
            profile_image: Some(String::from("color:#111111")),
        };

        let got = store.refresh_profile_at(version, &profile).unwrap();

        assert_eq!(got, None);
        assert_eq!(store.session().user(), Some(&user(8, None)));
        assert_eq!(store.images().read(Some(UserId::new(8))), None);
        assert!(!storage
            .get(storage::CURRENT_USER)
            .unwrap()
            .contains("color:#111111"));
    }

    #[test]
    fn a_stale_logout_leaves_the_next_session_alone() {
        let (storage, store) = store();
        store.login(user(7, None), String::from("abc")).unwrap();
        let version = store.session().version();
        store.logout().unwrap();
        store.login(user(8, None), String::from("def")).unwrap();

        assert_eq!(store.logout_at(version).unwrap(), false);

        assert_eq!(store.session().token(), Some("def"));
        assert_eq!(storage.get(storage::ACCESS_TOKEN).as_deref(), Some("def"));
    }

    #[test]
    fn a_current_logout_clears_the_session() {
        let (storage, store) = store();
        store.login(user(7, None), String::from("abc")).unwrap();
        let version = store.session().version();

        assert_eq!(store.logout_at(version).unwrap(), true);

        assert!(!store.session().is_logged_in());
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn nothing_stored_means_logged_out() {
        let (_, store) = store();

        store.validate_session().await;

        let session = store.loaded().await;
        assert!(!session.is_loading());
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn malformed_user_json_purges_the_session() {
        let (storage, store) = store();
        storage.set(storage::CURRENT_USER, "{not json").unwrap();
        storage.set(storage::ACCESS_TOKEN, "abc").unwrap();
        storage.set("userProfileImage:7", "color:#ff0000").unwrap();

        store.validate_session().await;

        assert!(!store.session().is_logged_in());
        assert!(!store.session().is_loading());
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn a_token_without_a_user_is_purged() {
        let (storage, store) = store();
        storage.set(storage::ACCESS_TOKEN, "abc").unwrap();

        store.validate_session().await;

        assert!(!store.session().is_logged_in());
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn validation_only_finishes_loading_once() {
        let (_, store) = store();

        store.validate_session().await;
        let version = store.session().version();
        store.validate_session().await;

        assert_eq!(store.session().version(), version);
    }
}
