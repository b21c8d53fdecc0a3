use serde_derive::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// The numeric identifier the backend assigns to every user.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub const fn new(id: u64) -> Self { UserId(id) }

    pub const fn get(self) -> u64 { self.0 }
}

impl From<u64> for UserId {
    fn from(id: u64) -> UserId { UserId(id) }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<UserId, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Student,
    Professor,
}

/// The logged in user, as persisted under `currentUser`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(alias = "userType")]
    pub user_type: UserType,
    #[serde(
        default,
        alias = "studentId",
        skip_serializing_if = "Option::is_none"
    )]
    pub student_id: Option<String>,
    #[serde(
        default,
        alias = "profileImage",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_image: Option<String>,
}

/// A user together with the bearer token that proves who they are.
///
/// Keeping both in one value means a [`Session`] can never hold a user
/// without a token or a token without a user.
#[derive(Clone, PartialEq)]
pub struct Authenticated {
    pub user: UserRecord,
    pub token: String,
}

impl fmt::Debug for Authenticated {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticated")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Who is logged in right now.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    auth: Option<Authenticated>,
    is_loading: bool,
    version: u64,
}

impl Session {
    /// The state a fresh store starts in, before the stored credentials
    /// have been checked.
    pub(crate) fn booting() -> Self {
        Session {
            auth: None,
            is_loading: true,
            version: 0,
        }
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.auth.as_ref().map(|a| &a.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.token.as_str())
    }

    pub fn authenticated(&self) -> Option<&Authenticated> {
        self.auth.as_ref()
    }

    pub fn is_logged_in(&self) -> bool { self.auth.is_some() }

    /// While this is `true` callers must not decide the user is logged out
    /// (e.g. redirect to the login screen).
    pub fn is_loading(&self) -> bool { self.is_loading }

    /// Incremented on every change.
    pub fn version(&self) -> u64 { self.version }

    pub(crate) fn set_auth(&mut self, auth: Option<Authenticated>) {
        self.auth = auth;
        self.version += 1;
    }

    pub(crate) fn auth_mut(&mut self) -> Option<&mut Authenticated> {
        self.auth.as_mut()
    }

    pub(crate) fn bump(&mut self) { self.version += 1; }

    pub(crate) fn finish_loading(&mut self) {
        self.is_loading = false;
        self.version += 1;
    }
}
