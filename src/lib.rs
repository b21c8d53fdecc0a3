//! Session, profile and account management for the All Meet API.

#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod account;
pub mod config;
pub mod endpoints;
pub mod profile_image;
mod session;
pub mod storage;
mod store;

pub use account::{AccountError, AccountManager, LoadOutcome, ProfileForm};
pub use config::{Config, NetworkErrorPolicy};
pub use profile_image::{
    ProfileImage, ProfileImageCache, ProfileImageListener, ProfileImageUpdate,
};
pub use session::{Authenticated, Session, UserId, UserRecord, UserType};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use store::SessionStore;

/// The default user agent to use when communicating with the All Meet
/// server.
pub const DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));
