//! The "my page" screen: view and edit the logged in user's profile, change
//! their password, or delete their account.

use crate::{
    endpoints::{
        self, EndpointError, FetchProfileError, Profile, ProfileUpdate,
        ServerReply,
    },
    profile_image::ProfileImage,
    session::UserType,
    storage::StorageError,
    SessionStore,
};
use tokio_util::sync::CancellationToken;

pub const MIN_PASSWORD_LENGTH: usize = 8;

const PASSWORD_MISMATCH: &str = "New passwords do not match.";
const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters.";
const MISSING_CONFIRMATION: &str =
    "Enter your username and password to confirm.";

/// The values shown in (and edited through) the profile form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileForm {
    pub name: String,
    pub email: String,
    pub student_id: Option<String>,
    pub user_type: Option<UserType>,
    pub profile_image: Option<String>,
}

impl ProfileForm {
    fn fill(&mut self, profile: &Profile) {
        self.name = profile.name.clone();
        self.email = profile.email.clone();
        self.student_id = profile.student_id.clone();
        self.user_type = profile.user_type;
        self.profile_image = profile.profile_image.clone();
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// The view went away, or the session changed, before the profile
    /// arrived, so it was dropped on the floor.
    Discarded,
}

#[derive(Debug)]
pub struct AccountManager {
    store: SessionStore,
    form: ProfileForm,
}

impl AccountManager {
    /// Start from whatever the session already knows about the user.
    pub fn new(store: SessionStore) -> Self {
        let form = match store.session().user() {
            Some(user) => ProfileForm {
                name: user.name.clone(),
                email: user.email.clone(),
                student_id: user.student_id.clone(),
                user_type: Some(user.user_type),
                profile_image: store.images().read(Some(user.id)),
            },
            None => ProfileForm::default(),
        };

        AccountManager { store, form }
    }

    pub fn form(&self) -> &ProfileForm { &self.form }

    pub fn form_mut(&mut self) -> &mut ProfileForm { &mut self.form }

    /// The image to show, interpreted.
    pub fn profile_image(&self) -> Option<ProfileImage> {
        self.form.profile_image.as_deref().map(ProfileImage::parse)
    }

    pub fn select_image<S: Into<String>>(&mut self, url: S) {
        self.form.profile_image = Some(url.into());
    }

    pub fn select_color(&mut self, hex: &str) {
        self.form.profile_image = Some(ProfileImage::color(hex).to_string());
    }

    pub fn clear_image(&mut self) { self.form.profile_image = None; }

    /// Load the latest profile from the server.
    ///
    /// The request isn't aborted when `cancel` fires, but once it's been
    /// cancelled nothing the request returns is applied, errors included.
    /// The same goes for a session that was replaced while the request was
    /// in flight.
    pub async fn load(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<LoadOutcome, AccountError> {
        let (token, version) = self.credentials()?;

        let fetched = endpoints::fetch_profile(
            self.store.client(),
            self.store.api_url(),
            &token,
        )
        .await;

        if cancel.is_cancelled() {
            log::debug!("Discarding a profile that arrived after the view closed");
            return Ok(LoadOutcome::Discarded);
        }

        match fetched {
            Ok(profile) => {
                let refreshed =
                    self.store.refresh_profile_at(version, &profile)?;
                if refreshed.is_none() {
                    log::debug!("Discarding a profile for an older session");
                    return Ok(LoadOutcome::Discarded);
                }
                self.form.fill(&profile);
                Ok(LoadOutcome::Applied)
            },
            Err(FetchProfileError::Unauthorized) => {
                if !self.store.logout_at(version)? {
                    return Ok(LoadOutcome::Discarded);
                }
                log::warn!("The server no longer accepts our token, logged out");
                Err(AccountError::Unauthorized)
            },
            Err(FetchProfileError::Network(e)) => Err(AccountError::Network(e)),
        }
    }

    /// Send the form to the server.
    pub async fn save(&mut self) -> Result<String, AccountError> {
        let (token, version) = self.credentials()?;
        let update = ProfileUpdate {
            name: self.form.name.clone(),
            email: self.form.email.clone(),
            profile_image: self.form.profile_image.clone(),
        };

        let updated = endpoints::update_profile(
            self.store.client(),
            self.store.api_url(),
            &token,
            &update,
        )
        .await
        .map_err(AccountError::from_endpoint)?;

        // the image the user picked wins over whatever the server echoed
        let mut profile = updated.profile;
        profile.profile_image = update.profile_image;
        if self.store.refresh_profile_at(version, &profile)?.is_some() {
            self.form.fill(&profile);
        } else {
            log::debug!("The session changed while the profile was saving");
        }

        Ok(updated.message)
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<String, AccountError> {
        check_new_password(new_password, confirm_password)?;
        let token = self.token()?;

        let reply = endpoints::change_password(
            self.store.client(),
            self.store.api_url(),
            &token,
            current_password,
            new_password,
        )
        .await
        .map_err(AccountError::from_endpoint)?;

        settle(reply)
    }

    /// Delete the account and, if that worked, log out.
    pub async fn delete_account(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<String, AccountError> {
        if identifier.trim().is_empty() || password.is_empty() {
            return Err(AccountError::Invalid(MISSING_CONFIRMATION));
        }
        let token = self.token()?;

        let reply = endpoints::delete_account(
            self.store.client(),
            self.store.api_url(),
            &token,
            identifier,
            password,
        )
        .await
        .map_err(AccountError::from_endpoint)?;

        let message = settle(reply)?;
        log::info!("Deleted the account for {}", identifier);
        self.store.logout()?;

        Ok(message)
    }

    fn token(&self) -> Result<String, AccountError> {
        self.store.token().ok_or(AccountError::NotLoggedIn)
    }

    /// The token to send along with the session version it belongs to.
    fn credentials(&self) -> Result<(String, u64), AccountError> {
        let session = self.store.session();
        let token = session.token().ok_or(AccountError::NotLoggedIn)?;

        Ok((token.to_string(), session.version()))
    }
}

/// Turn a raw reply into the message to show, failing on anything but a 2xx.
fn settle(reply: ServerReply) -> Result<String, AccountError> {
    if reply.is_success() {
        return Ok(reply.message.unwrap_or_default());
    }

    match reply.text() {
        Some(text) => Err(AccountError::Rejected(text.to_string())),
        None => Err(AccountError::Network(EndpointError::Status {
            status: reply.status,
            message: None,
        })),
    }
}

/// The checks a new password has to pass before it's sent anywhere.
pub fn check_new_password(
    new_password: &str,
    confirm_password: &str,
) -> Result<(), AccountError> {
    if new_password != confirm_password {
        return Err(AccountError::Invalid(PASSWORD_MISMATCH));
    }
    if new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AccountError::Invalid(PASSWORD_TOO_SHORT));
    }

    Ok(())
}

/// Something went wrong on the account screen. The `Display` output is meant
/// for the user.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("Please log in first.")]
    NotLoggedIn,
    #[error("Your session has expired. Please log in again.")]
    Unauthorized,
    /// The server understood the request and said no.
    #[error("{0}")]
    Rejected(String),
    #[error("Unable to reach the server. Please try again.")]
    Network(#[source] EndpointError),
    #[error("Unable to save your session on this device")]
    Storage(#[from] StorageError),
}

impl AccountError {
    fn from_endpoint(e: EndpointError) -> Self {
        match e.server_message() {
            Some(message) => AccountError::Rejected(message.to_string()),
            None => AccountError::Network(e),
        }
    }
}
