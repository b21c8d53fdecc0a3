use super::EndpointError;
use crate::session::{UserId, UserType};
use reqwest::{Client, Method, StatusCode};
use serde_derive::{Deserialize, Serialize};
use url::Url;

/// The profile resource as the server describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: Option<UserId>,
    pub name: String,
    pub email: String,
    #[serde(default, alias = "userType")]
    pub user_type: Option<UserType>,
    #[serde(default, alias = "studentId")]
    pub student_id: Option<String>,
    #[serde(default, alias = "profileImage")]
    pub profile_image: Option<String>,
}

/// Fetch the logged in user's profile.
///
/// A `401` is reported as [`FetchProfileError::Unauthorized`] so callers can
/// tell "log in again" apart from everything else that can go wrong.
pub async fn fetch_profile(
    client: &Client,
    base_url: &Url,
    token: &str,
) -> Result<Profile, FetchProfileError> {
    let response = super::send(
        client,
        base_url,
        Method::GET,
        "profile/",
        Some(token),
        None::<&()>,
    )
    .await?;

    if response.status() == StatusCode::UNAUTHORIZED {
        log::debug!("The profile endpoint rejected our token");
        return Err(FetchProfileError::Unauthorized);
    }

    let doc: ProfileDocument = super::parse_success(response).await?;

    Ok(doc.profile)
}

/// Possible errors that may be returned by [`fetch_profile()`].
#[derive(Debug, thiserror::Error)]
pub enum FetchProfileError {
    /// The token was rejected (`401`).
    #[error("The session is no longer valid")]
    Unauthorized,
    /// Any other failure, from a dropped connection to a `500`.
    #[error("Unable to fetch the profile")]
    Network(#[from] EndpointError),
}

impl FetchProfileError {
    /// The tag the web client uses for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            FetchProfileError::Unauthorized => "UNAUTHORIZED",
            FetchProfileError::Network(_) => "NETWORK_ERROR",
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchProfileError::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            FetchProfileError::Network(EndpointError::Status {
                status, ..
            }) => Some(*status),
            FetchProfileError::Network(_) => None,
        }
    }
}

/// The editable part of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub profile_image: Option<String>,
}

/// Save changes to the logged in user's profile.
pub async fn update_profile(
    client: &Client,
    base_url: &Url,
    token: &str,
    update: &ProfileUpdate,
) -> Result<ProfileUpdated, EndpointError> {
    let response = super::send(
        client,
        base_url,
        Method::PUT,
        "profile/",
        Some(token),
        Some(update),
    )
    .await?;

    let updated: ProfileUpdated = super::parse_success(response).await?;
    log::info!("Updated the profile for {}", updated.profile.email);

    Ok(updated)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    #[serde(default)]
    pub message: String,
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProfileDocument {
    profile: Profile,
}
