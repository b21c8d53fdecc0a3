use super::{EndpointError, ServerReply};
use crate::session::{UserRecord, UserType};
use reqwest::{Client, Method, StatusCode};
use serde_derive::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use url::Url;

const DEFAULT_REJECTION: &str = "Registration failed. Please try again.";
const PASSWORD_MISMATCH: &str = "Passwords do not match.";

/// Create a new account.
pub async fn register(
    client: &Client,
    base_url: &Url,
    registration: &Registration,
) -> Result<Registered, RegisterError> {
    let response = super::send(
        client,
        base_url,
        Method::POST,
        "auth/register",
        None,
        Some(registration),
    )
    .await?;

    let status = response.status();
    let body = response.text().await.map_err(EndpointError::from)?;
    log::trace!("Response: {}", body);

    if status.is_success() {
        let registered: Registered =
            serde_json::from_str(&body).map_err(EndpointError::from)?;
        log::info!("Registered {}", registered.user.email);

        return Ok(registered);
    }

    let message = serde_json::from_str::<ServerReply>(&body)
        .ok()
        .and_then(|reply| reply.text().map(String::from))
        .unwrap_or_else(|| String::from(DEFAULT_REJECTION));
    log::error!("Registration failed with {}: {}", status, message);

    Err(RegisterError::Rejected { status, message })
}

/// Everything the sign up form collects.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub user_type: UserType,
}

impl Registration {
    /// Check the form before anything is sent to the server.
    pub fn validate(&self, confirm_password: &str) -> Result<(), RegisterError> {
        if self.password != confirm_password {
            return Err(RegisterError::Invalid(PASSWORD_MISMATCH));
        }

        Ok(())
    }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("student_id", &self.student_id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_type", &self.user_type)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registered {
    #[serde(default)]
    pub message: String,
    pub user: UserRecord,
}

/// Possible errors that may be returned by [`register()`].
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("Unable to send the registration request")]
    Endpoint(#[from] EndpointError),
    /// The form was rejected before anything was sent.
    #[error("{0}")]
    Invalid(&'static str),
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}
