use super::EndpointError;
use crate::session::UserRecord;
use reqwest::{Client, Method, StatusCode};
use serde_derive::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};
use url::Url;

const DEFAULT_REJECTION: &str = "Login failed. Please try again.";

/// Exchange a username and password for an access token.
///
/// This only talks to the server. Hand the result to
/// [`SessionStore::login()`](crate::SessionStore::login) to actually start a
/// session.
pub async fn login(
    client: &Client,
    base_url: &Url,
    credentials: &Credentials,
) -> Result<LoggedIn, LoginError> {
    let response = super::send(
        client,
        base_url,
        Method::POST,
        "auth/login",
        None,
        Some(credentials),
    )
    .await?;

    let status = response.status();
    let body = response.text().await.map_err(EndpointError::from)?;
    log::trace!("Response: {}", body);

    let doc: LoginResponse =
        serde_json::from_str(&body).map_err(EndpointError::from)?;
    log::trace!("Parsed response: {:#?}", doc);

    interpret_response(status, doc)
}

fn interpret_response(
    status: StatusCode,
    response: LoginResponse,
) -> Result<LoggedIn, LoginError> {
    match response {
        LoginResponse {
            access_token: Some(access_token),
            user: Some(user),
            ..
        } => {
            log::debug!("Logged in as {}", user.email);

            Ok(LoggedIn { access_token, user })
        },
        LoginResponse { message, .. } => {
            let message =
                message.unwrap_or_else(|| String::from(DEFAULT_REJECTION));
            log::error!("Login failed with {}: {}", status, message);

            Err(LoginError::Rejected { status, message })
        },
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U, P>(username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A successful login.
#[derive(Clone, PartialEq)]
pub struct LoggedIn {
    pub access_token: String,
    pub user: UserRecord,
}

impl Debug for LoggedIn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggedIn")
            .field("access_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<UserRecord>,
    #[serde(default)]
    message: Option<String>,
}

/// Possible errors that may be returned by [`login()`].
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Unable to send the login request")]
    Endpoint(#[from] EndpointError),
    /// The server refused the credentials.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}
