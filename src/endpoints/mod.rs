//! The All Meet API's endpoints.

mod delete_account;
mod login;
mod password;
mod profile;
mod register;

pub use delete_account::delete_account;
pub use login::{login, Credentials, LoggedIn, LoginError};
pub use password::change_password;
pub use profile::{
    fetch_profile, update_profile, FetchProfileError, Profile, ProfileUpdate,
    ProfileUpdated,
};
pub use register::{register, Registered, RegisterError, Registration};

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use std::fmt::Debug;
use url::Url;

/// Typical endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The HTTP client encountered an error.
    #[error("Unable to send the request")]
    HttpClient(#[from] reqwest::Error),
    #[error("Unable to build the request URL")]
    BadUrl(#[from] url::ParseError),
    /// Unable to parse the JSON in the response.
    #[error("Unable to parse the response")]
    BadResponse(#[from] serde_json::Error),
    /// The server answered, but not with a 2xx.
    #[error("The server responded with {}{}", .status, display_message(.message))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },
}

impl EndpointError {
    /// The message the server gave alongside the failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            EndpointError::Status {
                message: Some(message),
                ..
            } => Some(message),
            _ => None,
        }
    }
}

fn display_message(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {}", message),
        None => String::new(),
    }
}

/// The `{message}` / `{error}` body most endpoints reply with, along with
/// the status it came back with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerReply {
    #[serde(skip)]
    pub status: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Token errors from the auth layer arrive as `{"msg": ...}`.
    #[serde(default, alias = "msg", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerReply {
    /// Did the server accept the request?
    pub fn is_success(&self) -> bool {
        self.status.is_success() && self.error.is_none()
    }

    /// `Ok(message)` if the server accepted the request, otherwise whatever
    /// it said went wrong.
    pub fn into_result(self) -> Result<String, String> {
        if self.is_success() {
            return Ok(self.message.unwrap_or_default());
        }

        match self.text() {
            Some(text) => Err(text.to_string()),
            None => Err(format!("The server responded with {}", self.status)),
        }
    }

    /// Whichever of `error` or `message` the server filled in.
    pub(crate) fn text(&self) -> Option<&str> {
        self.error.as_deref().or_else(|| self.message.as_deref())
    }
}

async fn send<D>(
    client: &Client,
    base_url: &Url,
    method: Method,
    path: &str,
    token: Option<&str>,
    data: Option<&D>,
) -> Result<Response, EndpointError>
where
    D: Debug + serde::Serialize,
{
    let url = base_url.join(path)?;

    log::debug!("Sending a {} request to {}", method, url);
    let mut request = client.request(method, url);

    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    if let Some(data) = data {
        log::trace!("Payload: {:#?}", data);
        request = request.json(data);
    }

    let response = request.send().await?;

    log::trace!("Status: {}", response.status());
    log::trace!("Headers: {:#?}", response.headers());

    Ok(response)
}

/// Read the body of `response` as JSON, failing on anything other than a
/// 2xx status.
async fn parse_success<T>(response: Response) -> Result<T, EndpointError>
where
    T: DeserializeOwned + Debug,
{
    let (status, body) = read_body(response).await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ServerReply>(&body)
            .ok()
            .and_then(|reply| reply.text().map(String::from));
        return Err(EndpointError::Status { status, message });
    }

    let parsed: T = serde_json::from_str(&body)?;
    log::trace!("Parsed response: {:#?}", parsed);

    Ok(parsed)
}

/// Read the body of `response` as a [`ServerReply`] whatever the status, as
/// long as the server actually sent JSON.
async fn parse_reply(response: Response) -> Result<ServerReply, EndpointError> {
    let (status, body) = read_body(response).await?;

    match serde_json::from_str::<ServerReply>(&body) {
        Ok(mut reply) => {
            reply.status = status;
            log::trace!("Parsed response: {:#?}", reply);
            Ok(reply)
        },
        Err(_) if !status.is_success() => Err(EndpointError::Status {
            status,
            message: None,
        }),
        Err(e) => Err(e.into()),
    }
}

async fn read_body(
    response: Response,
) -> Result<(StatusCode, String), EndpointError> {
    let status = response.status();
    let body = response.text().await?;
    log::trace!("Response: {}", body);

    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_with_an_error_is_an_err() {
        let reply: ServerReply =
            serde_json::from_str(r#"{"error": "Current password is incorrect"}"#)
                .unwrap();

        assert_eq!(
            reply.into_result(),
            Err(String::from("Current password is incorrect"))
        );
    }

    #[test]
    fn reply_with_a_message_is_ok() {
        let reply: ServerReply =
            serde_json::from_str(r#"{"message": "Password changed"}"#).unwrap();

        assert_eq!(reply.into_result(), Ok(String::from("Password changed")));
    }

    #[test]
    fn a_failed_status_is_an_err_even_with_a_message() {
        let mut reply: ServerReply =
            serde_json::from_str(r#"{"message": "Internal error"}"#).unwrap();
        reply.status = StatusCode::INTERNAL_SERVER_ERROR;

        assert!(!reply.is_success());
        assert_eq!(reply.into_result(), Err(String::from("Internal error")));
    }

    #[test]
    fn token_errors_are_read_from_msg() {
        let mut reply: ServerReply =
            serde_json::from_str(r#"{"msg": "Token has expired"}"#).unwrap();
        reply.status = StatusCode::UNAUTHORIZED;

        assert_eq!(reply.error.as_deref(), Some("Token has expired"));
        assert_eq!(reply.into_result(), Err(String::from("Token has expired")));
    }

    #[test]
    fn a_failed_status_without_a_body_mentions_the_status() {
        let reply = ServerReply {
            status: StatusCode::BAD_GATEWAY,
            ..ServerReply::default()
        };

        assert_eq!(
            reply.into_result(),
            Err(String::from("The server responded with 502 Bad Gateway"))
        );
    }

    #[test]
    fn status_errors_mention_the_server_message() {
        let err = EndpointError::Status {
            status: StatusCode::BAD_REQUEST,
            message: Some(String::from("Email already in use")),
        };

        assert_eq!(
            err.to_string(),
            "The server responded with 400 Bad Request: Email already in use"
        );
        assert_eq!(err.server_message(), Some("Email already in use"));
    }
}
