use super::{EndpointError, ServerReply};
use reqwest::{Client, Method};
use serde_derive::Serialize;
use std::fmt::{self, Debug, Formatter};
use url::Url;

/// Ask the server to change the logged in user's password.
///
/// This doesn't check the new password against any policy, and whatever
/// the server says (success or not) comes back as a [`ServerReply`].
pub async fn change_password(
    client: &Client,
    base_url: &Url,
    token: &str,
    current_password: &str,
    new_password: &str,
) -> Result<ServerReply, EndpointError> {
    let data = Data {
        current_password,
        new_password,
    };
    let response = super::send(
        client,
        base_url,
        Method::PUT,
        "profile/password",
        Some(token),
        Some(&data),
    )
    .await?;

    super::parse_reply(response).await
}

#[derive(Copy, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Data<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

impl Debug for Data<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("current_password", &"<redacted>")
            .field("new_password", &"<redacted>")
            .finish()
    }
}
