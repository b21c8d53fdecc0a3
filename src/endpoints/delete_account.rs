use super::{EndpointError, ServerReply};
use reqwest::{Client, Method};
use serde_derive::Serialize;
use std::fmt::{self, Debug, Formatter};
use url::Url;

/// Permanently delete the logged in user's account.
///
/// The server wants the user's identifier and password again before it'll
/// go through with it.
pub async fn delete_account(
    client: &Client,
    base_url: &Url,
    token: &str,
    identifier: &str,
    password: &str,
) -> Result<ServerReply, EndpointError> {
    let data = Data {
        identifier,
        password,
    };
    let response = super::send(
        client,
        base_url,
        Method::DELETE,
        "profile/delete",
        Some(token),
        Some(&data),
    )
    .await?;

    super::parse_reply(response).await
}

#[derive(Copy, Clone, Serialize)]
struct Data<'a> {
    identifier: &'a str,
    password: &'a str,
}

impl Debug for Data<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}
