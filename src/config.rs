use url::Url;

/// Where the backend lives when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

const DEFAULT_BROADCAST_CAPACITY: usize = 16;

/// What to do with a stored session when the profile endpoint can't be
/// reached during start up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NetworkErrorPolicy {
    /// Treat the session as invalid and log out.
    Purge,
    /// Keep the stored session. Only a `401` logs the user out.
    KeepSession,
}

impl Default for NetworkErrorPolicy {
    fn default() -> Self { NetworkErrorPolicy::Purge }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: Url,
    /// How many profile image updates a slow listener may fall behind by
    /// before it starts missing them.
    pub broadcast_capacity: usize,
    pub network_error_policy: NetworkErrorPolicy,
}

impl Config {
    pub fn new(api_url: Url) -> Self {
        Config {
            api_url: normalize(api_url),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            network_error_policy: NetworkErrorPolicy::default(),
        }
    }

    pub fn parse(api_url: &str) -> Result<Self, url::ParseError> {
        Url::parse(api_url).map(Config::new)
    }

    pub fn with_network_error_policy(
        mut self,
        policy: NetworkErrorPolicy,
    ) -> Self {
        self.network_error_policy = policy;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        // a constant absolute URL, covered by `default_points_at_localhost`
        Config::parse(DEFAULT_API_URL)
            .expect("The default API URL is always valid")
    }
}

/// Endpoint paths are joined onto the base URL, so it has to end in a `/`.
fn normalize(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_localhost() {
        let got = Config::default();

        assert_eq!(got.api_url.as_str(), "http://localhost:5000/");
        assert_eq!(got.network_error_policy, NetworkErrorPolicy::Purge);
    }

    #[test]
    fn base_paths_keep_their_last_segment() {
        let got = Config::parse("https://allmeet-backend.onrender.com/api")
            .unwrap();

        assert_eq!(
            got.api_url.join("profile/").unwrap().as_str(),
            "https://allmeet-backend.onrender.com/api/profile/"
        );
    }
}
