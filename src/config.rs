use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_AUTH_BASE: &str = "https://auth.onepeloton.com/";
const DEFAULT_API_BASE: &str = "https://api.onepeloton.com/";
const DEFAULT_CLIENT_ID: &str = "WVoJxVDdPoFx4RNewvvg6ch2mZ7bwnsM";
const DEFAULT_REDIRECT_URI: &str = "https://members.onepeloton.com/callback";
const DEFAULT_AUDIENCE: &str = "https://api.onepeloton.com/";
const DEFAULT_SCOPES: [&str; 3] = ["offline_access", "openid", "peloton-api.members:default"];
// base64 of {"name":"auth0.js-ulp","version":"9.14.3"}
const DEFAULT_AUTH0_CLIENT: &str = "eyJuYW1lIjoiYXV0aDAuanMtdWxwIiwidmVyc2lvbiI6IjkuMTQuMyJ9";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints, OAuth identifiers and timeouts used by the client.
///
/// The defaults target Peloton production. Tests and proxies override the
/// hosts with [`with_auth_base`](ClientConfig::with_auth_base) and
/// [`with_api_base`](ClientConfig::with_api_base).
///
/// ```rust,ignore
/// use peloton_client::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_timeout(std::time::Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) auth_base: Url,
    pub(crate) api_base: Url,
    pub(crate) client_id: String,
    pub(crate) redirect_uri: Url,
    pub(crate) audience: String,
    pub(crate) scopes: Vec<String>,
    pub(crate) tenant: String,
    pub(crate) connection: String,
    pub(crate) auth0_client: String,
    pub(crate) platform: String,
    pub(crate) timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auth_base: DEFAULT_AUTH_BASE.parse().expect("valid default URL"),
            api_base: DEFAULT_API_BASE.parse().expect("valid default URL"),
            client_id: DEFAULT_CLIENT_ID.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.parse().expect("valid default URL"),
            audience: DEFAULT_AUDIENCE.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            tenant: "peloton-prod".into(),
            connection: "pelo-user-password".into(),
            auth0_client: DEFAULT_AUTH0_CLIENT.into(),
            platform: "web".into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// # Optional env vars
    /// - `PELOTON_AUTH_URL`: Override the authorization host
    /// - `PELOTON_API_URL`: Override the API host
    /// - `PELOTON_CLIENT_ID`: Override the OAuth2 client ID
    /// - `PELOTON_TIMEOUT_SECS`: Per-request timeout in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL or the timeout cannot be parsed.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();

        if let Ok(url_str) = std::env::var("PELOTON_AUTH_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("PELOTON_AUTH_URL: {e}")))?;
            config = config.with_auth_base(url);
        }
        if let Ok(url_str) = std::env::var("PELOTON_API_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("PELOTON_API_URL: {e}")))?;
            config = config.with_api_base(url);
        }
        if let Ok(client_id) = std::env::var("PELOTON_CLIENT_ID") {
            config = config.with_client_id(client_id);
        }
        if let Ok(secs) = std::env::var("PELOTON_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("PELOTON_TIMEOUT_SECS: {e}")))?;
            if secs == 0 {
                return Err(Error::Config("PELOTON_TIMEOUT_SECS must be positive".into()));
            }
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Override the authorization host (default `https://auth.onepeloton.com/`).
    #[must_use]
    pub fn with_auth_base(mut self, url: Url) -> Self {
        self.auth_base = with_trailing_slash(url);
        self
    }

    /// Override the API host (default `https://api.onepeloton.com/`).
    #[must_use]
    pub fn with_api_base(mut self, url: Url) -> Self {
        self.api_base = with_trailing_slash(url);
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, url: Url) -> Self {
        self.redirect_uri = url;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn auth_base(&self) -> &Url {
        &self.auth_base
    }

    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Space-separated scope string as sent to the provider.
    pub(crate) fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    pub(crate) fn authorize_url(&self) -> Result<Url, Error> {
        Ok(self.auth_base.join("authorize")?)
    }

    pub(crate) fn login_url(&self) -> Result<Url, Error> {
        Ok(self.auth_base.join("usernamepassword/login")?)
    }

    pub(crate) fn token_url(&self) -> Result<Url, Error> {
        Ok(self.auth_base.join("oauth/token")?)
    }

    /// `Origin` header value for credential submission.
    pub(crate) fn auth_origin(&self) -> String {
        self.auth_base.origin().ascii_serialization()
    }

    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.api_base.join(path.trim_start_matches('/'))?)
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
