#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Login or token refresh could not produce a usable access token.
    #[error("Authentication error: {0}")]
    Authentication(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// An API call returned a non-success status after at most one retry.
    #[error("{operation} failed with status {status}: {detail}")]
    Status {
        operation: &'static str,
        status: u16,
        detail: String,
    },
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Configuration error: {0}")]
    Config(String),
    /// A user-scoped call ran before the profile supplied a user id.
    #[error("user id unknown, fetch the profile first")]
    UnknownUser,
}

impl Error {
    /// True for failures worth retrying later: timeouts and connection errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// True when the provider rejected the credentials or tokens.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::Status { status: 401, .. }
        )
    }
}
