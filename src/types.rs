use derive_more::{Display, From, Into};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Peloton user identifier, as returned in the `id` field of `/api/me`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Workout identifier (hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct WorkoutId(pub String);

/// Instructor identifier referenced from a workout's `ride.instructor_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct InstructorId(pub String);

impl From<&str> for WorkoutId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Login identity. The password never appears in `Debug` output.
#[derive(Debug)]
pub struct Credentials {
    email: String,
    password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// The single active access/refresh token pair held by a client.
#[derive(Debug)]
pub struct TokenPair {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
}

impl TokenPair {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: refresh_token.map(SecretString::from),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// `None` when the provider issued no refresh token; silent refresh is
    /// then unavailable.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|token| token.expose_secret())
    }
}
