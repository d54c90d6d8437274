use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::models::{Instructor, InstructorRef, UserProfile, UserSettings, WorkoutPage, WorkoutRecord};
use crate::oauth::AuthClient;
use crate::types::{Credentials, InstructorId, TokenPair, UserId, WorkoutId};

/// Sampling interval used for the performance graphs attached by
/// [`PelotonClient::fetch_recent_workouts`].
pub const DEFAULT_SAMPLING_INTERVAL: i64 = 50;

const PLATFORM_HEADER: HeaderName = HeaderName::from_static("peloton-platform");

/// Authenticated Peloton API session.
///
/// Owns the credentials, the single active [`TokenPair`] and the API HTTP
/// client. Every call that may refresh the token pair takes `&mut self`, so
/// one client serves one caller at a time; share it behind a mutex if needed.
///
/// ```rust,ignore
/// use peloton_client::{Credentials, PelotonClient};
///
/// let mut client = PelotonClient::login(Credentials::new(email, password)).await?;
/// let workouts = client.fetch_recent_workouts(1).await?;
/// ```
pub struct PelotonClient {
    auth: AuthClient,
    http: reqwest::Client,
    credentials: Credentials,
    tokens: TokenPair,
    user_id: Option<UserId>,
    username: Option<String>,
}

impl PelotonClient {
    /// Logs in against Peloton production.
    ///
    /// # Errors
    ///
    /// See [`login_with_config`](Self::login_with_config).
    pub async fn login(credentials: Credentials) -> Result<Self, Error> {
        Self::login_with_config(credentials, ClientConfig::default()).await
    }

    /// Logs in, then fetches the profile to cache the user id and username.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] for rejected credentials or a failed
    /// code exchange, [`Error::Http`] on transport failures, and
    /// [`Error::Status`] if the profile liveness check fails.
    pub async fn login_with_config(
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self, Error> {
        let http = api_client(&config)?;
        let auth = AuthClient::new(config)?;
        let tokens = auth.login(&credentials).await?;

        let mut client = Self {
            auth,
            http,
            credentials,
            tokens,
            user_id: None,
            username: None,
        };
        client.fetch_profile().await?;
        Ok(client)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        self.auth.config()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    /// User id cached by the last profile fetch.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Replaces the token pair using the refresh token.
    ///
    /// The current pair is kept if the refresh fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if no refresh token is held or the
    /// provider rejects it.
    pub async fn refresh(&mut self) -> Result<(), Error> {
        self.tokens = self.auth.refresh(&self.tokens).await?;
        tracing::debug!("Peloton access token refreshed");
        Ok(())
    }

    /// Runs the full login again with the stored credentials.
    ///
    /// For callers recovering from a failed refresh; the client never does
    /// this on its own.
    ///
    /// # Errors
    ///
    /// Same as [`login_with_config`](Self::login_with_config).
    pub async fn relogin(&mut self) -> Result<(), Error> {
        self.tokens = self.auth.login(&self.credentials).await?;
        self.fetch_profile().await?;
        Ok(())
    }

    /// Fetches `/api/me` and updates the cached user id and username.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] on a non-success response.
    pub async fn fetch_profile(&mut self) -> Result<UserProfile, Error> {
        let url = self.config().api_url("api/me")?;
        let profile: UserProfile = self.get_json("profile fetch", url).await?;
        self.user_id = Some(profile.id.clone());
        self.username.clone_from(&profile.username);
        Ok(profile)
    }

    /// Fetches the user's preferences (distance unit and friends).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] on a non-success response.
    pub async fn fetch_settings(&mut self) -> Result<UserSettings, Error> {
        let user_id = self.require_user_id()?;
        let url = self.config().api_url(&format!("api/user/{user_id}/settings"))?;
        self.get_json("settings fetch", url).await
    }

    /// Lists the `count` most recent workouts, newest first, each with its
    /// performance graph and instructor name attached.
    ///
    /// A failed instructor lookup leaves `instructor_name` empty instead of
    /// failing the whole fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] if the list, a workout detail or a
    /// performance graph cannot be fetched.
    pub async fn fetch_recent_workouts(&mut self, count: u32) -> Result<Vec<WorkoutRecord>, Error> {
        let user_id = self.require_user_id()?;
        let mut url = self.config().api_url(&format!("api/user/{user_id}/workouts"))?;
        url.query_pairs_mut()
            .append_pair("limit", &count.to_string())
            .append_pair("sort_by", "-created");

        let page: WorkoutPage = self.get_json("workout list fetch", url).await?;

        let mut workouts = Vec::with_capacity(page.data.len());
        for summary in page.data {
            let url = self.config().api_url(&format!("api/workout/{}", summary.id))?;
            let mut workout: WorkoutRecord = self.get_json("workout fetch", url).await?;
            workout.performance_graph = self
                .fetch_workout_metrics(&summary.id, DEFAULT_SAMPLING_INTERVAL)
                .await?;
            workout.instructor_name = self.resolve_instructor_name(&workout).await;
            workouts.push(workout);
        }
        Ok(workouts)
    }

    /// Fetches the performance graph of one workout.
    ///
    /// The server down-samples to one point every `sampling_interval`
    /// seconds; a non-positive interval requests full resolution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] on a non-success response.
    pub async fn fetch_workout_metrics(
        &mut self,
        workout_id: &WorkoutId,
        sampling_interval: i64,
    ) -> Result<Value, Error> {
        let mut url = self
            .config()
            .api_url(&format!("api/workout/{workout_id}/performance_graph"))?;
        if sampling_interval > 0 {
            url.query_pairs_mut()
                .append_pair("every_n", &sampling_interval.to_string());
        }
        self.get_json("performance graph fetch", url).await
    }

    async fn resolve_instructor_name(&mut self, workout: &WorkoutRecord) -> Option<String> {
        match workout.instructor_ref() {
            InstructorRef::Lookup(id) => match self.fetch_instructor_name(&id).await {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        workout_id = %workout.id,
                        instructor_id = %id,
                        "Instructor lookup failed"
                    );
                    None
                }
            },
            InstructorRef::Embedded(name) => name,
            InstructorRef::Missing => None,
        }
    }

    async fn fetch_instructor_name(&mut self, id: &InstructorId) -> Result<Option<String>, Error> {
        let url = self.config().api_url(&format!("api/instructor/{id}"))?;
        let instructor: Instructor = self.get_json("instructor fetch", url).await?;
        Ok(instructor.name)
    }

    fn require_user_id(&self) -> Result<UserId, Error> {
        self.user_id.clone().ok_or(Error::UnknownUser)
    }

    /// Authenticated GET with one refresh-and-retry on 401.
    async fn get_json<T: DeserializeOwned>(
        &mut self,
        operation: &'static str,
        url: Url,
    ) -> Result<T, Error> {
        let mut response = self.send_authorized(url.clone()).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(operation, "access token rejected, refreshing once");
            self.refresh().await?;
            response = self.send_authorized(url).await?;
        }
        let response = ensure_success(response, operation).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_authorized(&self, url: Url) -> Result<reqwest::Response, Error> {
        Ok(self
            .http
            .get(url)
            .bearer_auth(self.tokens.access_token())
            .send()
            .await?)
    }
}

impl std::fmt::Debug for PelotonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PelotonClient")
            .field("email", &self.credentials.email())
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn api_client(config: &ClientConfig) -> Result<reqwest::Client, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        PLATFORM_HEADER,
        HeaderValue::from_str(&config.platform)
            .map_err(|e| Error::Config(format!("platform header: {e}")))?,
    );

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .build()?)
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let detail = response.text().await.unwrap_or_default();
    Err(Error::Status {
        operation,
        status,
        detail,
    })
}
