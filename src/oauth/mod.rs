//! Auth0 login for Peloton: Authorization Code + PKCE, driven headlessly.
//!
//! The flow mirrors what the Peloton web login page does in a browser:
//!
//! 1. `GET /authorize` with the PKCE challenge, collecting cookies.
//! 2. Read the `_csrf` cookie.
//! 3. `POST /usernamepassword/login` with the credentials.
//! 4. Take the authorization code from the `Location` header, or replay the
//!    returned callback form and walk its redirect chain until one carries it.
//! 5. Exchange the code at `/oauth/token`.

mod csrf;
mod form;

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::pkce::{self, PkceChallenge};
use crate::types::{Credentials, TokenPair};

use form::{CallbackForm, CodeSource, code_param, redirect_target};

/// Upper bound on redirects walked after replaying the callback form.
pub const MAX_CALLBACK_REDIRECTS: usize = 10;

/// Redirects reqwest may follow from `/authorize` to the login page.
pub const MAX_AUTHORIZE_REDIRECTS: usize = 10;

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Token endpoint response. Either token may be missing.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Builds the new token pair, keeping `previous_refresh` when the
    /// response carries no refresh token.
    fn into_tokens(
        self,
        previous_refresh: Option<&str>,
        operation: &str,
    ) -> Result<TokenPair, Error> {
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Authentication(format!("no access_token in {operation} response")))?;
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_owned));
        Ok(TokenPair::new(access_token, refresh_token))
    }
}

#[derive(Serialize)]
struct CredentialSubmission<'a> {
    client_id: &'a str,
    redirect_uri: &'a str,
    tenant: &'a str,
    response_type: &'static str,
    scope: &'a str,
    audience: &'a str,
    state: &'a str,
    nonce: &'a str,
    connection: &'a str,
    username: &'a str,
    password: &'a str,
    #[serde(rename = "_csrf")]
    csrf: &'a str,
    #[serde(rename = "_intstate")]
    intstate: &'static str,
    code_challenge: &'a str,
    code_challenge_method: &'static str,
}

#[derive(Serialize)]
struct CodeExchange<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    code_verifier: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

/// Performs logins and token refreshes against the Peloton authorization host.
pub struct AuthClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl AuthClient {
    /// Create a new auth client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client for token endpoint calls.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs the full login flow and returns the issued token pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] when the provider rejects the
    /// credentials or no authorization code or access token can be obtained,
    /// and [`Error::Http`] on transport failures.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, Error> {
        let session = LoginSession::new(&self.config)?;
        let challenge = PkceChallenge::generate();
        let nonce = pkce::generate_state();

        let landing = session.authorize(&challenge, &pkce::generate_state(), &nonce).await?;
        let state = adopted_state(&landing.url, landing.state);

        let csrf = session.csrf_token(&landing.url)?;
        let response = session
            .submit_credentials(credentials, &state, &nonce, &csrf, &challenge, &landing.url)
            .await?;

        let code = match session.code_source(response).await? {
            CodeSource::Redirect(code) => {
                tracing::debug!("authorization code received via redirect");
                code
            }
            CodeSource::Form(form) => {
                tracing::debug!(
                    action = %form.action,
                    fields = form.fields.len(),
                    "replaying login callback form"
                );
                session.follow_callback_form(&form).await?
            }
        };

        let tokens = self.exchange_code(&code, &challenge.verifier).await?;
        tracing::info!(
            email = %credentials.email(),
            refreshable = tokens.refresh_token().is_some(),
            "Peloton login successful"
        );
        Ok(tokens)
    }

    /// Exchange an authorization code for tokens using PKCE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the token endpoint rejects the
    /// code or returns no access token.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenPair, Error> {
        let body = CodeExchange {
            grant_type: "authorization_code",
            client_id: &self.config.client_id,
            code_verifier,
            code,
            redirect_uri: self.config.redirect_uri.as_str(),
        };

        let response = self
            .http
            .post(self.config.token_url()?)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let response = ensure_token_success(response, "token exchange").await?;
        response
            .json::<TokenResponse>()
            .await?
            .into_tokens(None, "token exchange")
    }

    /// Trades the refresh token of `tokens` for a new token pair.
    ///
    /// The returned pair keeps the old refresh token when the provider does
    /// not rotate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if `tokens` holds no refresh token,
    /// the provider rejects it, or the response has no access token.
    pub async fn refresh(&self, tokens: &TokenPair) -> Result<TokenPair, Error> {
        let refresh_token = tokens
            .refresh_token()
            .ok_or_else(|| Error::Authentication("no refresh token available".into()))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(self.config.token_url()?)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        let response = ensure_token_success(response, "token refresh").await?;
        response
            .json::<TokenResponse>()
            .await?
            .into_tokens(Some(refresh_token), "token refresh")
    }
}

/// Where `/authorize` finally landed and the `state` sent with it.
#[derive(Debug)]
struct Landing {
    url: Url,
    state: String,
}

/// Cookie-carrying HTTP state of one login attempt.
///
/// Both clients share one jar; only `follow` chases redirects.
struct LoginSession<'a> {
    config: &'a ClientConfig,
    jar: Arc<Jar>,
    follow: reqwest::Client,
    manual: reqwest::Client,
}

impl<'a> LoginSession<'a> {
    fn new(config: &'a ClientConfig) -> Result<Self, Error> {
        let jar = Arc::new(Jar::default());
        let build = |policy: Policy| {
            reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .cookie_provider(Arc::clone(&jar))
                .redirect(policy)
                .timeout(config.timeout)
                .build()
        };
        let follow = build(Policy::limited(MAX_AUTHORIZE_REDIRECTS))?;
        let manual = build(Policy::none())?;
        Ok(Self {
            config,
            jar,
            follow,
            manual,
        })
    }

    async fn authorize(
        &self,
        pkce: &PkceChallenge,
        state: &str,
        nonce: &str,
    ) -> Result<Landing, Error> {
        let scope = self.config.scope();
        let mut url = self.config.authorize_url()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &scope)
            .append_pair("audience", &self.config.audience)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("nonce", nonce);

        let response = self.follow.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Authentication(format!(
                "authorize request failed with status {}",
                status.as_u16()
            )));
        }

        let landing = response.url().clone();
        tracing::debug!(landing = %landing.path(), "authorize landed");
        Ok(Landing {
            url: landing,
            state: state.to_owned(),
        })
    }

    fn csrf_token(&self, landing: &Url) -> Result<String, Error> {
        let login_url = self.config.login_url()?;
        Ok(csrf::csrf_token(&self.jar, &login_url, landing).unwrap_or_else(|| {
            tracing::warn!("no {} cookie after authorize, submitting without one", csrf::CSRF_COOKIE);
            String::new()
        }))
    }

    async fn submit_credentials(
        &self,
        credentials: &Credentials,
        state: &str,
        nonce: &str,
        csrf: &str,
        pkce: &PkceChallenge,
        landing: &Url,
    ) -> Result<reqwest::Response, Error> {
        let scope = self.config.scope();
        let body = CredentialSubmission {
            client_id: &self.config.client_id,
            redirect_uri: self.config.redirect_uri.as_str(),
            tenant: &self.config.tenant,
            response_type: "code",
            scope: &scope,
            audience: &self.config.audience,
            state,
            nonce,
            connection: &self.config.connection,
            username: credentials.email(),
            password: credentials.password(),
            csrf,
            intstate: "deprecated",
            code_challenge: &pkce.challenge,
            code_challenge_method: "S256",
        };

        let response = self
            .manual
            .post(self.config.login_url()?)
            .header(ACCEPT, "*/*")
            .header("Auth0-Client", &self.config.auth0_client)
            .header("Origin", self.config.auth_origin())
            .header(REFERER, landing.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "credentials rejected with status {}: {detail}",
                status.as_u16()
            )));
        }
        Ok(response)
    }

    /// Classifies the credential submission response. The body is only read
    /// when the `Location` header carries no code.
    async fn code_source(&self, response: reqwest::Response) -> Result<CodeSource, Error> {
        let base = &self.config.auth_base;
        if let Some(code) = redirect_target(&response, base)?
            .as_ref()
            .and_then(code_param)
        {
            return Ok(CodeSource::Redirect(code));
        }

        let body = response.text().await?;
        Ok(CodeSource::Form(CallbackForm::parse(&body, base)?))
    }

    /// Replays the callback form and walks at most
    /// [`MAX_CALLBACK_REDIRECTS`] redirects looking for `code`.
    async fn follow_callback_form(&self, form: &CallbackForm) -> Result<String, Error> {
        let base = &self.config.auth_base;
        let mut response = self
            .manual
            .post(form.action.clone())
            .header(ACCEPT, HTML_ACCEPT)
            .form(&form.fields)
            .send()
            .await?;

        for hop in 0..MAX_CALLBACK_REDIRECTS {
            let Some(location) = redirect_target(&response, base)? else {
                return Err(Error::Authentication(format!(
                    "callback chain stopped at status {} without an authorization code",
                    response.status().as_u16()
                )));
            };
            if let Some(code) = code_param(&location) {
                tracing::debug!(hop, "authorization code received via callback form");
                return Ok(code);
            }
            tracing::debug!(hop, location = %location.path(), "following callback redirect");
            response = self.manual.get(location).send().await?;
        }

        Err(Error::Authentication(format!(
            "no authorization code after {MAX_CALLBACK_REDIRECTS} redirects"
        )))
    }
}

/// The provider may rewrite `state` on the way to the login page.
fn adopted_state(landing: &Url, sent: String) -> String {
    landing
        .query_pairs()
        .find(|(key, value)| key == "state" && !value.is_empty())
        .map_or(sent, |(_, value)| value.into_owned())
}

/// Maps non-success token endpoint responses to authentication failures.
async fn ensure_token_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Authentication(format!(
        "{operation} failed with status {status}: {body}"
    )))
}
