//! Client for the intermediary auth service that fronts the identity provider.
//!
//! Flow Overview: login and refresh are JSON `POST`s returning
//! `{accessToken, refreshToken, idToken?}`. Logout revokes the refresh token.
//! Registration creates the account and never returns tokens. Non-2xx bodies
//! carry `{error}` or `{message}`, which is surfaced (trimmed and truncated) to
//! the caller. Request and response bodies carry credentials and must never be
//! logged.

use super::{CallbackParams, Credentials, IdentityProvider, InitOptions};
use crate::{error::ProviderError, roles::Role, token::TokenSet, APP_USER_AGENT};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info_span, instrument, warn, Instrument};

/// Default request timeout applied to every auth-service call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum number of error body characters surfaced to the caller.
const MAX_ERROR_CHARS: usize = 200;
const MIN_PASSWORD_CHARS: usize = 6;
const DEFAULT_ERROR: &str = "Request failed.";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationPayload<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    role: &'a str,
}

/// Account creation form. `confirm_password` is checked locally and never sent.
#[derive(Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

impl Registration {
    /// Checks the form before any network call.
    ///
    /// # Errors
    /// Returns [`ProviderError::Invalid`] naming the first failed rule.
    pub fn validate(&self) -> Result<(), ProviderError> {
        let password = self.password.expose_secret();
        let required = [
            self.username.trim(),
            self.email.trim(),
            password,
            self.first_name.trim(),
            self.last_name.trim(),
        ];
        if required.iter().any(|value| value.is_empty()) {
            return Err(ProviderError::Invalid("All fields are required".to_string()));
        }

        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ProviderError::Invalid(format!(
                "Password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }

        if password != self.confirm_password.expose_secret() {
            return Err(ProviderError::Invalid("Passwords do not match".to_string()));
        }

        if !valid_email(self.email.trim()) {
            return Err(ProviderError::Invalid("Invalid email address".to_string()));
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct AuthServiceProvider {
    client: Client,
    base_url: String,
}

impl AuthServiceProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| ProviderError::Unreachable(format!("Failed to build client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim().trim_start_matches('/'))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = self.endpoint(path);
        let span = info_span!("auth_service.post", http.method = "POST", url = %url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .instrument(span)
            .await
            .map_err(map_request_error)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn post_for_tokens(&self, path: &str, body: &Value) -> Result<TokenSet, ProviderError> {
        let response = self.post(path, body).await?;
        let tokens: TokenResponse = response.json().await.map_err(|err| {
            ProviderError::InvalidResponse(format!("Failed to decode token response: {err}"))
        })?;

        let access_token = tokens
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no accessToken found".to_string()))?;

        Ok(TokenSet {
            access_token: SecretString::from(access_token),
            refresh_token: tokens
                .refresh_token
                .filter(|token| !token.is_empty())
                .map(SecretString::from),
            id_token: tokens
                .id_token
                .filter(|token| !token.is_empty())
                .map(SecretString::from),
        })
    }

    /// Creates an account. Does not sign the user in.
    ///
    /// # Errors
    /// Returns [`ProviderError::Invalid`] if the form fails validation, or the
    /// service's rejection (409 when the username or email is taken).
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: &Registration) -> Result<(), ProviderError> {
        registration.validate()?;

        let payload = RegistrationPayload {
            username: registration.username.trim(),
            email: registration.email.trim(),
            password: registration.password.expose_secret(),
            first_name: registration.first_name.trim(),
            last_name: registration.last_name.trim(),
            role: registration.role.as_str(),
        };
        let body = serde_json::to_value(&payload).map_err(|err| {
            ProviderError::Invalid(format!("Failed to encode registration: {err}"))
        })?;

        match self.post("/auth/register", &body).await {
            Ok(_) => {
                debug!("account registered");
                Ok(())
            }
            Err(ProviderError::Rejected { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {
                Err(ProviderError::Rejected {
                    status,
                    message: "A user with this username or email already exists".to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl IdentityProvider for AuthServiceProvider {
    /// The auth service keeps no browser session of its own, so a silent check
    /// finds nothing. Tokens delivered in an implicit-flow callback are adopted;
    /// authorization codes are not exchanged here.
    #[instrument(skip(self, callback), fields(on_load = options.on_load.as_str()))]
    async fn init(
        &self,
        options: &InitOptions,
        callback: Option<&CallbackParams>,
    ) -> Result<Option<TokenSet>, ProviderError> {
        let Some(callback) = callback else {
            debug!("no provider callback; nothing to check silently");
            return Ok(None);
        };

        if let Some(error) = &callback.error {
            let description = callback.error_description.as_deref().unwrap_or("");
            return Err(ProviderError::InvalidResponse(format!(
                "provider callback error: {error} {description}"
            )));
        }

        if let Some(tokens) = callback.tokens() {
            debug!("adopting tokens from provider callback");
            return Ok(Some(tokens));
        }

        Err(ProviderError::Unsupported(
            "authorization code exchange".to_string(),
        ))
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    async fn login(&self, credentials: &Credentials) -> Result<TokenSet, ProviderError> {
        let body = json!({
            "username": credentials.username,
            "password": credentials.password.expose_secret(),
        });
        self.post_for_tokens("/auth/login", &body).await
    }

    #[instrument(skip_all)]
    async fn update_token(&self, refresh_token: &SecretString) -> Result<TokenSet, ProviderError> {
        let body = json!({ "refreshToken": refresh_token.expose_secret() });
        self.post_for_tokens("/auth/refresh", &body).await
    }

    #[instrument(skip_all)]
    async fn logout(&self, tokens: Option<&TokenSet>) -> Result<(), ProviderError> {
        let Some(refresh_token) = tokens.and_then(|tokens| tokens.refresh_token.as_ref()) else {
            debug!("no refresh token to revoke");
            return Ok(());
        };

        let body = json!({ "refreshToken": refresh_token.expose_secret() });
        self.post("/auth/logout", &body).await.map(|_| ())
    }
}

/// Pulls `error` or `message` out of a JSON error body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    let extracted = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.get("error")
            .and_then(Value::as_str)
            .or_else(|| json.get("message").and_then(Value::as_str))
            .map(ToString::to_string)
    });

    let message = extracted.unwrap_or_else(|| body.to_string());
    let trimmed = message.trim();
    if trimmed.is_empty() {
        DEFAULT_ERROR.to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}

fn map_request_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        warn!("auth service request timed out");
        ProviderError::Unreachable("Request timed out. Please try again.".to_string())
    } else {
        ProviderError::Unreachable(format!("Unable to reach the auth service: {err}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::callback;
    use anyhow::Result;
    use std::net::TcpListener;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn registration() -> Registration {
        Registration {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: SecretString::from("secret1".to_string()),
            confirm_password: SecretString::from("secret1".to_string()),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            role: Role::Client,
        }
    }

    #[test]
    fn error_message_prefers_error_then_message() {
        assert_eq!(error_message(r#"{"error":"bad creds"}"#), "bad creds");
        assert_eq!(error_message(r#"{"message":"expired"}"#), "expired");
        assert_eq!(error_message("plain text"), "plain text");
        assert_eq!(error_message("   "), DEFAULT_ERROR);
        assert_eq!(error_message(&"x".repeat(500)).len(), MAX_ERROR_CHARS);
    }

    #[test]
    fn valid_email_rules() {
        assert!(valid_email("a@b.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@c.de"));
        assert!(!valid_email(""));
    }

    #[test]
    fn registration_validation() {
        assert!(registration().validate().is_ok());

        let mut missing = registration();
        missing.last_name = "  ".to_string();
        assert_eq!(
            missing.validate(),
            Err(ProviderError::Invalid("All fields are required".to_string()))
        );

        let mut short = registration();
        short.password = SecretString::from("12345".to_string());
        short.confirm_password = SecretString::from("12345".to_string());
        assert!(matches!(short.validate(), Err(ProviderError::Invalid(m)) if m.contains("at least 6")));

        let mut mismatch = registration();
        mismatch.confirm_password = SecretString::from("secret2".to_string());
        assert_eq!(
            mismatch.validate(),
            Err(ProviderError::Invalid("Passwords do not match".to_string()))
        );

        let mut email = registration();
        email.email = "not-an-email".to_string();
        assert_eq!(
            email.validate(),
            Err(ProviderError::Invalid("Invalid email address".to_string()))
        );
    }

    #[tokio::test]
    async fn init_without_callback_is_anonymous() -> Result<()> {
        let provider = AuthServiceProvider::new("http://127.0.0.1:9/api")?;
        let tokens = provider.init(&InitOptions::default(), None).await?;
        assert!(tokens.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn init_adopts_fragment_tokens_and_rejects_codes() -> Result<()> {
        let provider = AuthServiceProvider::new("http://127.0.0.1:9/api")?;

        let url = Url::parse("http://localhost/#access_token=a.b.c&refresh_token=r")?;
        let params = callback::detect(&url).unwrap();
        let tokens = provider.init(&InitOptions::default(), Some(&params)).await?;
        assert_eq!(tokens.unwrap().access_token.expose_secret(), "a.b.c");

        let url = Url::parse("http://localhost/?code=xyz&state=s")?;
        let params = callback::detect(&url).unwrap();
        let result = provider.init(&InitOptions::default(), Some(&params)).await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
        Ok(())
    }

    #[tokio::test]
    async fn login_parses_camel_case_tokens() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({ "username": "alice", "password": "secret1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "a.b.c",
                "refreshToken": "refresh-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AuthServiceProvider::new(&format!("{}/api/", server.uri()))?;
        let tokens = provider
            .login(&Credentials::new("alice", "secret1"))
            .await?;

        assert_eq!(tokens.access_token.expose_secret(), "a.b.c");
        assert_eq!(
            tokens.refresh_token.as_ref().map(ExposeSecret::expose_secret),
            Some("refresh-1")
        );
        assert!(tokens.id_token.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn login_rejection_surfaces_service_message() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid credentials" })),
            )
            .mount(&server)
            .await;

        let provider = AuthServiceProvider::new(&format!("{}/api", server.uri()))?;
        let result = provider.login(&Credentials::new("alice", "wrong")).await;

        assert_eq!(
            result.err(),
            Some(ProviderError::Rejected {
                status: 401,
                message: "Invalid credentials".to_string()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn refresh_requires_access_token_in_response() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .and(body_json(json!({ "refreshToken": "refresh-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "refreshToken": "r2" })))
            .mount(&server)
            .await;

        let provider = AuthServiceProvider::new(&format!("{}/api", server.uri()))?;
        let result = provider
            .update_token(&SecretString::from("refresh-1".to_string()))
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn logout_without_refresh_token_skips_network() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AuthServiceProvider::new(&format!("{}/api", server.uri()))?;
        provider.logout(None).await?;
        provider.logout(Some(&TokenSet::new("a.b.c"))).await?;
        provider
            .logout(Some(&TokenSet::new("a.b.c").with_refresh_token("r1")))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn register_posts_form_without_confirmation() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .and(body_json(json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "secret1",
                "firstName": "Alice",
                "lastName": "Liddell",
                "role": "client"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AuthServiceProvider::new(&format!("{}/api", server.uri()))?;
        provider.register(&registration()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn register_conflict_has_readable_message() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let provider = AuthServiceProvider::new(&format!("{}/api", server.uri()))?;
        let result = provider.register(&registration()).await;
        assert_eq!(
            result,
            Err(ProviderError::Rejected {
                status: 409,
                message: "A user with this username or email already exists".to_string()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn invalid_registration_never_reaches_network() -> Result<()> {
        let provider = AuthServiceProvider::new("http://127.0.0.1:9/api")?;
        let mut form = registration();
        form.email = "nope".to_string();
        assert!(matches!(
            provider.register(&form).await,
            Err(ProviderError::Invalid(_))
        ));
        Ok(())
    }
}
