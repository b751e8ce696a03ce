//! Authenticated HTTP client for the resource APIs.
//!
//! Every request carries the session's bearer token when there is one. A
//! `401` triggers one shared renewal and a single replay of the request; a
//! `403` is returned as [`ApiError::Forbidden`] and never retried. Error
//! bodies are trimmed and truncated before they reach the caller.

pub mod errors;

pub use errors::ApiError;

use crate::{
    session::{SessionManager, RETRY_MIN_VALIDITY_SECS},
    APP_USER_AGENT,
};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    Client, Method, Request, Response, StatusCode,
};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

/// Default request timeout applied to all helpers.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum number of error body characters surfaced to the caller.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionManager,
}

impl ApiClient {
    /// # Errors
    /// Returns [`ApiError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, session: SessionManager) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| ApiError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            session,
        })
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Absolute URL for `path` under the configured base.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        build_url_with_base(&self.base_url, path)
    }

    /// Sends `request` with the current bearer token.
    ///
    /// On `401` the session is renewed (all concurrent callers share one
    /// refresh) and the request is replayed once with the new token. A
    /// request whose body cannot be cloned is not replayed.
    ///
    /// # Errors
    /// [`ApiError::Unauthorized`] when renewal fails or the replay is also
    /// rejected, [`ApiError::Forbidden`] on `403`, [`ApiError::Http`] for any
    /// other non-success status, and network or timeout errors as-is.
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        let method = request.method().clone();
        let span = info_span!("api.request", http.method = %method, url = %request.url());

        async move {
            let replay = request.try_clone();
            let response = self.send_authorized(request).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return check_status(response).await;
            }

            let Some(replay) = replay else {
                return Err(unauthorized(response).await);
            };

            debug!("401 received, renewing session");
            if let Err(err) = self.session.renew(RETRY_MIN_VALIDITY_SECS).await {
                warn!("session renewal failed: {err}");
                return Err(unauthorized(response).await);
            }

            let response = self.send_authorized(replay).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(unauthorized(response).await);
            }
            check_status(response).await
        }
        .instrument(span)
        .await
    }

    async fn send_authorized(&self, mut request: Request) -> Result<Response, ApiError> {
        if let Some(token) = self.session.current_token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| ApiError::Config("Access token is not a valid header value.".to_string()))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        } else {
            request.headers_mut().remove(AUTHORIZATION);
        }

        self.client
            .execute(request)
            .await
            .map_err(map_request_error)
    }

    fn build(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, self.url(path))
    }

    fn build_json<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Request, ApiError> {
        self.build(method, path)
            .json(body)
            .build()
            .map_err(|err| ApiError::Serialization(format!("Failed to encode request: {err}")))
    }

    fn build_empty(&self, method: Method, path: &str) -> Result<Request, ApiError> {
        self.build(method, path)
            .build()
            .map_err(|err| ApiError::Serialization(format!("Failed to build request: {err}")))
    }

    /// Fetches and decodes JSON.
    ///
    /// # Errors
    /// See [`ApiClient::execute`]; decoding failures are [`ApiError::Parse`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.build_empty(Method::GET, path)?;
        decode_json(self.execute(request).await?).await
    }

    /// Fetches the raw response body as text.
    ///
    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn get_text(&self, path: &str) -> Result<String, ApiError> {
        let request = self.build_empty(Method::GET, path)?;
        self.execute(request)
            .await?
            .text()
            .await
            .map_err(|err| ApiError::Parse(format!("Failed to read response: {err}")))
    }

    /// # Errors
    /// See [`ApiClient::execute`]; decoding failures are [`ApiError::Parse`].
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.build_json(Method::POST, path, body)?;
        decode_json(self.execute(request).await?).await
    }

    /// # Errors
    /// See [`ApiClient::execute`]; decoding failures are [`ApiError::Parse`].
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.build_json(Method::PUT, path, body)?;
        decode_json(self.execute(request).await?).await
    }

    /// Deletes and ignores any response body.
    ///
    /// # Errors
    /// See [`ApiClient::execute`].
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.build_empty(Method::DELETE, path)?;
        self.execute(request).await.map(|_| ())
    }
}

/// Builds a URL from an explicit base URL and the provided path.
fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

fn map_request_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout("Request timed out. Please try again.".to_string())
    } else if err.is_builder() {
        ApiError::Config(format!("Invalid request: {err}"))
    } else {
        ApiError::Network(format!("Unable to reach the server: {err}"))
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|err| ApiError::Parse(format!("Failed to decode response: {err}")))
}

async fn unauthorized(response: Response) -> ApiError {
    let body = response.text().await.unwrap_or_default();
    ApiError::Unauthorized(sanitize_body(&body))
}

/// Passes successes through and maps error statuses with sanitized bodies.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = sanitize_body(&body);
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        _ => ApiError::Http {
            status: status.as_u16(),
            message,
        },
    })
}

/// Sanitizes HTTP error bodies for user-facing messages by trimming and truncating.
fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
