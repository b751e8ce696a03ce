//! Identity-provider capability consumed by the session manager.
//!
//! The provider issues tokens (login, callback, refresh) and is told about
//! logouts. It never owns session state: the tokens it returns are adopted by
//! [`crate::session::SessionManager`], which is the only writer of the session.

pub mod auth_service;
pub mod callback;

pub use auth_service::{AuthServiceProvider, Registration};
pub use callback::CallbackParams;

use crate::{error::ProviderError, token::TokenSet};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnLoad {
    /// Silent, non-redirecting check for an existing provider session.
    #[default]
    CheckSso,
    /// The user is expected to be returning from the provider's login page.
    LoginRequired,
}

impl OnLoad {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OnLoad::CheckSso => "check-sso",
            OnLoad::LoginRequired => "login-required",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitOptions {
    pub on_load: OnLoad,
    pub check_login_iframe: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            on_load: OnLoad::CheckSso,
            check_login_iframe: false,
        }
    }
}

/// Username/password pair for the password-grant login.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Checks for a provider session, consuming callback parameters if the
    /// current location carries them. `Ok(None)` means anonymous.
    async fn init(
        &self,
        options: &InitOptions,
        callback: Option<&CallbackParams>,
    ) -> Result<Option<TokenSet>, ProviderError>;

    /// Exchanges credentials for tokens.
    async fn login(&self, credentials: &Credentials) -> Result<TokenSet, ProviderError>;

    /// Exchanges a refresh token for a new token set.
    async fn update_token(&self, refresh_token: &SecretString) -> Result<TokenSet, ProviderError>;

    /// Notifies the provider that the session ended.
    async fn logout(&self, tokens: Option<&TokenSet>) -> Result<(), ProviderError>;
}
