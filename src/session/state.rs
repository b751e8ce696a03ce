use crate::{
    roles::{roles_of, Capabilities, RoleSet},
    token::{Claims, TokenSet},
};
use secrecy::SecretString;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    /// Reading persisted tokens before any network call.
    Restoring,
    /// Waiting on the identity provider.
    Initializing,
    Authenticated,
    /// Authenticated, with a refresh exchange in flight. The current token is
    /// still served to readers.
    Renewing,
    Anonymous,
}

impl SessionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Restoring => "restoring",
            SessionState::Initializing => "initializing",
            SessionState::Authenticated => "authenticated",
            SessionState::Renewing => "renewing",
            SessionState::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory session. Mutated only by [`super::SessionManager`].
///
/// Tokens and claims are set and cleared together, so "authenticated" always
/// implies both are present.
#[derive(Debug, Default)]
pub struct Session {
    pub(super) state: SessionState,
    tokens: Option<TokenSet>,
    claims: Option<Claims>,
    pub(super) initialized: bool,
    /// Bumped on every teardown; work that started under an older epoch must
    /// not write its result.
    pub(super) epoch: u64,
}

impl Session {
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some() && self.claims.is_some()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn tokens(&self) -> Option<&TokenSet> {
        self.tokens.as_ref()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&SecretString> {
        self.tokens.as_ref().map(|tokens| &tokens.access_token)
    }

    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub(super) fn authenticate(&mut self, tokens: TokenSet, claims: Claims) {
        self.tokens = Some(tokens);
        self.claims = Some(claims);
        self.state = SessionState::Authenticated;
    }

    pub(super) fn clear(&mut self) {
        self.tokens = None;
        self.claims = None;
        self.state = SessionState::Anonymous;
    }

    pub(super) fn snapshot(&self, client_id: &str) -> SessionSnapshot {
        let claims = self.claims.as_ref();
        let roles = claims.map_or_else(RoleSet::default, |claims| roles_of(claims, client_id));
        SessionSnapshot {
            state: self.state,
            authenticated: self.is_authenticated(),
            initialized: self.initialized,
            subject: claims.and_then(Claims::subject).map(str::to_string),
            username: claims
                .and_then(Claims::preferred_username)
                .map(str::to_string),
            expires_at: claims.and_then(Claims::expires_at),
            capabilities: roles.capabilities(),
            roles,
            has_refresh_token: self
                .tokens
                .as_ref()
                .is_some_and(|tokens| tokens.refresh_token.is_some()),
        }
    }
}

/// Token-free view of the session for display and logging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub authenticated: bool,
    pub initialized: bool,
    pub subject: Option<String>,
    pub username: Option<String>,
    pub expires_at: Option<i64>,
    pub roles: RoleSet,
    pub capabilities: Capabilities,
    pub has_refresh_token: bool,
}
