//! Session lifecycle: restore, initialize, renew and tear down.
//!
//! [`SessionManager`] is the single writer of the [`Session`]. It is built once
//! per process and cloned (cheaply, it is an `Arc`) into every consumer.
//!
//! Flow Overview:
//! 1) `initialize` restores persisted tokens without a network call, or asks
//!    the identity provider. It runs at most once until the session restarts.
//! 2) `renew` returns immediately while the token is fresh enough; otherwise
//!    all concurrent callers share one refresh exchange.
//! 3) Logout and failed renewals clear memory and storage together, bump the
//!    session epoch, and send the shell to the login view.
//!
//! Security boundary: the store write and the in-memory update happen under
//! the same lock, so no reader observes one without the other.

pub mod single_flight;
pub mod state;

pub use single_flight::{FlightAborted, SingleFlight};
pub use state::{Session, SessionSnapshot, SessionState};

use crate::{
    error::SessionError,
    navigator::Navigator,
    profile::UserProfile,
    provider::{callback, Credentials, IdentityProvider, InitOptions, OnLoad},
    roles::{roles_of, Capabilities, RoleSet},
    token::{decode_claims, Claims, TokenSet, TokenStore},
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, instrument, warn};

/// Minimum remaining validity the HTTP client asks for after a `401`.
pub const RETRY_MIN_VALIDITY_SECS: i64 = 30;

/// Session settings that do not change over the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Client whose `resource_access` roles are merged with realm roles.
    pub client_id: String,
    /// Where the shell is sent after logout or a failed renewal.
    pub login_path: String,
    /// Routes that collapse to `/` when a callback is stripped from them.
    pub public_routes: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: "microservices-client".to_string(),
            login_path: "/login".to_string(),
            public_routes: vec!["/login".to_string(), "/register".to_string()],
        }
    }
}

struct Inner {
    session: RwLock<Session>,
    store: TokenStore,
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    config: SessionConfig,
    init_flight: SingleFlight<bool>,
    renew_flight: SingleFlight<Result<bool, SessionError>>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

/// Claims of the access token, or an empty mapping if it cannot be decoded.
fn claims_or_empty(tokens: &TokenSet) -> Claims {
    decode_claims(tokens.access_token.expose_secret()).unwrap_or_else(|err| {
        warn!("access token claims unreadable, continuing without roles: {err}");
        Claims::default()
    })
}

impl SessionManager {
    #[must_use]
    pub fn new(
        store: TokenStore,
        provider: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: RwLock::new(Session::default()),
                store,
                provider,
                navigator,
                config,
                init_flight: SingleFlight::memoized("initialize"),
                renew_flight: SingleFlight::cleared_on_settle("renew"),
            }),
        }
    }

    /// Establishes the session once. Concurrent and repeated calls share the
    /// first call's outcome until the session is restarted by a login, a
    /// logout or a failed renewal.
    ///
    /// Never fails: provider and storage errors degrade to anonymous (`false`).
    pub async fn initialize(&self, options: InitOptions) -> bool {
        let inner = Arc::clone(&self.inner);
        self.inner
            .init_flight
            .run(move || async move { inner.initialize(options).await })
            .await
            .unwrap_or_else(|err| {
                warn!("initialization aborted, continuing anonymously: {err}");
                false
            })
    }

    /// Ensures the access token stays valid for at least `min_validity_secs`.
    ///
    /// Returns `Ok(true)` without a network call when it already does. A
    /// token without an `exp` claim is always refreshed.
    ///
    /// # Errors
    /// [`SessionError::NotAuthenticated`] without a session. Any refresh
    /// failure ends the session (storage cleared, shell sent to login) and is
    /// returned to every waiter.
    pub async fn renew(&self, min_validity_secs: i64) -> Result<bool, SessionError> {
        {
            let session = self.inner.read();
            if !session.is_authenticated() {
                return Err(SessionError::NotAuthenticated);
            }
            let remaining = session
                .claims()
                .and_then(|claims| claims.seconds_until_expiry(now_unix_seconds()));
            if remaining.is_some_and(|remaining| remaining >= min_validity_secs) {
                return Ok(true);
            }
        }

        let inner = Arc::clone(&self.inner);
        self.inner
            .renew_flight
            .run(move || async move { inner.refresh().await })
            .await
            .unwrap_or_else(|err| Err(SessionError::Aborted(err.to_string())))
    }

    /// Password login. Restarts the session: the next `initialize` rehydrates
    /// from the tokens written here.
    ///
    /// # Errors
    /// Returns the provider's rejection or a storage failure; the session is
    /// anonymous afterwards.
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let epoch = self.inner.restart();

        let tokens = match self.inner.provider.login(credentials).await {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!("login rejected: {err}");
                self.inner.teardown(epoch);
                return Err(err.into());
            }
        };

        match self.inner.authenticate(epoch, tokens) {
            Ok(()) => {
                info!("logged in");
                Ok(())
            }
            Err(SessionError::Superseded) => Err(SessionError::Superseded),
            Err(err) => {
                self.inner.teardown(epoch);
                Err(err)
            }
        }
    }

    /// Ends the session locally, then notifies the provider best-effort and
    /// sends the shell to the login view. Local state is always cleared.
    pub async fn logout(&self) {
        let tokens = {
            let mut session = self.inner.write();
            let tokens = session.tokens().cloned();
            self.inner.clear_locked(&mut session);
            tokens
        };
        self.inner.init_flight.reset();
        self.inner.renew_flight.reset();

        if let Err(err) = self.inner.provider.logout(tokens.as_ref()).await {
            warn!("identity provider logout failed, local session cleared anyway: {err}");
        }

        info!("logged out");
        self.inner.navigator.redirect(&self.inner.config.login_path);
    }

    /// Access token to present as a bearer credential, if authenticated.
    #[must_use]
    pub fn current_token(&self) -> Option<SecretString> {
        let session = self.inner.read();
        if session.is_authenticated() {
            session.access_token().cloned()
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.read().is_authenticated()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_initialized()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.read().state()
    }

    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        self.inner.read().claims().cloned()
    }

    /// Effective roles; empty when anonymous.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        self.inner
            .read()
            .claims()
            .map_or_else(RoleSet::default, |claims| {
                roles_of(claims, &self.inner.config.client_id)
            })
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.roles().capabilities()
    }

    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        let session = self.inner.read();
        if !session.is_authenticated() {
            return None;
        }
        session
            .claims()
            .map(|claims| UserProfile::from_claims(claims, &self.inner.config.client_id))
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().snapshot(&self.inner.config.client_id)
    }
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `state` and returns the epoch the caller works under.
    fn enter(&self, state: SessionState) -> u64 {
        let mut session = self.write();
        session.state = state;
        session.epoch
    }

    fn restart(&self) -> u64 {
        self.init_flight.reset();
        self.renew_flight.reset();
        let mut session = self.write();
        session.epoch = session.epoch.wrapping_add(1);
        session.state = SessionState::Initializing;
        session.epoch
    }

    /// Writes `tokens` through to the store, then into memory.
    fn authenticate(&self, epoch: u64, tokens: TokenSet) -> Result<(), SessionError> {
        let claims = claims_or_empty(&tokens);

        let mut session = self.write();
        if session.epoch != epoch {
            debug!("session changed while in flight, discarding tokens");
            return Err(SessionError::Superseded);
        }
        self.store.save(&tokens)?;
        session.authenticate(tokens, claims);
        session.initialized = true;
        Ok(())
    }

    fn clear_locked(&self, session: &mut Session) {
        if let Err(err) = self.store.clear() {
            warn!("failed to clear token store: {err}");
        }
        session.clear();
        session.initialized = true;
        session.epoch = session.epoch.wrapping_add(1);
    }

    /// Clears memory and storage if the session is still at `epoch`.
    fn teardown(&self, epoch: u64) -> bool {
        let mut session = self.write();
        if session.epoch != epoch {
            return false;
        }
        self.clear_locked(&mut session);
        true
    }

    #[instrument(skip(self), fields(on_load = options.on_load.as_str()))]
    async fn initialize(self: Arc<Self>, options: InitOptions) -> bool {
        let epoch = self.enter(SessionState::Restoring);

        match self.store.load() {
            Ok(Some(tokens)) => {
                let claims = claims_or_empty(&tokens);
                let mut session = self.write();
                if session.epoch == epoch {
                    session.authenticate(tokens, claims);
                    session.initialized = true;
                    info!("session restored from token store");
                    return true;
                }
                return false;
            }
            Ok(None) => debug!("no persisted session"),
            Err(err) => warn!("token store unreadable, asking the identity provider: {err}"),
        }

        self.enter(SessionState::Initializing);

        let location = self.navigator.current_url();
        let callback = location.as_ref().and_then(callback::detect);
        let options = if callback.is_some() {
            InitOptions {
                on_load: OnLoad::LoginRequired,
                ..options
            }
        } else {
            options
        };

        match self.provider.init(&options, callback.as_ref()).await {
            Ok(Some(tokens)) => match self.authenticate(epoch, tokens) {
                Ok(()) => {
                    if let (Some(location), Some(_)) = (location, callback) {
                        let cleaned = callback::strip(&location, &self.config.public_routes);
                        self.navigator.replace_url(&cleaned);
                    }
                    info!("session established by identity provider");
                    true
                }
                Err(SessionError::Superseded) => false,
                Err(err) => {
                    warn!("could not persist session, continuing anonymously: {err}");
                    self.teardown(epoch);
                    false
                }
            },
            Ok(None) => {
                debug!("identity provider reports no session");
                self.teardown(epoch);
                false
            }
            Err(err) => {
                warn!("initialization failed, continuing anonymously: {err}");
                self.teardown(epoch);
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn refresh(self: Arc<Self>) -> Result<bool, SessionError> {
        let (epoch, previous) = {
            let mut session = self.write();
            let Some(tokens) = session.tokens().cloned() else {
                return Err(SessionError::NotAuthenticated);
            };
            session.state = SessionState::Renewing;
            (session.epoch, tokens)
        };

        let Some(refresh_token) = previous.refresh_token.clone() else {
            return Err(self.fail_renewal(epoch, SessionError::NoRefreshToken));
        };

        let mut tokens = match self.provider.update_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(err) => return Err(self.fail_renewal(epoch, err.into())),
        };
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }
        if tokens.id_token.is_none() {
            tokens.id_token = previous.id_token;
        }

        match self.authenticate(epoch, tokens) {
            Ok(()) => {
                info!("access token renewed");
                Ok(true)
            }
            Err(SessionError::Superseded) => Err(SessionError::Superseded),
            Err(err) => Err(self.fail_renewal(epoch, err)),
        }
    }

    /// Hard logout after a failed renewal. Returns `err` for the waiters.
    fn fail_renewal(&self, epoch: u64, err: SessionError) -> SessionError {
        warn!("token renewal failed, ending session: {err}");
        if self.teardown(epoch) {
            self.init_flight.reset();
            self.navigator.redirect(&self.config.login_path);
        }
        err
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        error::ProviderError,
        navigator::HeadlessNavigator,
        provider::CallbackParams,
        token::{MemoryStorage, Storage},
    };
    use async_trait::async_trait;
    use base64ct::{Base64UrlUnpadded, Encoding};
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use url::Url;

    fn mint(payload: &serde_json::Value) -> String {
        format!(
            "{}.{}.sig",
            Base64UrlUnpadded::encode_string(br#"{"alg":"none"}"#),
            Base64UrlUnpadded::encode_string(payload.to_string().as_bytes())
        )
    }

    fn fresh_token(username: &str) -> String {
        mint(&json!({
            "sub": username,
            "preferred_username": username,
            "exp": now_unix_seconds() + 300,
            "realm_access": { "roles": ["teacher"] }
        }))
    }

    fn expired_token() -> String {
        mint(&json!({ "sub": "alice", "exp": now_unix_seconds() - 10 }))
    }

    #[derive(Default)]
    struct ScriptedProvider {
        init_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        logout_calls: AtomicUsize,
        init_result: Mutex<Option<Result<Option<TokenSet>, ProviderError>>>,
        refresh_result: Mutex<Option<Result<TokenSet, ProviderError>>>,
        seen_on_load: Mutex<Vec<OnLoad>>,
    }

    #[async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn init(
            &self,
            options: &InitOptions,
            _callback: Option<&CallbackParams>,
        ) -> Result<Option<TokenSet>, ProviderError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            self.seen_on_load.lock().unwrap().push(options.on_load);
            self.init_result.lock().unwrap().take().unwrap_or(Ok(None))
        }

        async fn login(&self, credentials: &Credentials) -> Result<TokenSet, ProviderError> {
            if credentials.password.expose_secret() == "secret1" {
                Ok(TokenSet::new(fresh_token(&credentials.username)).with_refresh_token("r1"))
            } else {
                Err(ProviderError::Rejected {
                    status: 401,
                    message: "Invalid credentials".to_string(),
                })
            }
        }

        async fn update_token(&self, _refresh: &SecretString) -> Result<TokenSet, ProviderError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_result.lock().unwrap().take().unwrap_or_else(|| {
                Err(ProviderError::Rejected {
                    status: 400,
                    message: "invalid_grant".to_string(),
                })
            })
        }

        async fn logout(&self, _tokens: Option<&TokenSet>) -> Result<(), ProviderError> {
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Unreachable("offline".to_string()))
        }
    }

    struct Harness {
        manager: SessionManager,
        provider: Arc<ScriptedProvider>,
        navigator: Arc<HeadlessNavigator>,
        storage: Arc<MemoryStorage>,
    }

    fn harness(location: Option<&str>) -> Harness {
        let provider = Arc::new(ScriptedProvider::default());
        let navigator = Arc::new(HeadlessNavigator::new(
            location.map(|location| Url::parse(location).unwrap()),
        ));
        let storage = Arc::new(MemoryStorage::new());
        let manager = SessionManager::new(
            TokenStore::new(storage.clone()),
            provider.clone(),
            navigator.clone(),
            SessionConfig::default(),
        );
        Harness {
            manager,
            provider,
            navigator,
            storage,
        }
    }

    #[tokio::test]
    async fn anonymous_initialize_is_memoized() {
        let h = harness(None);

        assert!(!h.manager.initialize(InitOptions::default()).await);
        assert!(!h.manager.initialize(InitOptions::default()).await);

        assert_eq!(h.provider.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(h.manager.is_initialized());
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn callback_forces_login_required_and_is_stripped() {
        let h = harness(Some("http://localhost:3000/login?state=s&code=abc"));
        *h.provider.init_result.lock().unwrap() =
            Some(Ok(Some(TokenSet::new(fresh_token("alice")).with_refresh_token("r1"))));

        assert!(h.manager.initialize(InitOptions::default()).await);

        assert_eq!(*h.provider.seen_on_load.lock().unwrap(), vec![OnLoad::LoginRequired]);
        assert_eq!(
            h.navigator.current_url().map(String::from).as_deref(),
            Some("http://localhost:3000/")
        );
        assert_eq!(
            h.storage
                .get_item(crate::token::store::AUTHENTICATED_KEY)
                .unwrap()
                .as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_anonymous() {
        let h = harness(None);
        *h.provider.init_result.lock().unwrap() =
            Some(Err(ProviderError::Unreachable("connection refused".to_string())));

        assert!(!h.manager.initialize(InitOptions::default()).await);
        assert!(!h.manager.is_authenticated());
        assert!(h.manager.current_token().is_none());
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn malformed_token_authenticates_without_roles() {
        let h = harness(None);
        *h.provider.init_result.lock().unwrap() = Some(Ok(Some(TokenSet::new("not-a-jwt"))));

        assert!(h.manager.initialize(InitOptions::default()).await);
        assert!(h.manager.is_authenticated());
        assert_eq!(h.manager.claims(), Some(Claims::default()));
        assert!(h.manager.roles().is_empty());
        assert_eq!(h.manager.capabilities(), Capabilities::default());
    }

    #[tokio::test]
    async fn fresh_token_renews_without_network() {
        let h = harness(None);
        h.manager
            .login(&Credentials::new("alice", "secret1"))
            .await
            .unwrap();

        assert_eq!(h.manager.renew(30).await, Ok(true));
        assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn renew_keeps_refresh_token_when_response_omits_it() {
        let h = harness(None);
        TokenStore::new(h.storage.clone())
            .save(&TokenSet::new(expired_token()).with_refresh_token("r1").with_id_token("id"))
            .unwrap();
        assert!(h.manager.initialize(InitOptions::default()).await);

        *h.provider.refresh_result.lock().unwrap() = Some(Ok(TokenSet::new(fresh_token("alice"))));
        assert_eq!(h.manager.renew(30).await, Ok(true));

        let stored = TokenStore::new(h.storage.clone()).load().unwrap().unwrap();
        assert_eq!(
            stored.refresh_token.as_ref().map(ExposeSecret::expose_secret),
            Some("r1")
        );
        assert_eq!(
            stored.id_token.as_ref().map(ExposeSecret::expose_secret),
            Some("id")
        );
        assert_eq!(h.manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn renew_without_refresh_token_ends_session() {
        let h = harness(Some("http://localhost:3000/courses"));
        TokenStore::new(h.storage.clone())
            .save(&TokenSet::new(expired_token()))
            .unwrap();
        assert!(h.manager.initialize(InitOptions::default()).await);

        assert_eq!(h.manager.renew(30).await, Err(SessionError::NoRefreshToken));
        assert!(!h.manager.is_authenticated());
        assert!(h.storage.keys().is_empty());
        assert_eq!(h.navigator.redirects(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn renew_when_anonymous_is_rejected_without_navigation() {
        let h = harness(None);
        assert_eq!(h.manager.renew(30).await, Err(SessionError::NotAuthenticated));
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn failed_login_leaves_session_anonymous() {
        let h = harness(None);
        let err = h
            .manager
            .login(&Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SessionError::Provider(ProviderError::Rejected {
                status: 401,
                message: "Invalid credentials".to_string()
            })
        );
        assert_eq!(h.manager.state(), SessionState::Anonymous);
        assert!(h.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn logout_clears_even_when_provider_is_offline() {
        let h = harness(Some("http://localhost:3000/courses"));
        h.manager
            .login(&Credentials::new("alice", "secret1"))
            .await
            .unwrap();
        assert!(!h.storage.keys().is_empty());

        h.manager.logout().await;

        assert_eq!(h.provider.logout_calls.load(Ordering::SeqCst), 1);
        assert!(!h.manager.is_authenticated());
        assert!(h.manager.current_token().is_none());
        assert!(h.storage.keys().is_empty());
        assert_eq!(h.navigator.redirects(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn login_restarts_initialization() {
        let h = harness(None);
        assert!(!h.manager.initialize(InitOptions::default()).await);

        h.manager
            .login(&Credentials::new("alice", "secret1"))
            .await
            .unwrap();

        assert!(h.manager.initialize(InitOptions::default()).await);
        assert_eq!(h.provider.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.manager.snapshot().username.as_deref(), Some("alice"));
    }
}
