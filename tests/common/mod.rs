#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use edusession::{
    error::{ProviderError, StorageError},
    navigator::HeadlessNavigator,
    provider::{CallbackParams, Credentials, IdentityProvider, InitOptions},
    session::{SessionConfig, SessionManager},
    token::{MemoryStorage, Storage, TokenSet, TokenStore},
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use url::Url;
use uuid::Uuid;

pub fn now() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs(),
    )
    .unwrap()
}

/// Unsigned three-segment token carrying `payload`.
pub fn mint(payload: &Value) -> String {
    format!(
        "{}.{}.signature",
        Base64UrlUnpadded::encode_string(br#"{"alg":"RS256","typ":"JWT"}"#),
        Base64UrlUnpadded::encode_string(payload.to_string().as_bytes())
    )
}

pub fn token_expiring_in(seconds: i64, username: &str) -> String {
    mint(&json!({
        "sub": format!("id-{username}"),
        "preferred_username": username,
        "exp": now() + seconds,
        "realm_access": { "roles": ["teacher"] },
        "resource_access": { "microservices-client": { "roles": ["ROLE_ADMIN"] } }
    }))
}

pub fn temp_state_file(label: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("edusession-it-{label}-{}", Uuid::new_v4()))
        .join("state.json")
}

/// Storage wrapper counting reads.
#[derive(Default)]
pub struct CountingStorage {
    pub inner: MemoryStorage,
    pub reads: AtomicUsize,
}

impl Storage for CountingStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key)
    }
}

/// Storage whose writes start failing once `fail_writes` is set. Reads and
/// removals keep working.
#[derive(Default)]
pub struct ReadOnlyStorage {
    pub inner: MemoryStorage,
    pub fail_writes: AtomicBool,
}

impl ReadOnlyStorage {
    pub fn failing() -> Self {
        Self {
            fail_writes: AtomicBool::new(true),
            ..Self::default()
        }
    }
}

impl Storage for ReadOnlyStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )));
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key)
    }
}

/// Identity provider with scripted answers, call counters and an optional
/// delay on every call.
#[derive(Default)]
pub struct FakeProvider {
    pub delay: Duration,
    pub init_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub init_tokens: Mutex<Option<TokenSet>>,
    pub refresh_tokens: Mutex<Option<TokenSet>>,
}

impl FakeProvider {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn init(
        &self,
        _options: &InitOptions,
        _callback: Option<&CallbackParams>,
    ) -> Result<Option<TokenSet>, ProviderError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.init_tokens.lock().unwrap().clone())
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenSet, ProviderError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(TokenSet::new(token_expiring_in(300, &credentials.username))
            .with_refresh_token("refresh-1")
            .with_id_token("id-1"))
    }

    async fn update_token(&self, _refresh: &SecretString) -> Result<TokenSet, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.refresh_tokens
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Rejected {
                status: 400,
                message: "invalid_grant".to_string(),
            })
    }

    async fn logout(&self, _tokens: Option<&TokenSet>) -> Result<(), ProviderError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Fixture {
    pub session: SessionManager,
    pub navigator: Arc<HeadlessNavigator>,
}

pub fn session_with(
    storage: Arc<dyn Storage>,
    provider: Arc<dyn IdentityProvider>,
    location: Option<&str>,
) -> Fixture {
    let navigator = Arc::new(HeadlessNavigator::new(
        location.map(|location| Url::parse(location).unwrap()),
    ));
    let session = SessionManager::new(
        TokenStore::new(storage),
        provider,
        navigator.clone(),
        SessionConfig::default(),
    );
    Fixture { session, navigator }
}
