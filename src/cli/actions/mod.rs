pub mod request;
pub mod session;

use crate::{
    api::ApiClient,
    cli::globals::GlobalArgs,
    navigator::HeadlessNavigator,
    provider::{AuthServiceProvider, InitOptions, Registration},
    session::SessionManager,
    token::{FileStorage, TokenStore},
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub enum Action {
    Login {
        username: String,
        password: SecretString,
    },
    Register(Registration),
    Status,
    Whoami,
    Refresh {
        min_validity: i64,
    },
    Logout,
    Get {
        path: String,
    },
}

/// Everything one run needs, built once and shared by reference.
pub struct Context {
    pub session: SessionManager,
    pub api: ApiClient,
    pub auth: Arc<AuthServiceProvider>,
    pub navigator: Arc<HeadlessNavigator>,
}

impl Context {
    /// # Errors
    /// Returns an error if an HTTP client cannot be built.
    pub fn build(globals: &GlobalArgs) -> Result<Self> {
        let store = TokenStore::new(Arc::new(FileStorage::new(&globals.state_file)));
        let auth = Arc::new(AuthServiceProvider::new(&globals.config.auth_base_url)?);
        let navigator = Arc::new(HeadlessNavigator::new(globals.location.clone()));

        let session = SessionManager::new(
            store,
            auth.clone(),
            navigator.clone(),
            globals.config.session_config(),
        );
        let api = ApiClient::new(&globals.config.api_base_url, session.clone())?;

        Ok(Self {
            session,
            api,
            auth,
            navigator,
        })
    }
}

impl Action {
    /// Builds the context, establishes the session, then runs the action.
    ///
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self, globals: &GlobalArgs) -> Result<()> {
        let context = Context::build(globals)?;

        let authenticated = context.session.initialize(InitOptions::default()).await;
        debug!(authenticated, "session initialized");

        match self {
            Action::Login { username, password } => {
                session::login(&context, username, password).await
            }
            Action::Register(registration) => session::register(&context, &registration).await,
            Action::Status => session::status(&context),
            Action::Whoami => session::whoami(&context),
            Action::Refresh { min_validity } => session::refresh(&context, min_validity).await,
            Action::Logout => session::logout(&context).await,
            Action::Get { path } => request::get(&context, &path).await,
        }
    }
}
