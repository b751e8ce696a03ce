//! Endpoint and session configuration with per-field overrides.
//!
//! Defaults match a local development deployment. Overrides come from the
//! command line or `EDUSESSION_*` environment variables; blank values are
//! ignored so an empty variable never wipes a default. Configuration values are
//! public; do not store secrets here.

use crate::session::SessionConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8083/api";
pub const DEFAULT_CLIENT_ID: &str = "microservices-client";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_PUBLIC_ROUTES: [&str; 2] = ["/login", "/register"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Resource APIs (courses, files, notifications).
    pub api_base_url: String,
    /// Auth service handling login, refresh, logout and registration.
    pub auth_base_url: String,
    pub client_id: String,
    pub login_path: String,
    pub public_routes: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_base_url: DEFAULT_API_BASE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            public_routes: DEFAULT_PUBLIC_ROUTES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Optional replacements for [`AppConfig`] fields.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub auth_base_url: Option<String>,
    pub client_id: Option<String>,
    pub login_path: Option<String>,
    pub public_routes: Option<Vec<String>>,
}

impl AppConfig {
    /// Defaults with `overrides` applied.
    #[must_use]
    pub fn load(overrides: ConfigOverrides) -> Self {
        let mut config = Self::default();
        apply_overrides(&mut config, overrides);
        config
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            client_id: self.client_id.clone(),
            login_path: self.login_path.clone(),
            public_routes: self.public_routes.clone(),
        }
    }
}

fn apply_overrides(config: &mut AppConfig, overrides: ConfigOverrides) {
    let fields = [
        (&mut config.api_base_url, overrides.api_base_url),
        (&mut config.auth_base_url, overrides.auth_base_url),
        (&mut config.client_id, overrides.client_id),
        (&mut config.login_path, overrides.login_path),
    ];
    for (field, value) in fields {
        if let Some(value) = value.as_deref().and_then(normalize_value) {
            *field = value;
        }
    }

    if let Some(routes) = overrides.public_routes {
        let routes: Vec<String> = routes.iter().filter_map(|route| normalize_value(route)).collect();
        if !routes.is_empty() {
            config.public_routes = routes;
        }
    }
}

/// Trims `value`, rejecting blanks.
#[must_use]
pub fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
