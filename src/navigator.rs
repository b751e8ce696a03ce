//! Navigation capability of the shell hosting the session.
//!
//! The session manager reads the current location to detect provider
//! callbacks, rewrites it once a callback is consumed, and sends the user to
//! the login view when a renewal fails or the user logs out.

use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};
use url::Url;

pub trait Navigator: Send + Sync {
    /// The location the shell is currently showing, if any.
    fn current_url(&self) -> Option<Url>;

    /// Rewrites the visible location without navigating (history replace).
    fn replace_url(&self, url: &Url);

    /// Navigates to `path`, e.g. the public login view.
    fn redirect(&self, path: &str);
}

/// Navigator for processes without a browser: keeps the location in memory
/// and logs navigations.
#[derive(Debug, Default)]
pub struct HeadlessNavigator {
    location: Mutex<Option<Url>>,
    redirects: Mutex<Vec<String>>,
}

impl HeadlessNavigator {
    #[must_use]
    pub fn new(location: Option<Url>) -> Self {
        Self {
            location: Mutex::new(location),
            redirects: Mutex::new(Vec::new()),
        }
    }

    /// Paths passed to [`Navigator::redirect`], oldest first.
    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for HeadlessNavigator {
    fn current_url(&self) -> Option<Url> {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_url(&self, url: &Url) {
        debug!(url = %url, "location replaced");
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = Some(url.clone());
    }

    fn redirect(&self, path: &str) {
        info!(path, "navigating");
        let mut location = self.location.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = location.as_ref().and_then(|current| current.join(path).ok()) {
            *location = Some(next);
        }
        drop(location);

        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}
