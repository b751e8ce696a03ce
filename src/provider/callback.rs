//! Provider callback markers carried in the current URL.
//!
//! After a provider round trip the browser lands on the redirect URI with
//! either an authorization `code` or, for the implicit flow, the tokens
//! themselves in the fragment. Once consumed, these parameters are stripped
//! from the visible URL.

use crate::token::TokenSet;
use secrecy::SecretString;
use url::{form_urlencoded, Url};

const CALLBACK_PARAMS: [&str; 11] = [
    "code",
    "state",
    "session_state",
    "iss",
    "error",
    "error_description",
    "access_token",
    "refresh_token",
    "id_token",
    "token_type",
    "expires_in",
];

#[derive(Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub id_token: Option<SecretString>,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &self.code.as_ref().map(|_| "***"))
            .field("state", &self.state)
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl CallbackParams {
    /// Tokens delivered directly in the callback (implicit flow).
    #[must_use]
    pub fn tokens(&self) -> Option<TokenSet> {
        let access_token = self.access_token.as_ref()?;
        Some(TokenSet {
            access_token: access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            id_token: self.id_token.clone(),
        })
    }

    fn absorb(&mut self, key: &str, value: String) {
        if value.is_empty() {
            return;
        }
        match key {
            "code" => self.code = Some(value),
            "state" => self.state = Some(value),
            "error" => self.error = Some(value),
            "error_description" => self.error_description = Some(value),
            "access_token" => self.access_token = Some(SecretString::from(value)),
            "refresh_token" => self.refresh_token = Some(SecretString::from(value)),
            "id_token" => self.id_token = Some(SecretString::from(value)),
            _ => {}
        }
    }

    fn is_marker(&self) -> bool {
        self.code.is_some() || self.access_token.is_some() || self.error.is_some()
    }
}

/// Extracts callback parameters from the query and fragment of `url`.
///
/// Returns `None` unless an authorization code, an access token or a provider
/// error is present.
#[must_use]
pub fn detect(url: &Url) -> Option<CallbackParams> {
    let mut params = CallbackParams::default();

    for (key, value) in url.query_pairs() {
        params.absorb(&key, value.into_owned());
    }
    if let Some(fragment) = url.fragment() {
        for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
            params.absorb(&key, value.into_owned());
        }
    }

    params.is_marker().then_some(params)
}

/// Removes callback parameters from `url`. A public route collapses to `/`.
#[must_use]
pub fn strip(url: &Url, public_routes: &[String]) -> Url {
    let mut cleaned = url.clone();

    let query = retain_non_callback(url.query());
    cleaned.set_query(query.as_deref());

    let fragment = retain_non_callback(url.fragment());
    cleaned.set_fragment(fragment.as_deref());

    if public_routes.iter().any(|route| route == url.path()) {
        cleaned.set_path("/");
    }

    cleaned
}

fn retain_non_callback(component: Option<&str>) -> Option<String> {
    let component = component?;
    let kept: Vec<(String, String)> = form_urlencoded::parse(component.as_bytes())
        .filter(|(key, _)| !CALLBACK_PARAMS.contains(&&**key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        return None;
    }

    Some(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish(),
    )
}
