//! # edusession (EduPlatform session lifecycle)
//!
//! `edusession` owns the bearer-token session of the EduPlatform learning
//! client. Every privileged call (courses, files, enrollment) depends on the
//! token this crate manages.
//!
//! ## Lifecycle
//!
//! ```text
//! UNINITIALIZED -> RESTORING -> AUTHENTICATED
//!                     |
//!                     v
//!               INITIALIZING -> {AUTHENTICATED, ANONYMOUS}
//!
//! AUTHENTICATED -> RENEWING -> {AUTHENTICATED, ANONYMOUS}
//! ```
//!
//! - **Initialization** runs once per page life. Concurrent callers share one
//!   in-flight result, and persisted tokens are restored before the identity
//!   provider is contacted.
//! - **Renewal** is single-flight: any number of requests that hit a `401`
//!   converge on one refresh exchange.
//! - **Failure** always degrades to the anonymous state. Only a failed renewal
//!   drives navigation back to the login view.
//!
//! The [`session::SessionManager`] is the one context object that mutates the
//! session. It is constructed once and handed to the [`api::ApiClient`] and to
//! the shell by reference.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod navigator;
pub mod profile;
pub mod provider;
pub mod roles;
pub mod session;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
