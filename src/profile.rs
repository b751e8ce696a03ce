//! User profile summary derived from access-token claims.

use crate::{
    roles::{roles_of, Role, RoleSet},
    token::Claims,
};
use serde::Serialize;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub display_name: String,
    pub email_verified: bool,
    pub roles: RoleSet,
    pub role_description: &'static str,
}

impl UserProfile {
    #[must_use]
    pub fn from_claims(claims: &Claims, client_id: &str) -> Self {
        let name = claims.name();
        let mut name_parts = name.map(str::split_whitespace).into_iter().flatten();
        let first_from_name = name_parts.next();
        let last_from_name = name_parts.next();

        let full_name = name.map_or_else(
            || {
                let joined = format!(
                    "{} {}",
                    claims.given_name().unwrap_or_default(),
                    claims.family_name().unwrap_or_default()
                );
                joined.trim().to_string()
            },
            str::to_string,
        );

        let roles = roles_of(claims, client_id);
        let role_description = role_description(roles.primary());

        Self {
            username: claims
                .preferred_username()
                .or_else(|| claims.subject())
                .unwrap_or(NOT_AVAILABLE)
                .to_string(),
            email: claims.email().unwrap_or(NOT_AVAILABLE).to_string(),
            first_name: claims
                .given_name()
                .or(first_from_name)
                .unwrap_or(NOT_AVAILABLE)
                .to_string(),
            last_name: claims
                .family_name()
                .or(last_from_name)
                .unwrap_or(NOT_AVAILABLE)
                .to_string(),
            full_name: if full_name.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                full_name
            },
            display_name: claims
                .preferred_username()
                .or(name)
                .unwrap_or("User")
                .to_string(),
            email_verified: claims.email_verified(),
            roles,
            role_description,
        }
    }
}

/// What the highest-privilege role allows, in user-facing words.
#[must_use]
pub fn role_description(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::Admin) => {
            "You have full access to all features including editing, deleting, and managing courses."
        }
        Some(Role::Teacher) => "You can upload videos, create courses, and manage your own content.",
        Some(Role::Client) => "You can view courses, enroll in courses, and track your progress.",
        None => "Limited access. Please contact administrator for role assignment.",
    }
}
