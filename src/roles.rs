//! Role resolution from access-token claims.
//!
//! Effective roles are the union of realm roles and the configured client's
//! roles. Role names are case-sensitive; a `ROLE_` prefix is accepted as an
//! alias of the unprefixed name.

use crate::token::Claims;
use serde::Serialize;
use std::collections::BTreeSet;

const ROLE_PREFIX: &str = "ROLE_";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Client,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Client => "client",
        }
    }

    #[must_use]
    pub fn prefixed(self) -> &'static str {
        match self {
            Role::Admin => "ROLE_ADMIN",
            Role::Teacher => "ROLE_TEACHER",
            Role::Client => "ROLE_CLIENT",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_upload: bool,
    pub can_delete: bool,
    pub can_view: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoleSet {
    roles: BTreeSet<String>,
}

impl RoleSet {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Exact membership, or membership of the name with its `ROLE_` prefix removed.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.contains(role)
            || role
                .strip_prefix(ROLE_PREFIX)
                .is_some_and(|bare| self.contains(bare))
    }

    #[must_use]
    pub fn has(&self, role: Role) -> bool {
        self.has_role(role.as_str()) || self.has_role(role.prefixed())
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has(Role::Admin)
    }

    #[must_use]
    pub fn is_teacher(&self) -> bool {
        self.has(Role::Teacher)
    }

    #[must_use]
    pub fn is_client(&self) -> bool {
        self.has(Role::Client)
    }

    /// Highest-privilege role held: admin, then teacher, then client.
    #[must_use]
    pub fn primary(&self) -> Option<Role> {
        [Role::Admin, Role::Teacher, Role::Client]
            .into_iter()
            .find(|role| self.has(*role))
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        let admin = self.is_admin();
        let teacher = self.is_teacher();
        Capabilities {
            can_upload: admin || teacher,
            can_delete: admin,
            can_view: admin || teacher || self.is_client(),
        }
    }
}

/// Union of `realm_access.roles` and `resource_access[client_id].roles`.
#[must_use]
pub fn roles_of(claims: &Claims, client_id: &str) -> RoleSet {
    RoleSet::new(
        claims
            .realm_roles()
            .into_iter()
            .chain(claims.client_roles(client_id)),
    )
}
