use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded access-token payload.
///
/// Kept as the raw JSON mapping so unknown provider claims survive; the
/// accessors below cover the claims this client reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    #[must_use]
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn str_claim(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    #[must_use]
    pub fn preferred_username(&self) -> Option<&str> {
        self.str_claim("preferred_username")
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.str_claim("email")
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_claim("name")
    }

    #[must_use]
    pub fn given_name(&self) -> Option<&str> {
        self.str_claim("given_name")
    }

    #[must_use]
    pub fn family_name(&self) -> Option<&str> {
        self.str_claim("family_name")
    }

    #[must_use]
    pub fn email_verified(&self) -> bool {
        self.0
            .get("email_verified")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Expiry as unix seconds. Fractional values are truncated.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn expires_at(&self) -> Option<i64> {
        let exp = self.0.get("exp")?;
        exp.as_i64()
            .or_else(|| exp.as_f64().map(|value| value as i64))
    }

    /// Seconds of validity left at `now`; negative once expired. `None` when
    /// `exp` is absent or too far out of range to compare.
    #[must_use]
    pub fn seconds_until_expiry(&self, now_unix_seconds: i64) -> Option<i64> {
        self.expires_at()
            .and_then(|exp| exp.checked_sub(now_unix_seconds))
    }

    /// Roles from `realm_access.roles`. Non-string entries are skipped.
    #[must_use]
    pub fn realm_roles(&self) -> Vec<String> {
        role_list(self.0.get("realm_access"))
    }

    /// Roles from `resource_access[client_id].roles`.
    #[must_use]
    pub fn client_roles(&self, client_id: &str) -> Vec<String> {
        role_list(
            self.0
                .get("resource_access")
                .and_then(|access| access.get(client_id)),
        )
    }
}

fn role_list(access: Option<&Value>) -> Vec<String> {
    access
        .and_then(|access| access.get("roles"))
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
