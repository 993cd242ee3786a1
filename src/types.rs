use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Numeric account identifier assigned by the identity endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Profile of the signed-in user.
///
/// Replaced wholesale on every successful login or profile fetch; never
/// partially mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    /// Create a profile with no roles.
    #[must_use]
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            roles: Vec::new(),
        }
    }

    /// Set the roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Whether the profile carries the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Shorthand for `has_role("ROLE_ADMIN")`.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role("ROLE_ADMIN")
    }
}

/// Access and refresh credentials issued by the identity endpoint.
///
/// Both tokens are opaque strings. A pair is always complete: the store
/// persists a whole pair together with the profile, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute deadline of the access token.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl CredentialPair {
    /// Whether the access token is still valid `leeway` from now.
    #[must_use]
    pub fn fresh_for(&self, leeway: time::Duration) -> bool {
        self.expires_at - OffsetDateTime::now_utc() > leeway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn profile(roles: &[&str]) -> UserProfile {
        UserProfile {
            id: UserId(7),
            email: "a@b.com".into(),
            first_name: "Ada".into(),
            last_name: "Bell".into(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    #[test]
    fn role_helpers() {
        let user = profile(&["ROLE_USER"]);
        assert!(user.has_role("ROLE_USER"));
        assert!(!user.has_role("ROLE_ADMIN"));
        assert!(!user.is_admin());

        let admin = profile(&["ROLE_USER", "ROLE_ADMIN"]);
        assert!(admin.is_admin());
    }

    #[test]
    fn freshness_respects_leeway() {
        let pair = CredentialPair {
            access_token: "acc".into(),
            refresh_token: "ref".into(),
            expires_at: OffsetDateTime::now_utc() + Duration::seconds(60),
        };
        assert!(pair.fresh_for(Duration::seconds(30)));
        assert!(!pair.fresh_for(Duration::seconds(120)));
    }

    #[test]
    fn expired_pair_is_never_fresh() {
        let pair = CredentialPair {
            access_token: "acc".into(),
            refresh_token: "ref".into(),
            expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
        };
        assert!(!pair.fresh_for(Duration::ZERO));
    }

    #[test]
    fn profile_serde_uses_wire_names() {
        let json = serde_json::json!({
            "id": 3,
            "email": "a@b.com",
            "firstName": "Ada",
            "lastName": "Bell",
            "roles": ["ROLE_USER"]
        });
        let parsed: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.id, UserId(3));
        assert_eq!(parsed.first_name, "Ada");

        let back = serde_json::to_value(&parsed).unwrap();
        assert!(back.get("firstName").is_some());
    }

    #[test]
    fn missing_roles_default_to_empty() {
        let json = serde_json::json!({
            "id": 3,
            "email": "a@b.com",
            "firstName": "Ada",
            "lastName": "Bell"
        });
        let parsed: UserProfile = serde_json::from_value(json).unwrap();
        assert!(parsed.roles.is_empty());
    }
}
