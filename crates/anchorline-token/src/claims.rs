//! Claims carried by a credential and the identity derived from them.

use serde::{Deserialize, Serialize};

/// The decoded claims segment of a credential.
///
/// Field names follow the identity provider's camelCase wire format,
/// with the registered JWT names (`sub`, `exp`, `name`) accepted as
/// aliases so standard tokens decode too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Who the credential was issued to.
    #[serde(rename = "subject", alias = "sub")]
    pub subject: String,

    /// Expiry, in epoch seconds.
    #[serde(rename = "expiresAt", alias = "exp")]
    pub expires_at: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    #[serde(
        default,
        rename = "displayName",
        alias = "name",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Read-only view of the signed-in subject.
///
/// Built from a credential's [`Claims`], optionally enriched with the
/// richer profile the server returns. An `Identity` is never stored on
/// its own: whenever the credential changes, a new one is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub role: Option<String>,
    pub permissions: Vec<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Expiry of the credential this identity was derived from.
    pub expires_at: i64,
    /// Server-side profile document, opaque to this layer.
    pub profile: Option<serde_json::Value>,
}

impl Identity {
    /// Projects the claims of a credential.
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            subject: claims.subject.clone(),
            role: claims.role.clone(),
            permissions: claims.permissions.clone(),
            display_name: claims.display_name.clone(),
            email: claims.email.clone(),
            expires_at: claims.expires_at,
            profile: None,
        }
    }

    /// Attaches a server profile.
    ///
    /// The profile only fills gaps: anything the credential itself
    /// asserts wins over the profile, since the claims are what the
    /// server will authorize against.
    pub fn with_profile(mut self, profile: serde_json::Value) -> Self {
        let text = |key: &str| {
            profile
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        };
        if self.display_name.is_none() {
            self.display_name = text("displayName").or_else(|| text("name"));
        }
        if self.email.is_none() {
            self.email = text("email");
        }
        if self.role.is_none() {
            self.role = text("role");
        }
        self.profile = Some(profile);
        self
    }

    /// Returns `true` if the identity was granted `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Returns `true` if the identity's role is `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}
