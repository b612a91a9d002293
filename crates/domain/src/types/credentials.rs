//! Credential types handled by the vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::ProviderKind;

/// Decrypted provider secrets. Only ever materialized inside the scope of a
/// single connector call; the stored form is the encrypted blob on
/// [`ProviderCredential`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth", rename_all = "snake_case")]
pub enum ProviderAccess {
    /// OAuth bearer token plus optional refresh token.
    OAuth {
        access_token: String,
        refresh_token: Option<String>,
    },
    /// App-specific password (CalDAV family).
    AppPassword { username: String, password: String },
}

/// Encrypted, per-user, per-provider credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub user_id: String,
    pub provider: ProviderKind,
    /// Authenticated-encryption ciphertext of the serialized
    /// [`ProviderAccess`], base64-encoded.
    pub blob: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the provider supports token refresh at all.
    pub refreshable: bool,
}

/// Result of a provider token-refresh call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefresh {
    pub access_token: String,
    /// Seconds until the new token expires.
    pub expires_in: i64,
}
