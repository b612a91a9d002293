//! Configuration structures for the application.

use serde::{Deserialize, Serialize};

use crate::constants::{
    AI_PARSE_QUOTA_PER_HOUR, SESSION_TTL_MINUTES, TRANSCRIBE_QUOTA_PER_HOUR,
};
use crate::types::SlotPreferences;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub quotas: QuotaConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub slots: SlotPreferences,
    pub ai: AiConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Vault key material. The master key is normally injected through the
/// environment; the file form exists for development setups only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Hex-encoded 32-byte master key for the credential vault.
    pub master_key_hex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "calbridge.db".into(), pool_size: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub ai_parse_per_hour: u32,
    pub transcribe_per_hour: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            ai_parse_per_hour: AI_PARSE_QUOTA_PER_HOUR,
            transcribe_per_hour: TRANSCRIBE_QUOTA_PER_HOUR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_minutes: SESSION_TTL_MINUTES }
    }
}

/// AI collaborator endpoints (chat-completions-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_url: String,
    pub transcription_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            transcription_url: "https://api.openai.com/v1/audio/transcriptions".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            max_tokens: 1000,
            temperature: 0.1,
        }
    }
}

/// OAuth application registration for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthAppConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub google: Option<OAuthAppConfig>,
    pub microsoft: Option<OAuthAppConfig>,
    /// Base URL of the CalDAV endpoint (e.g. `https://caldav.yandex.ru`).
    pub caldav_url: Option<String>,
}
