//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `CALBRIDGE_DB_PATH`: Database file path
//! - `CALBRIDGE_DB_POOL_SIZE`: Connection pool size
//! - `CALBRIDGE_MASTER_KEY`: Hex-encoded 32-byte vault master key
//! - `CALBRIDGE_AI_API_KEY`: AI collaborator API key
//! - `CALBRIDGE_AI_MODEL`: Model name (optional)
//! - `CALBRIDGE_SESSION_TTL_MINUTES`: Pending-session TTL (optional)
//! - `CALBRIDGE_AI_PARSE_QUOTA`: AI parses per user per hour (optional)
//! - `CALBRIDGE_TRANSCRIBE_QUOTA`: Transcriptions per user per hour (optional)
//! - `CALBRIDGE_GOOGLE_CLIENT_ID` / `CALBRIDGE_GOOGLE_CLIENT_SECRET`
//! - `CALBRIDGE_MS_CLIENT_ID` / `CALBRIDGE_MS_CLIENT_SECRET`
//! - `CALBRIDGE_CALDAV_URL`: CalDAV endpoint (optional)

use std::path::{Path, PathBuf};

use calbridge_domain::{CalbridgeError, Config, OAuthAppConfig, Result};
use tracing::{debug, info};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variables are missing, falls back to loading from a config file.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `CalbridgeError::Config` if required variables are missing or
/// have invalid values.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("CALBRIDGE_DB_PATH")?;
    if let Some(pool_size) = env_opt("CALBRIDGE_DB_POOL_SIZE") {
        config.database.pool_size = pool_size
            .parse()
            .map_err(|e| CalbridgeError::Config(format!("invalid pool size: {e}")))?;
    }

    config.security.master_key_hex = env_opt("CALBRIDGE_MASTER_KEY");
    config.ai.api_key = env_opt("CALBRIDGE_AI_API_KEY");
    if let Some(model) = env_opt("CALBRIDGE_AI_MODEL") {
        config.ai.model = model;
    }

    if let Some(ttl) = env_opt("CALBRIDGE_SESSION_TTL_MINUTES") {
        config.session.ttl_minutes = ttl
            .parse()
            .map_err(|e| CalbridgeError::Config(format!("invalid session TTL: {e}")))?;
    }
    if let Some(quota) = env_opt("CALBRIDGE_AI_PARSE_QUOTA") {
        config.quotas.ai_parse_per_hour = quota
            .parse()
            .map_err(|e| CalbridgeError::Config(format!("invalid AI parse quota: {e}")))?;
    }
    if let Some(quota) = env_opt("CALBRIDGE_TRANSCRIBE_QUOTA") {
        config.quotas.transcribe_per_hour = quota
            .parse()
            .map_err(|e| CalbridgeError::Config(format!("invalid transcribe quota: {e}")))?;
    }

    config.providers.google = oauth_app_from_env("CALBRIDGE_GOOGLE");
    config.providers.microsoft = oauth_app_from_env("CALBRIDGE_MS");
    config.providers.caldav_url = env_opt("CALBRIDGE_CALDAV_URL");

    Ok(config)
}

/// Load configuration from a file (JSON or TOML, by extension)
///
/// When no path is given, probes `config.json`/`config.toml` and
/// `calbridge.json`/`calbridge.toml` in the working directory and its
/// parent.
pub fn load_from_file(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => probe_config_paths().ok_or_else(|| {
            CalbridgeError::Config("no configuration file found".into())
        })?,
    };

    let data = std::fs::read_to_string(&path)
        .map_err(|e| CalbridgeError::Config(format!("cannot read {}: {e}", path.display())))?;

    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&data)
            .map_err(|e| CalbridgeError::Config(format!("invalid TOML: {e}")))?,
        _ => serde_json::from_str(&data)
            .map_err(|e| CalbridgeError::Config(format!("invalid JSON: {e}")))?,
    };

    info!(path = %path.display(), "Configuration loaded from file");
    Ok(config)
}

fn probe_config_paths() -> Option<PathBuf> {
    const CANDIDATES: [&str; 8] = [
        "config.json",
        "config.toml",
        "calbridge.json",
        "calbridge.toml",
        "../config.json",
        "../config.toml",
        "../calbridge.json",
        "../calbridge.toml",
    ];
    CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| CalbridgeError::Config(format!("missing environment variable {name}")))
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn oauth_app_from_env(prefix: &str) -> Option<OAuthAppConfig> {
    let client_id = env_opt(&format!("{prefix}_CLIENT_ID"))?;
    let client_secret = env_opt(&format!("{prefix}_CLIENT_SECRET"))?;
    Some(OAuthAppConfig { client_id, client_secret })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_round_trips() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let dir = std::env::temp_dir().join("calbridge-config-test.json");
        std::fs::write(&dir, json).unwrap();

        let loaded = load_from_file(Some(&dir)).unwrap();
        assert_eq!(loaded.database.pool_size, config.database.pool_size);
        assert_eq!(loaded.quotas.ai_parse_per_hour, config.quotas.ai_parse_per_hour);

        std::fs::remove_file(&dir).ok();
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_file(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(matches!(err, CalbridgeError::Config(_)));
    }
}
