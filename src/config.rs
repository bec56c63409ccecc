//! Process configuration from the environment.
//!
//! The token-signing secret is required: a missing `JWT_SECRET` is a fatal
//! server configuration error at boot, never a per-request failure.

use crate::error::ConfigError;

const DEFAULT_ACCESS_TTL_SECS: u64 = 3600;
const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Shared HS256 signing secret for bearer tokens.
    pub jwt_secret: String,
    /// Lowercase collection names that skip authentication entirely.
    pub public_collections: Vec<String>,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
}

impl AppConfig {
    /// Read configuration from `JWT_SECRET` (required) and
    /// `PUBLIC_COLLECTIONS` (optional comma-separated allowlist).
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSetting("JWT_SECRET"))?;
        let public_collections = std::env::var("PUBLIC_COLLECTIONS")
            .map(|raw| parse_collections(&raw))
            .unwrap_or_default();
        let access_token_ttl_secs = parse_ttl("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_token_ttl_secs = parse_ttl("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?;
        Ok(AppConfig {
            jwt_secret,
            public_collections,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
        })
    }

    pub fn new(jwt_secret: impl Into<String>, public_collections: Vec<String>) -> Self {
        AppConfig {
            jwt_secret: jwt_secret.into(),
            public_collections,
            access_token_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
        }
    }

    pub fn is_public(&self, collection: &str) -> bool {
        self.public_collections
            .iter()
            .any(|c| c == &collection.to_ascii_lowercase())
    }
}

fn parse_collections(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_ttl(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidSetting {
            name,
            reason: format!("expected seconds, got '{}'", raw),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_is_lowercased_and_trimmed() {
        assert_eq!(
            parse_collections(" Product , product-review,"),
            vec!["product".to_string(), "product-review".to_string()]
        );
    }

    #[test]
    fn public_check_is_case_insensitive() {
        let cfg = AppConfig::new("s", vec!["product".into()]);
        assert!(cfg.is_public("Product"));
        assert!(!cfg.is_public("user"));
    }
}
