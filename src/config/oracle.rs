// src/config/oracle.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_ORACLE_CONFIG_PATH: &str = "config/oracle.json";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "gemini" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from GEMINI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            api_key: String::new(),
            model: default_model(),
        }
    }
}

impl OracleConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: OracleConfig = serde_json::from_str(data)?;

        // Normalize provider
        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV"; a disabled oracle never needs it
        if cfg.api_key.trim().eq_ignore_ascii_case("env") && !cfg.enabled {
            cfg.api_key.clear();
        } else if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "gemini" => env::var(ENV_GEMINI_API_KEY)
                    .map_err(|_| anyhow::anyhow!("Missing {ENV_GEMINI_API_KEY} env var"))?,
                other => anyhow::bail!("Unsupported oracle provider in config: {other}"),
            };
        }
        Ok(cfg)
    }

    /// Load the default file; absent or unreadable config means "oracle disabled".
    pub fn load_or_default() -> Self {
        let path = Path::new(DEFAULT_ORACLE_CONFIG_PATH);
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(target: "config", error = %e, "oracle config unusable, oracle disabled");
                Self::default()
            }
        }
    }

    /// Same config with a user-supplied key (saved through the settings API).
    pub fn with_api_key(mut self, key: &str) -> Self {
        let key = key.trim();
        if !key.is_empty() {
            self.api_key = key.to_string();
            self.enabled = true;
        }
        self
    }

    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = OracleConfig::from_json_str(r#"{"enabled": true, "api_key": "k"}"#).unwrap();
        assert_eq!(cfg.provider, "gemini");
        assert_eq!(cfg.model, "gemini-2.0-flash");
        assert!(cfg.is_usable());
    }

    #[serial_test::serial]
    #[test]
    fn env_key_resolution() {
        std::env::set_var(ENV_GEMINI_API_KEY, "from-env");
        let cfg =
            OracleConfig::from_json_str(r#"{"enabled": true, "provider": "Gemini", "api_key": "ENV"}"#)
                .unwrap();
        std::env::remove_var(ENV_GEMINI_API_KEY);
        assert_eq!(cfg.api_key, "from-env");

        let err =
            OracleConfig::from_json_str(r#"{"enabled": true, "provider": "other", "api_key": "env"}"#);
        assert!(err.is_err());
    }

    #[serial_test::serial]
    #[test]
    fn disabled_oracle_skips_env_lookup() {
        std::env::remove_var(ENV_GEMINI_API_KEY);
        let cfg = OracleConfig::from_json_str(r#"{"enabled": false, "api_key": "ENV"}"#).unwrap();
        assert!(cfg.api_key.is_empty());
        assert!(!cfg.is_usable());
    }

    #[test]
    fn saved_key_enables_oracle() {
        let cfg = OracleConfig::default().with_api_key("  secret ");
        assert!(cfg.is_usable());
        assert_eq!(cfg.api_key, "secret");
        assert!(!OracleConfig::default().with_api_key("   ").is_usable());
    }
}
