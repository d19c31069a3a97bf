//! Configuration management for the gateway.
//!
//! Settings come from an optional `env.json` file with environment variables
//! taking precedence, so the service can run from a plain `.env` in
//! containerized deployments. The upstream key list is filtered through the
//! expected key format; anything else in the list is reported and dropped.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// Gemini API keys look like `AIzaSy` followed by 33 url-safe characters.
static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^AIzaSy[a-zA-Z0-9_-]{33}$").unwrap());

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Upstream API keys, in rotation order
    pub api_keys: Vec<String>,

    /// Shared secret expected in the `Authorization: Bearer` header
    pub auth_password: String,

    /// Maximum attempts per logical request
    pub max_retries: u32,

    /// Maximum requests per key inside one rate window
    pub max_requests: usize,

    /// Rate window duration in seconds
    pub limit_window_secs: u64,

    /// How long a quota-exhausted key stays blacklisted, in seconds
    pub blacklist_secs: u64,

    /// Base backoff delay in seconds
    pub retry_delay_secs: u64,

    /// Backoff delay cap in seconds
    pub max_retry_delay_secs: u64,

    /// Server configuration (host, port)
    pub server: ServerConfig,

    /// Upstream endpoint configuration
    pub upstream: UpstreamConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
        }
    }
}

/// Upstream endpoint configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the generative API
    pub api_base: String,

    /// Request timeout in seconds for upstream calls
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// On-disk `env.json` shape, kept compatible with existing deployments.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(rename = "KeyArray")]
    key_array: Option<KeyArray>,

    #[serde(rename = "password")]
    password: Option<String>,

    #[serde(rename = "MaxRetries")]
    max_retries: Option<u32>,

    #[serde(rename = "MaxRequests")]
    max_requests: Option<usize>,

    #[serde(rename = "LimitWindow")]
    limit_window: Option<u64>,

    #[serde(rename = "PORT")]
    port: Option<u16>,
}

/// `KeyArray` is either a newline-separated string or a proper list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyArray {
    Joined(String),
    List(Vec<String>),
}

impl KeyArray {
    fn into_keys(self) -> Vec<String> {
        match self {
            KeyArray::Joined(s) => s.lines().map(str::to_string).collect(),
            KeyArray::List(v) => v,
        }
    }
}

impl AppConfig {
    /// Load configuration from `env.json` (if present) and the environment.
    ///
    /// Environment variables always win over the file. Fails if no valid API
    /// key or no shared secret is configured.
    pub fn load() -> Result<Self> {
        Self::load_from("env.json")
    }

    /// Load configuration from a specific file path plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file: FileConfig = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            FileConfig::default()
        };

        let raw_keys = match std::env::var("KeyArray") {
            Ok(joined) => joined.lines().map(str::to_string).collect(),
            Err(_) => file.key_array.map(KeyArray::into_keys).unwrap_or_default(),
        };
        let api_keys = filter_api_keys(raw_keys);

        let auth_password = std::env::var("password")
            .ok()
            .or(file.password)
            .unwrap_or_default();

        let max_retries = env_parse("MaxRetries").or(file.max_retries).unwrap_or(3);
        let max_requests = env_parse("MaxRequests").or(file.max_requests).unwrap_or(2);
        let limit_window_secs = env_parse("LimitWindow").or(file.limit_window).unwrap_or(60);

        let mut server = ServerConfig::default();
        if let Ok(host) = std::env::var("HOST") {
            server.host = host;
        }
        if let Some(port) = env_parse("PORT").or(file.port) {
            server.port = port;
        }

        let mut upstream = UpstreamConfig::default();
        if let Ok(api_base) = std::env::var("GEMINI_API_BASE") {
            upstream.api_base = api_base;
        }
        if let Some(timeout) = env_parse("REQUEST_TIMEOUT_SECS") {
            upstream.request_timeout_secs = timeout;
        }

        let config = Self {
            api_keys,
            auth_password,
            max_retries,
            max_requests,
            limit_window_secs,
            blacklist_secs: env_parse("BlacklistSecs").unwrap_or(60),
            retry_delay_secs: env_parse("RetryDelay").unwrap_or(1),
            max_retry_delay_secs: env_parse("MaxRetryDelay").unwrap_or(16),
            server,
            upstream,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api_keys.is_empty() {
            bail!("No valid API keys configured; set KeyArray in env.json or the environment");
        }
        if self.auth_password.is_empty() {
            bail!("No shared secret configured; set password in env.json or the environment");
        }
        if self.max_retries == 0 {
            bail!("MaxRetries must be at least 1");
        }
        Ok(())
    }
}

/// Keep only entries that look like real upstream keys.
fn filter_api_keys(raw: Vec<String>) -> Vec<String> {
    let mut keys = Vec::new();
    for entry in raw {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if API_KEY_RE.is_match(entry) {
            keys.push(entry.to_string());
        } else {
            let prefix: String = entry.chars().take(6).collect();
            tracing::warn!(
                entry_prefix = %prefix,
                "Ignoring key entry that does not match the expected format"
            );
        }
    }
    keys
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_key(n: u8) -> String {
        // 33 filler characters after the fixed prefix
        format!("AIzaSy{}{}", "A".repeat(31), format!("{:02}", n))
    }

    fn clear_env() {
        for name in [
            "KeyArray",
            "password",
            "MaxRetries",
            "MaxRequests",
            "LimitWindow",
            "BlacklistSecs",
            "RetryDelay",
            "MaxRetryDelay",
            "PORT",
            "HOST",
            "GEMINI_API_BASE",
            "REQUEST_TIMEOUT_SECS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_filter_api_keys_drops_malformed_entries() {
        let keys = filter_api_keys(vec![
            valid_key(1),
            "not-a-key".to_string(),
            "".to_string(),
            format!("  {}  ", valid_key(2)),
        ]);
        assert_eq!(keys, vec![valid_key(1), valid_key(2)]);
    }

    #[test]
    fn test_key_array_joined_and_list_forms() {
        let joined = KeyArray::Joined(format!("{}\n{}", valid_key(1), valid_key(2)));
        assert_eq!(joined.into_keys().len(), 2);

        let list = KeyArray::List(vec![valid_key(3)]);
        assert_eq!(list.into_keys(), vec![valid_key(3)]);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"KeyArray": "{}\n{}", "password": "secret", "MaxRetries": 5, "PORT": 9000}}"#,
            valid_key(1),
            valid_key(2)
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.auth_password, "secret");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.server.port, 9000);
        // untouched fields keep their defaults
        assert_eq!(config.max_requests, 2);
        assert_eq!(config.limit_window_secs, 60);
        assert_eq!(config.retry_delay_secs, 1);
        assert_eq!(config.max_retry_delay_secs, 16);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"KeyArray": "{}", "password": "from-file", "MaxRetries": 5}}"#,
            valid_key(1)
        )
        .unwrap();

        std::env::set_var("password", "from-env");
        std::env::set_var("MaxRetries", "7");
        let config = AppConfig::load_from(file.path()).unwrap();
        clear_env();

        assert_eq!(config.auth_password, "from-env");
        assert_eq!(config.max_retries, 7);
    }

    #[test]
    #[serial]
    fn test_missing_keys_is_an_error() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"KeyArray": "garbage", "password": "secret"}}"#).unwrap();
        assert!(AppConfig::load_from(file.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_missing_password_is_an_error() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"KeyArray": "{}"}}"#, valid_key(1)).unwrap();
        assert!(AppConfig::load_from(file.path()).is_err());
    }
}
