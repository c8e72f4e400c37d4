use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_USER_AGENT: &str = "wikibot/0.1";

/// Engine configuration. Precedence everywhere is caller override > env >
/// config file > these defaults, applied field by field.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BotConfig {
    /// Action API endpoint, e.g. `https://wiki.example.org/w/api.php`.
    /// Empty means unconfigured; requests fail before anything is sent.
    pub api_url: String,
    pub user_agent: String,
    /// Single-call transport timeout. No deadline exists above this.
    pub timeout_ms: u64,
    /// `maxlag` parameter attached to every request unless the caller set
    /// their own. `None` disables it.
    pub maxlag: Option<u64>,
    /// Pause before re-issuing a lag-throttled request.
    pub retry_pause_ms: u64,
    /// How many times a lag-throttled request is re-issued before the
    /// `maxlag` error surfaces to the caller.
    pub max_lag_retries: usize,
    /// How many stale-token refresh cycles one logical request may go
    /// through before the `badtoken` error surfaces.
    pub max_token_retries: usize,
    /// Whether this account holds `apihighlimits` (500-value fields instead
    /// of 50). Caller-declared, never probed.
    pub has_api_high_limit: bool,
    pub default_concurrency: usize,
    pub default_delay_ms: u64,
    /// Ceiling on calls made by one continuation loop.
    pub max_continuation_calls: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: 30_000,
            maxlag: Some(5),
            retry_pause_ms: 5_000,
            max_lag_retries: 3,
            max_token_retries: 3,
            has_api_high_limit: false,
            default_concurrency: 5,
            default_delay_ms: 5_000,
            max_continuation_calls: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api: BotConfig,
}

impl BotConfig {
    /// Load the `[api]` section of a TOML file. A missing file yields the
    /// defaults; env overrides are applied either way.
    pub fn load(config_path: &Path) -> Result<Self, Error> {
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path).map_err(|error| {
                Error::Config(format!("failed to read {}: {error}", config_path.display()))
            })?;
            let parsed: ConfigFile = toml::from_str(&content).map_err(|error| {
                Error::Config(format!("failed to parse {}: {error}", config_path.display()))
            })?;
            parsed.api
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus env overrides, no config file involved.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `WIKIBOT_*` environment overrides in place.
    pub fn apply_env(&mut self) {
        self.api_url = env_value("WIKIBOT_API_URL", &self.api_url);
        self.user_agent = env_value("WIKIBOT_USER_AGENT", &self.user_agent);
        self.timeout_ms = env_value_u64("WIKIBOT_TIMEOUT_MS", self.timeout_ms);
        self.retry_pause_ms = env_value_u64("WIKIBOT_RETRY_PAUSE_MS", self.retry_pause_ms);
        self.max_lag_retries = env_value_usize("WIKIBOT_MAX_LAG_RETRIES", self.max_lag_retries);
    }

    /// Per-call cap on multi-value fields: 500 for high-limit accounts,
    /// 50 otherwise.
    pub fn api_limit(&self) -> usize {
        if self.has_api_high_limit { 500 } else { 50 }
    }
}

/// Per-call transport overrides. These take precedence over [`BotConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub timeout_ms: Option<u64>,
}

impl RequestOptions {
    pub fn post() -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

fn env_value(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = BotConfig::default();
        assert!(config.api_url.is_empty());
        assert_eq!(config.user_agent, "wikibot/0.1");
        assert_eq!(config.maxlag, Some(5));
        assert_eq!(config.max_lag_retries, 3);
        assert_eq!(config.default_concurrency, 5);
        assert_eq!(config.default_delay_ms, 5_000);
        assert_eq!(config.max_continuation_calls, 10);
    }

    #[test]
    fn api_limit_tiers() {
        let mut config = BotConfig::default();
        assert_eq!(config.api_limit(), 50);
        config.has_api_high_limit = true;
        assert_eq!(config.api_limit(), 500);
    }

    #[test]
    fn load_returns_defaults_for_missing_file() {
        let config = BotConfig::load(Path::new("/nonexistent/wikibot.toml")).expect("load");
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn load_parses_partial_api_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("wikibot.toml");
        fs::write(
            &config_path,
            r#"
[api]
api_url = "https://wiki.example.org/w/api.php"
has_api_high_limit = true
retry_pause_ms = 1000
"#,
        )
        .expect("write config");

        let config = BotConfig::load(&config_path).expect("load");
        assert_eq!(config.api_url, "https://wiki.example.org/w/api.php");
        assert!(config.has_api_high_limit);
        assert_eq!(config.retry_pause_ms, 1_000);
        // untouched fields keep their defaults
        assert_eq!(config.max_lag_retries, 3);
    }

    #[test]
    fn load_tolerates_unrelated_sections() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("wikibot.toml");
        fs::write(&config_path, "[paths]\nproject_root = \"/repo\"\n").expect("write config");
        let config = BotConfig::load(&config_path).expect("load");
        assert!(config.api_url.is_empty());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("wikibot.toml");
        fs::write(
            &config_path,
            "[api]\ntimeout_ms = 10000\nretry_pause_ms = 1000\n",
        )
        .expect("write config");

        // Tests run in parallel and every `load` reads the live environment:
        // only touch variables whose fields no other test asserts, and a
        // blank value, which by the keep-prior rule changes nothing.
        unsafe {
            env::set_var("WIKIBOT_TIMEOUT_MS", "45000");
            env::set_var("WIKIBOT_USER_AGENT", "   ");
        }
        let config = BotConfig::load(&config_path);
        unsafe {
            env::remove_var("WIKIBOT_TIMEOUT_MS");
            env::remove_var("WIKIBOT_USER_AGENT");
        }

        let config = config.expect("load");
        assert_eq!(config.timeout_ms, 45_000);
        // blank env value keeps the prior value
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        // untouched fields keep what the file said
        assert_eq!(config.retry_pause_ms, 1_000);
        assert_eq!(config.max_lag_retries, 3);
    }

    #[test]
    fn load_surfaces_invalid_toml() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config_path = temp.path().join("wikibot.toml");
        fs::write(&config_path, "[api\napi_url = \"oops\"").expect("write config");
        let error = BotConfig::load(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }
}
