//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for pc-runner, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for everything but the server and credentials
//! - Conversion into the typed settings the session and gateway consume
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PC_RUNNER_SERVER` | Service host, optionally with port | `localhost` |
//! | `PC_RUNNER_HTTPS` | Use HTTPS (`true`/`false`) | `false` |
//! | `PC_RUNNER_DOMAIN` | Domain holding the project | `DEFAULT` |
//! | `PC_RUNNER_PROJECT` | Project name | (empty) |
//! | `PC_RUNNER_USER` | Login user | (empty) |
//! | `PC_RUNNER_PASSWORD` | Login password | (empty) |
//! | `PC_RUNNER_PROXY_URL` | Outgoing proxy URL | (none) |
//! | `PC_RUNNER_PROXY_USER` | Proxy user | (none) |
//! | `PC_RUNNER_PROXY_PASSWORD` | Proxy password | (none) |
//! | `PC_RUNNER_CONNECT_TIMEOUT` | Connection timeout in seconds | `30` |
//! | `PC_RUNNER_POLL_INTERVAL_MS` | Run state poll interval (ms) | `5000` |
//! | `PC_RUNNER_RETRY_DELAY` | Seconds between start retries | `5` |
//! | `PC_RUNNER_RETRY_OCCURRENCES` | Start retries after a failure | `3` |
//! | `PC_RUNNER_REPORT_DIR` | Where reports are unpacked | `./pc-reports` |
//!
//! # Example
//!
//! ```bash
//! export PC_RUNNER_SERVER="pc.example.com:8080"
//! export PC_RUNNER_PROJECT="checkout"
//! export PC_RUNNER_USER="ci" PC_RUNNER_PASSWORD="..."
//! pc-runner run --test-id 12 --instance auto
//! ```

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use crate::session::{Credentials, ProxySettings, ServerSettings};

// ============================================================================
// Default Values
// ============================================================================

/// Default service host
pub const DEFAULT_SERVER: &str = "localhost";

/// Default domain
pub const DEFAULT_DOMAIN: &str = "DEFAULT";

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 30;

/// Default interval between run state polls (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default delay between start retries (seconds)
pub const DEFAULT_RETRY_DELAY: u64 = 5;

/// Default number of start retries
pub const DEFAULT_RETRY_OCCURRENCES: u32 = 3;

/// Default directory for downloaded reports
pub const DEFAULT_REPORT_DIR: &str = "./pc-reports";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_SERVER: &str = "PC_RUNNER_SERVER";
pub const ENV_HTTPS: &str = "PC_RUNNER_HTTPS";
pub const ENV_DOMAIN: &str = "PC_RUNNER_DOMAIN";
pub const ENV_PROJECT: &str = "PC_RUNNER_PROJECT";
pub const ENV_USER: &str = "PC_RUNNER_USER";
pub const ENV_PASSWORD: &str = "PC_RUNNER_PASSWORD";
pub const ENV_PROXY_URL: &str = "PC_RUNNER_PROXY_URL";
pub const ENV_PROXY_USER: &str = "PC_RUNNER_PROXY_USER";
pub const ENV_PROXY_PASSWORD: &str = "PC_RUNNER_PROXY_PASSWORD";
pub const ENV_CONNECT_TIMEOUT: &str = "PC_RUNNER_CONNECT_TIMEOUT";
pub const ENV_POLL_INTERVAL_MS: &str = "PC_RUNNER_POLL_INTERVAL_MS";
pub const ENV_RETRY_DELAY: &str = "PC_RUNNER_RETRY_DELAY";
pub const ENV_RETRY_OCCURRENCES: &str = "PC_RUNNER_RETRY_OCCURRENCES";
pub const ENV_REPORT_DIR: &str = "PC_RUNNER_REPORT_DIR";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for pc-runner
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the service lives and how to reach it
    pub server: ServerConfig,
    /// Login credentials
    pub credentials: Credentials,
    /// Defaults for run execution
    pub run: RunConfig,
}

/// Service endpoint settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server: String,
    pub https: bool,
    pub domain: String,
    pub project: String,
    pub proxy_url: Option<String>,
    pub proxy_user: Option<String>,
    pub proxy_password: Option<String>,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
}

/// Run execution defaults
///
/// Retry values are kept as the raw strings the user supplied; they are
/// validated when the retry policy is resolved so that invalid input can be
/// reported and replaced with defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub poll_interval_ms: u64,
    pub retry_delay: String,
    pub retry_occurrences: String,
    pub report_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            credentials: Credentials::new(
                env::var(ENV_USER).unwrap_or_default(),
                env::var(ENV_PASSWORD).unwrap_or_default(),
            ),
            run: RunConfig::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            server: ServerConfig::defaults(),
            credentials: Credentials::new("", ""),
            run: RunConfig::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            server: env::var(ENV_SERVER).unwrap_or_else(|_| DEFAULT_SERVER.to_string()),
            https: env::var(ENV_HTTPS)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(false),
            domain: env::var(ENV_DOMAIN).unwrap_or_else(|_| DEFAULT_DOMAIN.to_string()),
            project: env::var(ENV_PROJECT).unwrap_or_default(),
            proxy_url: non_empty_var(ENV_PROXY_URL),
            proxy_user: non_empty_var(ENV_PROXY_USER),
            proxy_password: non_empty_var(ENV_PROXY_PASSWORD),
            connect_timeout: env::var(ENV_CONNECT_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            https: false,
            domain: DEFAULT_DOMAIN.to_string(),
            project: String::new(),
            proxy_url: None,
            proxy_user: None,
            proxy_password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Typed settings for the session and gateway
    pub fn to_settings(&self) -> ServerSettings {
        let mut settings = ServerSettings::new(&self.server, &self.domain, &self.project)
            .https(self.https);
        if let Some(url) = &self.proxy_url {
            settings = settings.with_proxy(ProxySettings {
                url: url.clone(),
                user: self.proxy_user.clone(),
                password: self.proxy_password.clone(),
            });
        }
        settings
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: env::var(ENV_POLL_INTERVAL_MS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            retry_delay: env::var(ENV_RETRY_DELAY)
                .unwrap_or_else(|_| DEFAULT_RETRY_DELAY.to_string()),
            retry_occurrences: env::var(ENV_RETRY_OCCURRENCES)
                .unwrap_or_else(|_| DEFAULT_RETRY_OCCURRENCES.to_string()),
            report_dir: env::var(ENV_REPORT_DIR).unwrap_or_else(|_| DEFAULT_REPORT_DIR.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry_delay: DEFAULT_RETRY_DELAY.to_string(),
            retry_occurrences: DEFAULT_RETRY_OCCURRENCES.to_string(),
            report_dir: DEFAULT_REPORT_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a boolean flag: true/false, yes/no, on/off, 1/0
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get the default poll interval (convenience function)
pub fn poll_interval_ms() -> u64 {
    get().run.poll_interval_ms
}

/// Get the report directory (convenience function)
pub fn report_dir() -> String {
    get().run.report_dir.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.server.server, DEFAULT_SERVER);
        assert_eq!(config.server.domain, DEFAULT_DOMAIN);
        assert_eq!(config.run.poll_interval_ms, 5000);
        assert_eq!(config.run.retry_delay, "5");
        assert_eq!(config.run.retry_occurrences, "3");
    }

    #[test]
    fn test_to_settings_with_proxy() {
        let mut server = ServerConfig::defaults();
        server.server = "pc.example.com".to_string();
        server.https = true;
        server.project = "perf".to_string();
        server.proxy_url = Some("http://proxy:3128".to_string());
        server.proxy_user = Some("px".to_string());

        let settings = server.to_settings();
        assert_eq!(settings.base_url(), "https://pc.example.com");
        let proxy = settings.proxy.unwrap();
        assert_eq!(proxy.url, "http://proxy:3128");
        assert_eq!(proxy.user.as_deref(), Some("px"));
        assert_eq!(proxy.password, None);
    }
}
