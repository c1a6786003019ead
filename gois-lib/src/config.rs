//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files, reading
//! `GOIS_*` environment variables, and layering both over [`QueryConfig`]
//! defaults. Command-line flags are applied last by the binary.

use crate::error::WhoisError;
use crate::protocols::ProxyConfig;
use crate::types::{OutputMode, QueryConfig, MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defaults]
/// timeout = "15s"
/// concurrency = 20
/// mode = "simple"
///
/// [servers]
/// dev = "whois.nic.google"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// TLD → WHOIS host overrides, merged over the built-in table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<HashMap<String, String>>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Per-exchange timeout (as string, e.g., "10s", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Number of batch workers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Attempts per domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Delay between attempts (as string)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,

    /// Proxy URI, e.g. "socks5://127.0.0.1:1080"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// "normal" or "simple"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Query this host for every domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois_server: Option<String>,
}

impl DefaultsConfig {
    /// Overlay these values onto `config`.
    pub fn apply_to(&self, mut config: QueryConfig) -> Result<QueryConfig, WhoisError> {
        if let Some(timeout) = &self.timeout {
            config = config.with_timeout(require_duration("timeout", timeout)?);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(retries) = self.retries {
            config = config.with_max_retries(retries);
        }
        if let Some(delay) = &self.retry_delay {
            config = config.with_retry_delay(require_duration("retry_delay", delay)?);
        }
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(Some(ProxyConfig::parse(proxy)?));
        }
        if let Some(mode) = &self.mode {
            config = config.with_mode(mode.parse()?);
        }
        if let Some(server) = &self.whois_server {
            config = config.with_whois_server(Some(server.clone()));
        }
        Ok(config)
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to log which files were picked up
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, WhoisError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(WhoisError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            WhoisError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;
        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is the lowest precedence, then `$HOME`, then the current
    /// directory. Files that fail to load are skipped with a warning.
    pub fn discover_and_load(&self) -> Result<FileConfig, WhoisError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping config file"),
            }
        }

        if self.verbose {
            for path in &loaded_files {
                tracing::info!(path = %path.display(), "loaded config file");
            }
        }

        Ok(merged_config)
    }

    /// Get the local configuration file path.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./gois.toml", "./.gois.toml"]
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Get the global configuration file path.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let path = Path::new(&home).join(".gois.toml");
        path.exists().then_some(path)
    }

    /// Get the XDG configuration file path.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("gois").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations with proper precedence.
    ///
    /// Values from `higher` take precedence over values from `lower`.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(mut lower_defaults), Some(higher_defaults)) => {
                    if higher_defaults.timeout.is_some() {
                        lower_defaults.timeout = higher_defaults.timeout;
                    }
                    if higher_defaults.concurrency.is_some() {
                        lower_defaults.concurrency = higher_defaults.concurrency;
                    }
                    if higher_defaults.retries.is_some() {
                        lower_defaults.retries = higher_defaults.retries;
                    }
                    if higher_defaults.retry_delay.is_some() {
                        lower_defaults.retry_delay = higher_defaults.retry_delay;
                    }
                    if higher_defaults.proxy.is_some() {
                        lower_defaults.proxy = higher_defaults.proxy;
                    }
                    if higher_defaults.mode.is_some() {
                        lower_defaults.mode = higher_defaults.mode;
                    }
                    if higher_defaults.whois_server.is_some() {
                        lower_defaults.whois_server = higher_defaults.whois_server;
                    }
                    Some(lower_defaults)
                }
                (None, Some(higher_defaults)) => Some(higher_defaults),
                (Some(lower_defaults), None) => Some(lower_defaults),
                (None, None) => None,
            },
            servers: match (lower.servers, higher.servers) {
                (Some(mut lower_servers), Some(higher_servers)) => {
                    lower_servers.extend(higher_servers);
                    Some(lower_servers)
                }
                (lower_servers, higher_servers) => higher_servers.or(lower_servers),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), WhoisError> {
        if let Some(defaults) = &config.defaults {
            if let Some(concurrency) = defaults.concurrency {
                if concurrency == 0 || concurrency > MAX_CONCURRENCY {
                    return Err(WhoisError::config(format!(
                        "Concurrency must be between 1 and {}",
                        MAX_CONCURRENCY
                    )));
                }
            }

            if defaults.retries == Some(0) {
                return Err(WhoisError::config("Retries must be at least 1"));
            }

            for (name, value) in [
                ("timeout", &defaults.timeout),
                ("retry_delay", &defaults.retry_delay),
            ] {
                if let Some(value) = value {
                    require_duration(name, value)?;
                }
            }

            if let Some(mode) = &defaults.mode {
                mode.parse::<OutputMode>()?;
            }

            if let Some(proxy) = &defaults.proxy {
                ProxyConfig::parse(proxy)?;
            }
        }

        if let Some(servers) = &config.servers {
            for (tld, host) in servers {
                if tld.trim().is_empty() || host.trim().is_empty() {
                    return Err(WhoisError::config(format!(
                        "Invalid server entry '{}' = '{}'",
                        tld, host
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// Only values that parsed are kept; raw strings have already been
/// validated.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub timeout: Option<Duration>,
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub proxy: Option<ProxyConfig>,
    pub mode: Option<OutputMode>,
    pub whois_server: Option<String>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Overlay the variables that were set onto `config`.
    pub fn apply_to(&self, mut config: QueryConfig) -> QueryConfig {
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(retries) = self.retries {
            config = config.with_max_retries(retries);
        }
        if let Some(delay) = self.retry_delay {
            config = config.with_retry_delay(delay);
        }
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(Some(proxy.clone()));
        }
        if let Some(mode) = self.mode {
            config = config.with_mode(mode);
        }
        if let Some(server) = &self.whois_server {
            config = config.with_whois_server(Some(server.clone()));
        }
        config
    }
}

/// Load configuration from `GOIS_*` environment variables.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|key| env::var(key).ok())
}

/// Like [`load_env_config`] with a custom variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(val) = get("GOIS_TIMEOUT") {
        match parse_duration_string(&val) {
            Some(timeout) => env_config.timeout = Some(timeout),
            None => tracing::warn!(value = %val, "invalid GOIS_TIMEOUT, use a format like '10s' or '2m'"),
        }
    }

    if let Some(val) = get("GOIS_CONCURRENCY") {
        match val.trim().parse::<usize>() {
            Ok(concurrency) if (1..=MAX_CONCURRENCY).contains(&concurrency) => {
                env_config.concurrency = Some(concurrency)
            }
            _ => tracing::warn!(value = %val, "invalid GOIS_CONCURRENCY, must be 1-{}", MAX_CONCURRENCY),
        }
    }

    if let Some(val) = get("GOIS_RETRIES") {
        match val.trim().parse::<u32>() {
            Ok(retries) if retries >= 1 => env_config.retries = Some(retries),
            _ => tracing::warn!(value = %val, "invalid GOIS_RETRIES, must be at least 1"),
        }
    }

    if let Some(val) = get("GOIS_RETRY_DELAY") {
        match parse_duration_string(&val) {
            Some(delay) => env_config.retry_delay = Some(delay),
            None => tracing::warn!(value = %val, "invalid GOIS_RETRY_DELAY, use a format like '2s'"),
        }
    }

    if let Some(val) = get("GOIS_PROXY") {
        match ProxyConfig::parse(&val) {
            Ok(proxy) => env_config.proxy = Some(proxy),
            Err(e) => tracing::warn!(error = %e, "invalid GOIS_PROXY"),
        }
    }

    if let Some(val) = get("GOIS_MODE") {
        match val.parse::<OutputMode>() {
            Ok(mode) => env_config.mode = Some(mode),
            Err(e) => tracing::warn!(error = %e, "invalid GOIS_MODE"),
        }
    }

    env_config.whois_server = get("GOIS_WHOIS_SERVER").map(|s| s.trim().to_string());
    env_config.config = get("GOIS_CONFIG");

    env_config
}

/// Parse a duration string like "500ms", "5s", "2m"; bare numbers are
/// seconds.
pub fn parse_duration_string(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        value.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn require_duration(name: &str, value: &str) -> Result<Duration, WhoisError> {
    parse_duration_string(value).ok_or_else(|| {
        WhoisError::config(format!(
            "Invalid {} format '{}'. Use format like '5s', '30s', '2m'",
            name, value
        ))
    })
}
