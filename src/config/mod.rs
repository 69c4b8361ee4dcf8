// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKEND_PORT, DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_CDN_PLAIN_PORT,
    DEFAULT_CDN_TLS_PORT, DEFAULT_LOG_LEVEL, DEFAULT_MYSQL_MAX_CONNECTIONS,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_RESULT_STORAGE, DEFAULT_SERVER_ADDRESS,
    DEFAULT_SERVER_PORT, DEFAULT_SQLITE_PATH, DEFAULT_THREADS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub cdn: CdnConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_server_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_backend_timeout() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_SECS
}

fn default_result_storage() -> String {
    DEFAULT_RESULT_STORAGE.to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from(DEFAULT_SQLITE_PATH)
}

fn default_mysql_max_connections() -> u32 {
    DEFAULT_MYSQL_MAX_CONNECTIONS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Number of worker threads (default: 4)
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            port: default_server_port(),
            threads: default_threads(),
        }
    }
}

/// Internal image backend that renders signed paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// `host` or `host:port`, reached over plain HTTP
    pub host: String,
    /// HMAC key shared with the backend
    pub secret: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_backend_timeout")]
    pub timeout: u64,
}

impl BackendConfig {
    /// `(host, port)` of the upstream peer
    pub fn peer_endpoint(&self) -> (String, u16) {
        split_host_port(&self.host, DEFAULT_BACKEND_PORT)
    }

    /// Host without any port, used for the Host header
    pub fn host_name(&self) -> &str {
        strip_port(&self.host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// How a cache hit is answered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HitMode {
    /// 302 to the CDN URL
    #[default]
    Redirect,
    /// Forward the request to the CDN and stream the answer back
    Proxy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// Public CDN host, without scheme
    pub origin: String,
    /// Prefix the backend stores rendered results under (default: results)
    #[serde(default = "default_result_storage")]
    pub result_storage: String,
    #[serde(default)]
    pub hit_mode: HitMode,
}

impl CdnConfig {
    /// `{protocol}://{origin}{public_path}`
    pub fn public_url(&self, protocol: &str, public_path: &str) -> String {
        format!("{}://{}{}", protocol, self.origin, public_path)
    }

    /// `(host, port)` for proxying a hit with the project's protocol
    pub fn peer_endpoint(&self, tls: bool) -> (String, u16) {
        let port = if tls {
            DEFAULT_CDN_TLS_PORT
        } else {
            DEFAULT_CDN_PLAIN_PORT
        };
        split_host_port(&self.origin, port)
    }

    pub fn host_name(&self) -> &str {
        strip_port(&self.origin)
    }
}

/// Persistent store selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
    Mysql {
        url: String,
        #[serde(default = "default_mysql_max_connections")]
        max_connections: u32,
    },
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Timeout of the HEAD request measuring a cached image (default: 5000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl AnalyticsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when RUST_LOG is unset (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn split_host_port(host: &str, default_port: u16) -> (String, u16) {
    match host.split_once(':') {
        Some((h, p)) => (h.to_string(), p.parse::<u16>().unwrap_or(default_port)),
        None => (host.to_string(), default_port),
    }
}

/// Reject a `host:port` whose port is not a number in 1..=65535.
fn check_port(field: &str, host: &str) -> Result<(), String> {
    match host.split_once(':') {
        Some((_, p)) if !matches!(p.parse::<u16>(), Ok(port) if port > 0) => Err(format!(
            "{} '{}' has an invalid port '{}'",
            field, host, p
        )),
        _ => Ok(()),
    }
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be greater than 0".to_string());
        }
        if self.server.threads == 0 {
            return Err("server.threads must be at least 1".to_string());
        }

        if self.backend.host.trim().is_empty() {
            return Err("backend.host cannot be empty".to_string());
        }
        if self.backend.host.contains("://") {
            return Err(format!(
                "backend.host '{}' must not include a scheme",
                self.backend.host
            ));
        }
        check_port("backend.host", &self.backend.host)?;
        if self.backend.secret.is_empty() {
            return Err("backend.secret cannot be empty".to_string());
        }
        if self.backend.timeout == 0 {
            return Err("backend.timeout must be greater than 0".to_string());
        }

        if self.cdn.origin.trim().is_empty() {
            return Err("cdn.origin cannot be empty".to_string());
        }
        if self.cdn.origin.contains("://") || self.cdn.origin.contains('/') {
            return Err(format!(
                "cdn.origin '{}' must be a bare host without scheme or path",
                self.cdn.origin
            ));
        }
        check_port("cdn.origin", &self.cdn.origin)?;
        let storage = self.cdn.result_storage.trim_matches('/');
        if storage.is_empty() || storage.contains('/') {
            return Err(format!(
                "cdn.result_storage '{}' must be a single path segment",
                self.cdn.result_storage
            ));
        }

        if let DatabaseConfig::Mysql {
            url,
            max_connections,
        } = &self.database
        {
            if url.is_empty() {
                return Err("database.url cannot be empty for mysql".to_string());
            }
            if *max_connections == 0 {
                return Err("database.max_connections must be at least 1".to_string());
            }
        }

        if self.analytics.probe_timeout_ms == 0 {
            return Err("analytics.probe_timeout_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}
