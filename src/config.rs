//! Configuration management for admin-metrics-aggregator.
//!
//! Loads the service configuration from YAML, JSON or TOML files and turns
//! the raw, string-typed source entries into validated settings. Any error
//! here is fatal at startup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;
use crate::exposition::{is_valid_label_name, Label};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8085;
pub const DEFAULT_REFRESH_DURATION: &str = "60s";
pub const DEFAULT_SOURCE_TIMEOUT: &str = "5s";
pub const DEFAULT_GOTRUE_HEALTH_ENDPOINT: &str = "http://localhost:9999/health";
pub const DEFAULT_POSTGREST_ENDPOINT: &str = "http://localhost:3000/";

/// Default configuration file locations, tried in order.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/admin-metrics-aggregator/config.yaml",
    "/etc/admin-metrics-aggregator/config.yml",
    "/etc/admin-metrics-aggregator/config.json",
    "./admin-metrics-aggregator.yaml",
    "./admin-metrics-aggregator.yml",
    "./admin-metrics-aggregator.json",
];

/// A static label attached to every sample of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPair {
    pub name: String,
    pub value: String,
}

/// One upstream metrics source as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSourceConfig {
    /// Used for logging and per-source telemetry only.
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub skip_tls_verify: bool,
    /// Duration string such as "500ms" or "5s".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_timeout: Option<String>,
    #[serde(default)]
    pub labels_to_attach: Vec<LabelPair>,
}

/// Validated, typed settings for one upstream source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub name: String,
    pub url: String,
    pub labels: Vec<Label>,
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

impl MetricsSourceConfig {
    /// Validates the entry at position `index` of the source list.
    pub fn resolve(&self, index: usize) -> Result<SourceSettings, ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl { index });
        }

        for label in &self.labels_to_attach {
            if !is_valid_label_name(&label.name) {
                return Err(ConfigError::InvalidLabelName {
                    source_name: self.name.clone(),
                    label: label.name.clone(),
                });
            }
        }

        let timeout = parse_duration(
            &format!("upstream_metrics_sources[{index}].source_timeout"),
            self.source_timeout
                .as_deref()
                .unwrap_or(DEFAULT_SOURCE_TIMEOUT),
        )?;

        Ok(SourceSettings {
            name: self.name.clone(),
            url: self.url.clone(),
            labels: self
                .labels_to_attach
                .iter()
                .map(|l| Label::new(l.name.clone(), l.value.clone()))
                .collect(),
            skip_tls_verify: self.skip_tls_verify,
            timeout,
        })
    }
}

/// Node-local collectors that can be enabled via `metric_collectors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    Meminfo,
    Gotrue,
    Postgrest,
}

impl FromStr for CollectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "meminfo" => Ok(CollectorKind::Meminfo),
            "gotrue" => Ok(CollectorKind::Gotrue),
            "postgrest" => Ok(CollectorKind::Postgrest),
            other => Err(ConfigError::UnknownCollector(other.to_string())),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    #[serde(alias = "host")]
    pub bind: Option<String>,

    // Upstream aggregation
    /// Cache TTL for the merged upstream document.
    pub upstream_metrics_refresh_duration: Option<String>,

    // Node-local collectors
    pub metric_collectors: Option<Vec<String>>,
    pub gotrue_health_endpoint: Option<String>,
    pub postgrest_endpoint: Option<String>,

    // Feature flags
    pub enable_health: Option<bool>,

    // TLS/SSL Configuration
    pub enable_tls: Option<bool>,
    #[serde(alias = "cert_path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "key_path")]
    pub tls_key_path: Option<String>,

    // Array of tables, kept last so TOML output stays valid.
    #[serde(default)]
    pub upstream_metrics_sources: Vec<MetricsSourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            upstream_metrics_sources: Vec::new(),
            upstream_metrics_refresh_duration: Some(DEFAULT_REFRESH_DURATION.to_string()),
            metric_collectors: Some(vec!["meminfo".to_string()]),
            gotrue_health_endpoint: Some(DEFAULT_GOTRUE_HEALTH_ENDPOINT.to_string()),
            postgrest_endpoint: Some(DEFAULT_POSTGREST_ENDPOINT.to_string()),
            enable_health: Some(true),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    /// Cache TTL for the merged upstream document.
    pub fn refresh_duration(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "upstream_metrics_refresh_duration",
            self.upstream_metrics_refresh_duration
                .as_deref()
                .unwrap_or(DEFAULT_REFRESH_DURATION),
        )
    }

    /// Validated upstream sources, in configuration order.
    pub fn source_settings(&self) -> Result<Vec<SourceSettings>, ConfigError> {
        self.upstream_metrics_sources
            .iter()
            .enumerate()
            .map(|(index, source)| source.resolve(index))
            .collect()
    }

    /// Listen address. `bind` may be an IP literal or a host name such as
    /// `localhost`; host names resolve to their first address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR).trim();
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let invalid = |reason: String| ConfigError::InvalidBind {
            bind: host.to_string(),
            reason,
        };

        if host.is_empty() {
            return Err(invalid("address is empty".into()));
        }
        (host, port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("name resolved to no addresses".into()))
    }

    /// Enabled node-local collectors, in configuration order.
    pub fn collector_kinds(&self) -> Result<Vec<CollectorKind>, ConfigError> {
        self.metric_collectors
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|name| name.parse())
            .collect()
    }
}

/// Parses a duration string ("500ms", "60s", "1m 30s"). Zero is rejected.
pub fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    let duration =
        humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration(field.to_string()));
    }
    Ok(duration)
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    cfg.refresh_duration()?;
    cfg.listen_addr()?;
    cfg.source_settings()?;
    cfg.collector_kinds()?;

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(ConfigError::Tls(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                ));
            }
            (Some(_), None) => {
                return Err(ConfigError::Tls(
                    "TLS is enabled but tls_key_path is not set".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::Tls(
                    "TLS is enabled but tls_cert_path is not set".into(),
                ));
            }
            (Some(cert), Some(key)) => {
                check_pem_file("TLS certificate", cert)?;
                check_pem_file("TLS private key", key)?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(what: &str, path: &str) -> Result<(), ConfigError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(ConfigError::Tls(format!("{what} file is empty: {path}"))),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::Tls(format!("{what} file not found: {path}")))
        }
        Err(e) => Err(ConfigError::Tls(format!(
            "{what} file is not readable: {path} ({e})"
        ))),
    }
}

/// Loads configuration from `path`, or from the first existing default
/// location. Falls back to defaults when no file exists.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .find(|p| Path::new(p).exists())
        {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, path.extension().and_then(|s| s.to_str()))?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses config text; the extension selects the format, YAML by default.
pub fn parse_config(
    content: &str,
    extension: Option<&str>,
) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match extension {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}
