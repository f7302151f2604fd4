//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use admin_metrics_aggregator::config::{Config, LabelPair, MetricsSourceConfig};

use crate::cli::ConfigFormat;

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = sample_config();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("admin-metrics-aggregator.yaml"),
    };

    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => {
            let mut content = serde_yaml::to_string(&config)?;
            if commented {
                content = add_config_comments(content);
            }
            content
        }
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Default configuration with one example source filled in.
fn sample_config() -> Config {
    Config {
        upstream_metrics_sources: vec![MetricsSourceConfig {
            name: "postgres_exporter".to_string(),
            url: "http://localhost:9187/metrics".to_string(),
            labels_to_attach: vec![
                LabelPair {
                    name: "supabase_project_ref".to_string(),
                    value: "example".to_string(),
                },
                LabelPair {
                    name: "service_type".to_string(),
                    value: "db".to_string(),
                },
            ],
            skip_tls_verify: false,
            source_timeout: None,
        }],
        ..Config::default()
    }
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Admin Metrics Aggregator Configuration
# ======================================
#
# Server Configuration
# --------------------
# bind: "127.0.0.1"            # Bind IP (0.0.0.0 = all interfaces)
# port: 8085                   # HTTP port
#
# Upstream Aggregation
# --------------------
# upstream_metrics_refresh_duration: "60s"  # Merged document is reused for this long
# upstream_metrics_sources:                 # Scraped concurrently, merged in this order
#   - name: "postgres_exporter"             # Used in logs and telemetry only
#     url: "http://localhost:9187/metrics"
#     labels_to_attach:                     # Prepended to every sample of this source
#       - name: "service_type"
#         value: "db"
#     skip_tls_verify: false                # Accept self-signed certificates
#     source_timeout: "5s"                  # Per-fetch deadline (default: 5s)
#
# Node Collectors (/metrics)
# --------------------------
# metric_collectors: ["meminfo"]            # meminfo, gotrue, postgrest
# gotrue_health_endpoint: "http://localhost:9999/health"
# postgrest_endpoint: "http://localhost:3000/"
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}
