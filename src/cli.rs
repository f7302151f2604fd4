//! CLI arguments and subcommands for admin-metrics-aggregator.
//!
//! Flags override values from the config file, which override built-in defaults.

use admin_metrics_aggregator::config::{load_config, Config};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Verbosity of the tracing subscriber
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Serialization format for printed or generated configs
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "admin-metrics-aggregator",
    about = "Scrapes node-local upstream metrics endpoints and serves them as one labeled document",
    long_about = "Scrapes node-local upstream metrics endpoints and serves them as one labeled document.\n\n\
                  Every configured source is fetched concurrently, its samples receive the source's \
                  static labels, and the merged exposition text is cached for the configured refresh \
                  duration.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Listen address (overrides `bind` in the config file)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file path; format is chosen by extension (yaml, yml, json, toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Ignore config files and start from defaults
    #[arg(long)]
    pub no_config: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate the effective configuration and exit non-zero on errors
    #[arg(long)]
    pub check_config: bool,

    /// Override the upstream cache refresh duration (e.g. "30s")
    #[arg(long)]
    pub refresh_duration: Option<String>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Serve HTTPS instead of HTTP
    #[arg(long)]
    pub enable_tls: bool,

    /// PEM certificate chain used with --enable-tls
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key used with --enable-tls
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands that run instead of the server
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example configuration file
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Prefix YAML output with a commented field reference
        #[arg(long)]
        commented: bool,
    },

    /// Run one aggregation round against the configured sources
    Test {
        /// Only print per-source status, not the merged document
        #[arg(short = 'q', long)]
        quiet: bool,
    },
}

/// Builds the effective configuration: CLI flags win over the config file,
/// which wins over defaults.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(duration) = &args.refresh_duration {
        config.upstream_metrics_refresh_duration = Some(duration.clone());
    }

    if args.disable_health {
        config.enable_health = Some(false);
    }

    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Prints `config` to stdout in the requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "admin-metrics-aggregator",
            "--no-config",
            "--port",
            "9000",
            "--refresh-duration",
            "15s",
            "--disable-health",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.upstream_metrics_refresh_duration.as_deref(), Some("15s"));
        assert_eq!(config.enable_health, Some(false));
    }

    #[test]
    fn test_test_subcommand_parses() {
        let args = Args::parse_from(["admin-metrics-aggregator", "test", "--quiet"]);
        assert!(matches!(args.command, Some(Commands::Test { quiet: true })));
    }
}
