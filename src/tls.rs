//! HTTPS termination setup.

use axum_server::tls_rustls::RustlsConfig;
use tracing::debug;

use crate::error::ConfigError;

/// Installs ring as the process-wide rustls crypto provider.
///
/// reqwest and axum-server enable different rustls backends, so rustls
/// cannot choose one by itself. Later calls are no-ops.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok()
    {
        debug!("Installed ring as rustls crypto provider");
    }
}

/// Loads a PEM certificate chain and private key for serving HTTPS.
pub async fn load_server_config(cert_path: &str, key_path: &str) -> Result<RustlsConfig, ConfigError> {
    install_crypto_provider();
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| ConfigError::Tls(format!("failed to load TLS certificate or key: {e}")))
}
