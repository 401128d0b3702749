//! Webhook HTTP(S) server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::error::Error;
use crate::webhook::{webhook_router_with_limit, WebhookState, DEFAULT_MAX_BODY_BYTES};

/// PEM files for the serving certificate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsPaths {
    /// Certificate chain PEM
    pub cert_path: PathBuf,
    /// Private key PEM
    pub key_path: PathBuf,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Serving certificate; plain HTTP when absent
    pub tls: Option<TlsPaths>,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Build a configuration, checking that cert and key come together
    pub fn new(
        addr: SocketAddr,
        tls_cert: Option<PathBuf>,
        tls_key: Option<PathBuf>,
        max_body_bytes: usize,
    ) -> Result<Self, Error> {
        let tls = match (tls_cert, tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsPaths {
                cert_path,
                key_path,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(Error::config("TLS certificate given without a key")),
            (None, Some(_)) => return Err(Error::config("TLS key given without a certificate")),
        };

        if max_body_bytes == 0 {
            return Err(Error::config("max body size must be greater than zero"));
        }

        Ok(Self {
            addr,
            tls,
            max_body_bytes,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_WEBHOOK_PORT)),
            tls: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Start the webhook server and run until it fails
pub async fn start_server(config: ServerConfig, state: Arc<WebhookState>) -> Result<(), Error> {
    let app = webhook_router_with_limit(state, config.max_body_bytes);

    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(|e| {
                    Error::tls(format!(
                        "failed to load {} / {}: {}",
                        tls.cert_path.display(),
                        tls.key_path.display(),
                        e
                    ))
                })?;

            info!(addr = %config.addr, "Starting webhook server (TLS)");

            axum_server::bind_rustls(config.addr, tls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| Error::server(e.to_string()))?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(config.addr).await?;

            info!(addr = %config.addr, "Starting webhook server (plain HTTP)");

            axum::serve(listener, app)
                .await
                .map_err(|e| Error::server(e.to_string()))?;
        }
    }

    Ok(())
}
