//! Raven webhook - injects RAVEN_URLS into admitted Pods

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use raven_webhook::mutation::PodMutator;
use raven_webhook::server::{start_server, ServerConfig};
use raven_webhook::telemetry::{init_tracing, LogFormat};
use raven_webhook::webhook::{WebhookState, DEFAULT_MAX_BODY_BYTES};

/// Raven webhook - Kubernetes mutating admission webhook for Pods
#[derive(Parser, Debug)]
#[command(name = "raven-webhook", version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "RAVEN_WEBHOOK_LISTEN_ADDR", default_value = "0.0.0.0:8443")]
    listen_addr: SocketAddr,

    /// Path to the serving certificate (PEM)
    ///
    /// Must be given together with --tls-key. Without both, the webhook serves
    /// plain HTTP (for use behind a TLS-terminating proxy or in tests).
    #[arg(long, env = "RAVEN_WEBHOOK_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// Path to the serving private key (PEM)
    #[arg(long, env = "RAVEN_WEBHOOK_TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Largest accepted AdmissionReview body in bytes
    #[arg(long, env = "RAVEN_WEBHOOK_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Log output format
    #[arg(long, env = "RAVEN_WEBHOOK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Install crypto provider before any TLS config is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The webhook cannot serve TLS without it.",
            e
        );
        std::process::exit(1);
    }

    init_tracing(cli.log_format)?;

    let config = ServerConfig::new(
        cli.listen_addr,
        cli.tls_cert,
        cli.tls_key,
        cli.max_body_bytes,
    )?;

    tracing::info!(
        addr = %config.addr,
        tls = config.tls.is_some(),
        max_body_bytes = config.max_body_bytes,
        "Starting raven webhook"
    );

    let state = Arc::new(WebhookState::new(PodMutator::new()));
    start_server(config, state)
        .await
        .map_err(|e| anyhow::anyhow!("webhook server failed: {}", e))
}
