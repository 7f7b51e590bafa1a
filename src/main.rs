use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use certmint::config::{Cli, ServerConfig};
use certmint::generator::RsaKeyGenerator;
use certmint::issuer::CaContext;
use certmint::server::CertMintServer;
use certmint::telemetry::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = ServerConfig::try_from(&cli)?;

    let ca = CaContext::load(&config.issuer, &config.ca_key_path)
        .with_context(|| format!("loading CA key from {}", config.ca_key_path.display()))?;
    info!(issuer = %config.issuer, key_bits = config.key_bits, "Loaded CA key");

    let listener = CertMintServer::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    let generator = Arc::new(RsaKeyGenerator::new(Arc::new(ca), config.key_bits));
    let server = CertMintServer::start(config.worker_count, generator);

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    server.shutdown().await;
    info!("Server stopped");
    Ok(())
}
