use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use certmint::client::{RequestOptions, request_key_material, save_key_material};
use certmint::identity::Identity;
use certmint::telemetry::init_logging;

#[derive(Parser)]
#[command(name = "certmint-client")]
#[command(about = "Requests a key pair and certificate from a certmint server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Server host name or address
    host: String,

    /// Server port
    port: u16,

    /// Identity to request a certificate for (ASCII only)
    name: String,

    /// Seconds to wait after sending the name before reading the response
    #[arg(long, default_value_t = 0)]
    delay: u64,

    /// Disconnect right after sending the name
    #[arg(long)]
    exit_early: bool,

    /// Directory the .key, .pub and .crt files are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let identity = Identity::try_from(cli.name.as_str()).context("invalid name")?;
    let options = RequestOptions {
        delay: (cli.delay > 0).then(|| Duration::from_secs(cli.delay)),
        exit_early: cli.exit_early,
    };

    let Some(material) =
        request_key_material((cli.host.as_str(), cli.port), &identity, &options).await?
    else {
        info!(identity = %identity, "Disconnected before reading the response");
        return Ok(());
    };

    let written = save_key_material(&cli.out_dir, &identity, &material).await?;
    for path in written {
        info!(path = %path.display(), "Wrote");
    }
    Ok(())
}
