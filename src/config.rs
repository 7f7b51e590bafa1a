//! Startup configuration for the issuance server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use bon::Builder;
use clap::Parser;

use crate::error::{CertMintError, Result};
use crate::generator::DEFAULT_RSA_BITS;

/// Smallest modulus the server will mint.
pub const MIN_RSA_BITS: usize = 2048;

#[derive(Debug, Parser)]
#[command(name = "certmint")]
#[command(about = "Issues RSA key pairs and CA-signed certificates over TCP")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "CERTMINT_PORT")]
    pub port: u16,

    /// Number of key generation workers
    #[arg(long, env = "CERTMINT_WORKERS")]
    pub workers: usize,

    /// Issuer distinguished name, e.g. "CN=Example CA,O=Example"
    #[arg(long, env = "CERTMINT_ISSUER")]
    pub issuer: String,

    /// Path to the PEM-encoded CA private key
    #[arg(long, env = "CERTMINT_CA_KEY")]
    pub ca_key: PathBuf,

    /// Address to bind
    #[arg(long, env = "CERTMINT_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// RSA modulus size of minted keys
    #[arg(long, env = "CERTMINT_KEY_BITS", default_value_t = DEFAULT_RSA_BITS)]
    pub key_bits: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated server settings.
///
/// # Fields
/// * `listen_addr` - Socket address the listener binds.
/// * `worker_count` - Size of the key generation pool.
/// * `issuer` - RFC 4514 issuer name.
/// * `ca_key_path` - PEM file holding the CA private key.
/// * `key_bits` - RSA modulus size of minted keys.
#[derive(Debug, Clone, Builder)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub worker_count: usize,
    pub issuer: String,
    pub ca_key_path: PathBuf,
    #[builder(default = DEFAULT_RSA_BITS)]
    pub key_bits: usize,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(CertMintError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.key_bits < MIN_RSA_BITS {
            return Err(CertMintError::Configuration(format!(
                "key size {} is below the minimum of {MIN_RSA_BITS} bits",
                self.key_bits
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(CertMintError::Configuration(
                "issuer distinguished name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl TryFrom<&Cli> for ServerConfig {
    type Error = CertMintError;

    fn try_from(cli: &Cli) -> Result<Self> {
        let config = ServerConfig::builder()
            .listen_addr(SocketAddr::new(cli.bind, cli.port))
            .worker_count(cli.workers)
            .issuer(cli.issuer.clone())
            .ca_key_path(cli.ca_key.clone())
            .key_bits(cli.key_bits)
            .build();
        config.validate()?;
        Ok(config)
    }
}
