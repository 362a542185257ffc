//! # SimpleSSL Server
//!
//! Responder side of SimpleSSLv0. Runs exactly one session, over stdin/stdout
//! or a single accepted TCP connection, then exits.
//!
//! ```text
//! client ── banner, public value ──► server
//! client ◄── OK, public value ────── server
//! client ── record ──► server ── record (same plaintext) ──► client
//!                         ...
//! client ── 00000000 ──► server ── 00000000 ──► client
//! ```
//!
//! Logs go to stderr so they never mix with the protocol stream in stdio mode.

use clap::Parser;
use log::{error, info};
use simplessl_channel::FieldParameters;
use simplessl_config::{SimpleSslConfig, TransportMode};
use std::path::PathBuf;

mod transport;

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "simplessl-server")]
#[command(about = "SimpleSSLv0 responder: echoes each record back under its own nonce", long_about = None)]
struct Args {
    /// Config file (default: $SIMPLESSL_CONFIG, ./config.toml, ~/.simplessl/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Accept one TCP connection on this address instead of using stdio
    #[arg(long, conflicts_with = "stdio")]
    listen: Option<String>,

    /// Use stdin/stdout even if the config selects TCP
    #[arg(long)]
    stdio: bool,

    /// Read timeout in seconds for the TCP connection (0 disables it)
    #[arg(long)]
    read_timeout_secs: Option<u64>,

    /// Bytes processed per AES-GCM update
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Largest accepted record length field
    #[arg(long)]
    max_record_len: Option<u32>,

    /// Reject clients whose greeting is not exactly this banner
    #[arg(long)]
    expect_banner: Option<String>,

    /// Print a sample config file and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    /// Flags win over file and environment settings.
    fn apply(&self, config: &mut SimpleSslConfig) {
        if let Some(listen) = &self.listen {
            config.server.transport = TransportMode::Tcp;
            config.server.listen = listen.clone();
        }
        if self.stdio {
            config.server.transport = TransportMode::Stdio;
        }
        if let Some(secs) = self.read_timeout_secs {
            config.server.read_timeout_secs = Some(secs);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.record.chunk_size = chunk_size;
        }
        if let Some(max) = self.max_record_len {
            config.record.max_record_len = max;
        }
        if let Some(banner) = &self.expect_banner {
            config.handshake.expected_banner = Some(banner.clone());
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.print_config {
        print!("{}", SimpleSslConfig::generate_sample());
        return;
    }

    if let Err(e) = run(&args) {
        error!("Session aborted: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => SimpleSslConfig::load_from(path)?,
        None => SimpleSslConfig::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    let params = FieldParameters::standard();
    info!(
        "SimpleSSL server starting ({} transport, {}-bit modulus)",
        config.server.transport,
        params.modulus().bits()
    );

    transport::serve(&config, &params)?;
    Ok(())
}
