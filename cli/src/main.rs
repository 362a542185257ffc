//! SimpleSSL client.
//!
//! Connects to a responder over TCP, sends each message as one record and
//! prints what comes back. Messages come from the command line, or one per
//! line from stdin when none are given.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use simplessl_channel::{Client, FieldParameters};
use simplessl_config::SimpleSslConfig;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "simplessl")]
#[command(about = "Send messages through a SimpleSSLv0 responder and print the echoes", long_about = None)]
struct Args {
    /// Config file (default: $SIMPLESSL_CONFIG, ./config.toml, ~/.simplessl/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Responder address
    #[arg(long, short)]
    server: Option<String>,

    /// Greeting banner to send
    #[arg(long)]
    banner: Option<String>,

    /// Bytes processed per AES-GCM update
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Print echoes as hex instead of raw bytes
    #[arg(long)]
    hex: bool,

    /// Messages to send; stdin lines are used when empty
    messages: Vec<String>,
}

impl Args {
    fn apply(&self, config: &mut SimpleSslConfig) {
        if let Some(server) = &self.server {
            config.client.server = server.clone();
        }
        if let Some(banner) = &self.banner {
            config.client.banner = banner.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config.record.chunk_size = chunk_size;
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SimpleSslConfig::load_from(path)?,
        None => SimpleSslConfig::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    let params = FieldParameters::standard();
    let stream = TcpStream::connect(&config.client.server)
        .with_context(|| format!("Failed to connect to {}", config.client.server))?;
    info!("Connected to {}", config.client.server);

    let reader = BufReader::new(stream.try_clone().context("Failed to clone socket")?);
    let writer = BufWriter::new(stream);
    let mut client = Client::connect(&params, reader, writer, &config.client_options())
        .context("Handshake failed")?;

    let mut out = io::stdout().lock();
    let mut sent = 0usize;
    if args.messages.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line.context("Failed to read stdin")?;
            echo_one(&mut client, line.as_bytes(), args.hex, &mut out)?;
            sent += 1;
        }
    } else {
        for message in &args.messages {
            echo_one(&mut client, message.as_bytes(), args.hex, &mut out)?;
            sent += 1;
        }
    }

    client.close().context("Failed to close session")?;
    info!("Session closed after {sent} records");
    Ok(())
}

fn echo_one<R: BufRead, W: Write, O: Write>(
    client: &mut Client<R, W>,
    message: &[u8],
    as_hex: bool,
    out: &mut O,
) -> Result<()> {
    let echoed = client.echo(message)?;
    if echoed.as_slice() != message {
        warn!("Echo differs from the message sent");
    }
    print_echo(out, &echoed, as_hex)
}

fn print_echo<O: Write>(out: &mut O, echoed: &[u8], as_hex: bool) -> Result<()> {
    if as_hex {
        writeln!(out, "{}", hex::encode(echoed))?;
    } else {
        out.write_all(echoed)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "simplessl",
            "--server",
            "10.1.2.3:4433",
            "--banner",
            "SimpleSSLv0-dev",
            "first",
            "second",
        ]);
        let mut config = SimpleSslConfig::default();
        args.apply(&mut config);

        assert_eq!(config.client.server, "10.1.2.3:4433");
        assert_eq!(config.client.banner, "SimpleSSLv0-dev");
        assert_eq!(args.messages, vec!["first", "second"]);
    }

    #[test]
    fn prints_raw_or_hex() {
        let mut out = Vec::new();
        print_echo(&mut out, b"hi", false).unwrap();
        print_echo(&mut out, b"hi", true).unwrap();
        assert_eq!(out, b"hi\n6869\n");
    }
}
