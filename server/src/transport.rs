use anyhow::{Context, Result};
use log::{info, warn};
use simplessl_channel::{FieldParameters, Session, SessionSummary};
use simplessl_config::{SimpleSslConfig, TransportMode};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::TcpListener;

/// Runs the one session the process exists for.
pub fn serve(config: &SimpleSslConfig, params: &FieldParameters) -> Result<SessionSummary> {
    match config.server.transport {
        TransportMode::Stdio => serve_stdio(config, params),
        TransportMode::Tcp => {
            let listener = TcpListener::bind(&config.server.listen)
                .with_context(|| format!("Failed to bind {}", config.server.listen))?;
            serve_listener(listener, config, params)
        }
    }
}

fn serve_stdio(config: &SimpleSslConfig, params: &FieldParameters) -> Result<SessionSummary> {
    info!("Serving one session on stdin/stdout");
    let input = io::stdin().lock();
    let output = BufWriter::new(io::stdout().lock());
    run_session(config, params, input, output)
}

/// Accepts exactly one connection; the listener is closed before the session starts.
pub fn serve_listener(
    listener: TcpListener,
    config: &SimpleSslConfig,
    params: &FieldParameters,
) -> Result<SessionSummary> {
    info!("Listening on TCP {}", listener.local_addr()?);
    let (stream, peer) = listener.accept().context("Failed to accept connection")?;
    drop(listener);
    info!("Accepted connection from {peer}");

    stream
        .set_read_timeout(config.read_timeout())
        .context("Failed to set read timeout")?;
    let input = BufReader::new(stream.try_clone().context("Failed to clone socket")?);
    let output = BufWriter::new(stream);
    run_session(config, params, input, output)
}

fn run_session<R: BufRead, W: Write>(
    config: &SimpleSslConfig,
    params: &FieldParameters,
    input: R,
    output: W,
) -> Result<SessionSummary> {
    let mut session = Session::new(params, config.session_options());
    let result = session.run(input, output);
    if result.is_err() {
        warn!("Session failed in state {:?}", session.state());
    }
    result.with_context(|| format!("Session failed in state {:?}", session.state()))
}
