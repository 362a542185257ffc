//! Responder side of a SimpleSSLv0 session.
//!
//! One handshake, then records are relayed until the initiator sends the
//! zero-length terminator. Any error ends the session; nothing is retried.

use std::io::{BufRead, Write};

use log::{debug, info};
use num_bigint::BigUint;
use rand_core::{OsRng, TryRngCore};

use crate::error::{ChannelError, Result};
use crate::handshake::{self, BannerPolicy};
use crate::keys::{KeyPair, derive_session_key};
use crate::nonce::NonceState;
use crate::params::FieldParameters;
use crate::record::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RECORD_LEN, RecordCodec, RecordReader, RecordWriter,
    RelayOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    AwaitingGreeting,
    AwaitingClientPublic,
    KeyEstablished,
    RecordRelay,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub banner: BannerPolicy,
    pub chunk_size: usize,
    pub max_record_len: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            banner: BannerPolicy::Permissive,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub records: u64,
    pub plaintext_bytes: u64,
}

pub struct Session<'p> {
    params: &'p FieldParameters,
    public: BigUint,
    /// Taken once the session key is derived.
    keypair: Option<KeyPair>,
    options: SessionOptions,
    state: SessionState,
}

impl<'p> Session<'p> {
    /// Generates the ephemeral keypair from the OS RNG.
    pub fn new(params: &'p FieldParameters, options: SessionOptions) -> Self {
        let mut rng = OsRng.unwrap_err();
        let keypair = KeyPair::generate(params, &mut rng);
        Self::with_keypair(params, keypair, options)
    }

    pub fn with_keypair(params: &'p FieldParameters, keypair: KeyPair, options: SessionOptions) -> Self {
        Self {
            params,
            public: keypair.public().clone(),
            keypair: Some(keypair),
            options,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn public(&self) -> &BigUint {
        &self.public
    }

    /// Runs the session to completion over `input`/`output`.
    ///
    /// The same buffered reader carries the handshake lines and the records
    /// that follow them. On error, [`Session::state`] reports the state the
    /// session failed in. The session key never outlives this call.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> Result<SessionSummary> {
        let keypair = self.keypair.take().ok_or_else(|| {
            ChannelError::ProtocolViolation("session has already been run".into())
        })?;

        self.transition(SessionState::AwaitingGreeting);
        let banner = handshake::read_line(&mut input, "greeting")?;
        self.options.banner.check(&banner)?;
        debug!("greeting: {:?}", String::from_utf8_lossy(&banner));

        self.transition(SessionState::AwaitingClientPublic);
        let line = handshake::read_line(&mut input, "client public value")?;
        let client_public = handshake::parse_public_value(&line)?;

        self.transition(SessionState::KeyEstablished);
        handshake::write_server_hello(&mut output, &self.public)?;
        let key = {
            let secret = keypair.shared_secret(self.params, &client_public);
            derive_session_key(&secret, self.params)?
        };
        drop(keypair);
        info!(
            "session key established (client {}, server {})",
            handshake::fingerprint(&client_public),
            handshake::fingerprint(&self.public)
        );

        let mut codec = RecordCodec::new(key, NonceState::responder(), self.options.chunk_size);
        let mut reader = RecordReader::new(&mut input, self.options.max_record_len);
        let mut writer = RecordWriter::new(&mut output);
        let mut summary = SessionSummary::default();

        self.transition(SessionState::RecordRelay);
        loop {
            match codec.relay(&mut reader, &mut writer)? {
                RelayOutcome::Relayed { plaintext_len } => {
                    summary.records += 1;
                    summary.plaintext_bytes += plaintext_len as u64;
                    debug!("relayed record {} ({plaintext_len} bytes)", summary.records);
                }
                RelayOutcome::Terminated => break,
            }
        }

        self.transition(SessionState::Terminated);
        info!(
            "session terminated after {} records ({} plaintext bytes)",
            summary.records, summary.plaintext_bytes
        );
        Ok(summary)
    }

    fn transition(&mut self, next: SessionState) {
        debug!("session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
