use std::io::{BufRead, Write};

use log::debug;
use rand_core::{OsRng, TryRngCore};
use zeroize::Zeroizing;

use crate::error::{ChannelError, Result};
use crate::handshake::{self, BANNER};
use crate::keys::{KeyPair, derive_session_key};
use crate::nonce::NonceState;
use crate::params::FieldParameters;
use crate::record::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RECORD_LEN, RecordCodec, RecordHeader, RecordReader,
    RecordWriter,
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub banner: String,
    pub chunk_size: usize,
    pub max_record_len: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            banner: BANNER.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

/// Initiator side of a session: sends records and reads back the echoes.
pub struct Client<R, W> {
    reader: R,
    writer: W,
    codec: RecordCodec,
    max_record_len: u32,
}

impl<R: BufRead, W: Write> Client<R, W> {
    /// Performs the handshake with a fresh ephemeral keypair.
    pub fn connect(
        params: &FieldParameters,
        reader: R,
        writer: W,
        options: &ClientOptions,
    ) -> Result<Self> {
        let mut rng = OsRng.unwrap_err();
        let keypair = KeyPair::generate(params, &mut rng);
        Self::connect_with_keypair(params, keypair, reader, writer, options)
    }

    pub fn connect_with_keypair(
        params: &FieldParameters,
        keypair: KeyPair,
        mut reader: R,
        mut writer: W,
        options: &ClientOptions,
    ) -> Result<Self> {
        handshake::write_client_hello(&mut writer, &options.banner, keypair.public())?;
        let server_public = handshake::read_server_hello(&mut reader)?;

        let key = {
            let secret = keypair.shared_secret(params, &server_public);
            derive_session_key(&secret, params)?
        };
        debug!(
            "connected to server {}",
            handshake::fingerprint(&server_public)
        );

        Ok(Self {
            reader,
            writer,
            codec: RecordCodec::new(key, NonceState::initiator(), options.chunk_size),
            max_record_len: options.max_record_len,
        })
    }

    pub fn send(&mut self, plaintext: &[u8]) -> Result<()> {
        self.codec
            .seal(&mut RecordWriter::new(&mut self.writer), plaintext)
    }

    /// Next record from the server, or `None` once it echoes the terminator.
    pub fn receive(&mut self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let mut reader = RecordReader::new(&mut self.reader, self.max_record_len);
        match reader.read_header()? {
            RecordHeader::Terminator => Ok(None),
            RecordHeader::Data { ciphertext_len } => {
                self.codec.open(&mut reader, ciphertext_len).map(Some)
            }
        }
    }

    /// Sends one record and waits for its echo.
    pub fn echo(&mut self, plaintext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.send(plaintext)?;
        self.receive()?.ok_or_else(|| {
            ChannelError::ProtocolViolation("server terminated instead of echoing".into())
        })
    }

    /// Sends the terminator and waits for the server to echo it.
    pub fn close(mut self) -> Result<()> {
        RecordWriter::new(&mut self.writer).write_terminator()?;
        match self.receive()? {
            None => Ok(()),
            Some(_) => Err(ChannelError::ProtocolViolation(
                "server sent a record instead of the terminator".into(),
            )),
        }
    }
}
