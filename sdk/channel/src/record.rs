//! Length-prefixed AES-128-GCM records.
//!
//! Wire format: `[u32 BE length][ciphertext][16-byte tag]`, where length
//! counts ciphertext plus tag. A length of zero with nothing after it ends the
//! session.

use std::io::{self, Read, Write};

use zeroize::Zeroizing;

use crate::error::{ChannelError, Result};
use crate::gcm::{GcmDecryptor, GcmEncryptor};
use crate::keys::SessionKey;
use crate::nonce::NonceState;

pub use crate::gcm::TAG_LEN;

pub const LENGTH_PREFIX_LEN: usize = 4;
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
/// Every length the prefix can carry. Lower it to cap per-record memory.
pub const DEFAULT_MAX_RECORD_LEN: u32 = u32::MAX;

const TERMINATOR: [u8; LENGTH_PREFIX_LEN] = [0; LENGTH_PREFIX_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordHeader {
    Terminator,
    Data { ciphertext_len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Relayed { plaintext_len: usize },
    Terminated,
}

/// Reads record framing from a byte stream.
pub struct RecordReader<R> {
    inner: R,
    max_record_len: u32,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R, max_record_len: u32) -> Self {
        Self {
            inner,
            max_record_len,
        }
    }

    pub fn read_header(&mut self) -> Result<RecordHeader> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        self.fill(&mut prefix, "record length prefix")?;

        let length = u32::from_be_bytes(prefix);
        if length == 0 {
            return Ok(RecordHeader::Terminator);
        }
        if (length as usize) < TAG_LEN {
            return Err(ChannelError::MalformedRecord { length });
        }
        if length > self.max_record_len {
            return Err(ChannelError::RecordTooLarge {
                length,
                max: self.max_record_len,
            });
        }
        Ok(RecordHeader::Data {
            ciphertext_len: length as usize - TAG_LEN,
        })
    }

    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        self.fill(buf, "record ciphertext")
    }

    pub fn read_tag(&mut self) -> Result<[u8; TAG_LEN]> {
        let mut tag = [0u8; TAG_LEN];
        self.fill(&mut tag, "record tag")?;
        Ok(tag)
    }

    fn fill(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ChannelError::TruncatedRecord(what),
            _ => ChannelError::IoFailure(e),
        })
    }
}

/// Writes record framing to a byte stream.
pub struct RecordWriter<W> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_header(&mut self, ciphertext_len: usize) -> Result<()> {
        let length = ciphertext_len
            .checked_add(TAG_LEN)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(ChannelError::PayloadTooLarge(ciphertext_len))?;
        self.inner.write_all(&length.to_be_bytes())?;
        Ok(())
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.inner.write_all(chunk)?;
        Ok(())
    }

    pub fn write_tag(&mut self, tag: &[u8; TAG_LEN]) -> Result<()> {
        self.inner.write_all(tag)?;
        Ok(())
    }

    pub fn write_terminator(&mut self) -> Result<()> {
        self.inner.write_all(&TERMINATOR)?;
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Session key plus both nonce sequences; seals and opens records.
pub struct RecordCodec {
    key: SessionKey,
    nonces: NonceState,
    chunk_size: usize,
}

impl RecordCodec {
    pub fn new(key: SessionKey, nonces: NonceState, chunk_size: usize) -> Self {
        Self {
            key,
            nonces,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Reads and authenticates the body of a record whose header was already read.
    ///
    /// The plaintext is only handed back once the tag verifies; on failure it
    /// is wiped with the buffer.
    pub fn open<R: Read>(
        &mut self,
        reader: &mut RecordReader<R>,
        ciphertext_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let nonce = self.nonces.next_recv_nonce()?;
        let mut decryptor = GcmDecryptor::new(self.key.as_bytes(), &nonce);

        let mut chunk = Zeroizing::new(vec![0u8; self.chunk_size.min(ciphertext_len)]);
        // grows only as ciphertext arrives; the claimed length is not trusted
        let mut plaintext = Zeroizing::new(Vec::new());
        let mut remaining = ciphertext_len;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            let buf = &mut chunk[..n];
            reader.read_chunk(buf)?;
            decryptor.update(buf);
            append_zeroizing(&mut plaintext, buf, ciphertext_len);
            remaining -= n;
        }

        let tag = reader.read_tag()?;
        decryptor.finish(&tag)?;
        Ok(plaintext)
    }

    /// Encrypts `plaintext` as one complete record and flushes it.
    pub fn seal<W: Write>(&mut self, writer: &mut RecordWriter<W>, plaintext: &[u8]) -> Result<()> {
        if plaintext.len() > u32::MAX as usize - TAG_LEN {
            return Err(ChannelError::PayloadTooLarge(plaintext.len()));
        }
        let nonce = self.nonces.next_send_nonce()?;
        let mut encryptor = GcmEncryptor::new(self.key.as_bytes(), &nonce);
        writer.write_header(plaintext.len())?;

        let mut chunk = Zeroizing::new(vec![0u8; self.chunk_size.min(plaintext.len())]);
        for piece in plaintext.chunks(self.chunk_size) {
            let buf = &mut chunk[..piece.len()];
            buf.copy_from_slice(piece);
            encryptor.update(buf);
            writer.write_chunk(buf)?;
        }

        writer.write_tag(&encryptor.finish())?;
        writer.flush()
    }

    /// Reads one inbound record and answers it.
    ///
    /// A terminator is echoed and nothing further is read. Otherwise the record
    /// is verified under the receive nonce and re-encrypted under the send
    /// nonce. Nothing is written for a record that fails verification.
    pub fn relay<R: Read, W: Write>(
        &mut self,
        reader: &mut RecordReader<R>,
        writer: &mut RecordWriter<W>,
    ) -> Result<RelayOutcome> {
        match reader.read_header()? {
            RecordHeader::Terminator => {
                writer.write_terminator()?;
                Ok(RelayOutcome::Terminated)
            }
            RecordHeader::Data { ciphertext_len } => {
                let plaintext = self.open(reader, ciphertext_len)?;
                self.seal(writer, &plaintext)?;
                Ok(RelayOutcome::Relayed {
                    plaintext_len: plaintext.len(),
                })
            }
        }
    }
}

/// Appends without leaving copies behind: a reallocation moves the bytes
/// into a new zeroizing buffer and the old one is wiped on drop.
fn append_zeroizing(buf: &mut Zeroizing<Vec<u8>>, data: &[u8], limit: usize) {
    let needed = buf.len() + data.len();
    if needed > buf.capacity() {
        let capacity = (buf.capacity() * 2).clamp(needed, limit.max(needed));
        let mut grown = Zeroizing::new(Vec::with_capacity(capacity));
        grown.extend_from_slice(buf.as_slice());
        *buf = grown;
    }
    buf.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn codec(nonces: NonceState, chunk_size: usize) -> RecordCodec {
        RecordCodec::new(SessionKey::from_bytes([7u8; 16]), nonces, chunk_size)
    }

    fn sealed(plaintexts: &[&[u8]]) -> Vec<u8> {
        let mut client = codec(NonceState::initiator(), 8);
        let mut out = Vec::new();
        let mut writer = RecordWriter::new(&mut out);
        for p in plaintexts {
            client.seal(&mut writer, p).unwrap();
        }
        writer.write_terminator().unwrap();
        out
    }

    #[test]
    fn header_lengths() {
        let mut reader = RecordReader::new(Cursor::new(vec![0, 0, 0, 0]), 1024);
        assert_eq!(reader.read_header().unwrap(), RecordHeader::Terminator);

        let mut reader = RecordReader::new(Cursor::new(vec![0, 0, 0, 16]), 1024);
        assert_eq!(
            reader.read_header().unwrap(),
            RecordHeader::Data { ciphertext_len: 0 }
        );

        let mut reader = RecordReader::new(Cursor::new(vec![0, 0, 0, 15]), 1024);
        assert!(matches!(
            reader.read_header(),
            Err(ChannelError::MalformedRecord { length: 15 })
        ));

        let mut reader = RecordReader::new(Cursor::new(vec![0, 0, 4, 1]), 1024);
        assert!(matches!(
            reader.read_header(),
            Err(ChannelError::RecordTooLarge { length: 1025, max: 1024 })
        ));
    }

    #[test]
    fn default_limit_accepts_any_wire_length() {
        let length = (64u32 << 20) + 17;
        let mut reader = RecordReader::new(Cursor::new(length.to_be_bytes().to_vec()), DEFAULT_MAX_RECORD_LEN);
        assert_eq!(
            reader.read_header().unwrap(),
            RecordHeader::Data { ciphertext_len: (64 << 20) + 1 }
        );

        let mut reader = RecordReader::new(Cursor::new(vec![0xff; 4]), DEFAULT_MAX_RECORD_LEN);
        assert_eq!(
            reader.read_header().unwrap(),
            RecordHeader::Data { ciphertext_len: u32::MAX as usize - TAG_LEN }
        );
    }

    #[test]
    fn oversized_claim_with_short_body_is_truncation() {
        // claims ~4 GiB but carries only a few bytes
        let mut input = vec![0xff; 4];
        input.extend_from_slice(b"tiny");

        let mut server = codec(NonceState::responder(), 1024);
        let mut reader = RecordReader::new(Cursor::new(input), DEFAULT_MAX_RECORD_LEN);
        let mut output = Vec::new();
        let mut writer = RecordWriter::new(&mut output);

        assert!(matches!(
            server.relay(&mut reader, &mut writer),
            Err(ChannelError::TruncatedRecord("record ciphertext"))
        ));
        assert!(output.is_empty());
    }

    #[test]
    fn zeroizing_append_keeps_contents_across_growth() {
        let mut buf = Zeroizing::new(Vec::new());
        for piece in [&b"abc"[..], b"defgh", b"", b"ijklmnopq"] {
            append_zeroizing(&mut buf, piece, 17);
        }
        assert_eq!(buf.as_slice(), b"abcdefghijklmnopq");
    }

    #[test]
    fn short_prefix_is_truncation() {
        let mut reader = RecordReader::new(Cursor::new(vec![0, 0]), 1024);
        assert!(matches!(
            reader.read_header(),
            Err(ChannelError::TruncatedRecord("record length prefix"))
        ));
    }

    #[test]
    fn relay_echoes_plaintext_under_send_nonces() {
        let input = sealed(&[b"first record", b"", b"a third, longer record body"]);

        let mut server = codec(NonceState::responder(), 5);
        let mut reader = RecordReader::new(Cursor::new(input), DEFAULT_MAX_RECORD_LEN);
        let mut output = Vec::new();
        let mut writer = RecordWriter::new(&mut output);

        let mut lens = Vec::new();
        while let RelayOutcome::Relayed { plaintext_len } = server.relay(&mut reader, &mut writer).unwrap() {
            lens.push(plaintext_len);
        }
        assert_eq!(lens, vec![12, 0, 27]);

        let mut client = codec(NonceState::initiator(), 8);
        let mut reader = RecordReader::new(Cursor::new(output), DEFAULT_MAX_RECORD_LEN);
        for expected in [&b"first record"[..], b"", b"a third, longer record body"] {
            let RecordHeader::Data { ciphertext_len } = reader.read_header().unwrap() else {
                panic!("expected a data record");
            };
            let plaintext = client.open(&mut reader, ciphertext_len).unwrap();
            assert_eq!(plaintext.as_slice(), expected);
        }
        assert_eq!(reader.read_header().unwrap(), RecordHeader::Terminator);
    }

    #[test]
    fn truncated_tag_writes_nothing() {
        let mut input = sealed(&[b"cut short"]);
        // drop the terminator and the last tag byte
        input.truncate(input.len() - LENGTH_PREFIX_LEN - 1);

        let mut server = codec(NonceState::responder(), 1024);
        let mut reader = RecordReader::new(Cursor::new(input), DEFAULT_MAX_RECORD_LEN);
        let mut output = Vec::new();
        let mut writer = RecordWriter::new(&mut output);

        assert!(matches!(
            server.relay(&mut reader, &mut writer),
            Err(ChannelError::TruncatedRecord("record tag"))
        ));
        assert!(output.is_empty());
    }

    #[test]
    fn wrong_nonce_fails_authentication() {
        let input = sealed(&[b"sealed for the responder"]);

        // a codec that expects the initiator's receive sequence instead
        let mut confused = codec(NonceState::initiator(), 1024);
        let mut reader = RecordReader::new(Cursor::new(input), DEFAULT_MAX_RECORD_LEN);
        let mut output = Vec::new();
        let mut writer = RecordWriter::new(&mut output);

        assert!(matches!(
            confused.relay(&mut reader, &mut writer),
            Err(ChannelError::AuthenticationFailure)
        ));
        assert!(output.is_empty());
    }
}
