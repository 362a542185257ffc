//! Line-oriented handshake.
//!
//! 1. initiator -> responder: banner line
//! 2. initiator -> responder: DH public value, hex
//! 3. responder -> initiator: `OK`
//! 4. responder -> initiator: DH public value, hex

use std::io::{BufRead, Read, Write};

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use crate::error::{ChannelError, Result};

pub const BANNER: &str = "SimpleSSLv0";
pub const ACK: &str = "OK";
/// Longest accepted handshake line, excluding the newline.
pub const MAX_LINE_LEN: usize = 4096;

/// What the responder does with the initiator's banner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BannerPolicy {
    #[default]
    Permissive,
    Require(String),
}

impl BannerPolicy {
    pub fn check(&self, banner: &[u8]) -> Result<()> {
        match self {
            BannerPolicy::Permissive => Ok(()),
            BannerPolicy::Require(expected) if expected.as_bytes() == banner => Ok(()),
            BannerPolicy::Require(expected) => Err(ChannelError::MalformedHandshakeInput(format!(
                "unexpected banner {:?}, expected {expected:?}",
                String::from_utf8_lossy(banner)
            ))),
        }
    }
}

/// Reads one `\n`-terminated line, dropping the terminator (and a preceding `\r`).
pub fn read_line<R: BufRead>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let limit = MAX_LINE_LEN as u64 + 1;
    let n = reader.by_ref().take(limit).read_until(b'\n', &mut line)?;

    if n == 0 {
        return Err(ChannelError::MalformedHandshakeInput(format!(
            "stream closed before {what}"
        )));
    }
    if line.last() != Some(&b'\n') {
        let reason = if line.len() > MAX_LINE_LEN {
            format!("{what} is longer than {MAX_LINE_LEN} bytes")
        } else {
            format!("stream closed in the middle of {what}")
        };
        return Err(ChannelError::MalformedHandshakeInput(reason));
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(line)
}

/// Parses hex digits (either case, no `0x`) with optional surrounding whitespace.
pub fn parse_public_value(line: &[u8]) -> Result<BigUint> {
    let digits = line.trim_ascii();
    if digits.is_empty() {
        return Err(ChannelError::MalformedHandshakeInput(
            "empty public value".into(),
        ));
    }
    if let Some(bad) = digits.iter().find(|b| !b.is_ascii_hexdigit()) {
        return Err(ChannelError::MalformedHandshakeInput(format!(
            "public value contains non-hex byte {bad:#04x}"
        )));
    }
    BigUint::parse_bytes(digits, 16)
        .ok_or_else(|| ChannelError::MalformedHandshakeInput("unparsable public value".into()))
}

pub fn format_public_value(value: &BigUint) -> String {
    format!("{value:x}")
}

/// Short hex digest of a public value, for logs.
pub fn fingerprint(value: &BigUint) -> String {
    let digest = Sha256::digest(value.to_bytes_be());
    hex::encode(&digest[..8])
}

pub fn write_client_hello<W: Write>(writer: &mut W, banner: &str, public: &BigUint) -> Result<()> {
    writeln!(writer, "{banner}")?;
    writeln!(writer, "{}", format_public_value(public))?;
    writer.flush()?;
    Ok(())
}

pub fn write_server_hello<W: Write>(writer: &mut W, public: &BigUint) -> Result<()> {
    writeln!(writer, "{ACK}")?;
    writeln!(writer, "{}", format_public_value(public))?;
    writer.flush()?;
    Ok(())
}

/// Reads `OK` and the responder's public value.
pub fn read_server_hello<R: BufRead>(reader: &mut R) -> Result<BigUint> {
    let ack = read_line(reader, "acknowledgement")?;
    if ack != ACK.as_bytes() {
        return Err(ChannelError::MalformedHandshakeInput(format!(
            "expected {ACK:?}, got {:?}",
            String::from_utf8_lossy(&ack)
        )));
    }
    let line = read_line(reader, "server public value")?;
    parse_public_value(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_lines_and_strips_terminators() {
        let mut input = Cursor::new(b"SimpleSSLv0\r\nABCdef\nrest".to_vec());
        assert_eq!(read_line(&mut input, "greeting").unwrap(), b"SimpleSSLv0");
        assert_eq!(read_line(&mut input, "value").unwrap(), b"ABCdef");
        assert!(matches!(
            read_line(&mut input, "value"),
            Err(ChannelError::MalformedHandshakeInput(_))
        ));
    }

    #[test]
    fn rejects_overlong_line() {
        let mut data = vec![b'a'; MAX_LINE_LEN + 10];
        data.push(b'\n');
        let mut input = Cursor::new(data);
        assert!(read_line(&mut input, "value").is_err());

        let mut data = vec![b'a'; MAX_LINE_LEN];
        data.push(b'\n');
        let mut input = Cursor::new(data);
        assert_eq!(read_line(&mut input, "value").unwrap().len(), MAX_LINE_LEN);
    }

    #[test]
    fn parses_hex_in_either_case() {
        assert_eq!(parse_public_value(b"ff").unwrap(), BigUint::from(255u32));
        assert_eq!(parse_public_value(b" 0A1b ").unwrap(), BigUint::from(0xa1bu32));
        assert!(parse_public_value(b"").is_err());
        assert!(parse_public_value(b"0x10").is_err());
        assert!(parse_public_value(b"12_34").is_err());
        assert!(parse_public_value(b"-1").is_err());
    }

    #[test]
    fn banner_policy() {
        assert!(BannerPolicy::Permissive.check(b"\xffanything").is_ok());
        let strict = BannerPolicy::Require(BANNER.into());
        assert!(strict.check(b"SimpleSSLv0").is_ok());
        assert!(strict.check(b"SimpleSSLv1").is_err());
    }

    #[test]
    fn hello_messages_pair_up() {
        let public = BigUint::from(0xbeefu32);

        let mut wire = Vec::new();
        write_client_hello(&mut wire, BANNER, &public).unwrap();
        assert_eq!(wire, b"SimpleSSLv0\nbeef\n");
        let mut input = Cursor::new(wire);
        assert_eq!(read_line(&mut input, "greeting").unwrap(), BANNER.as_bytes());
        let line = read_line(&mut input, "client public value").unwrap();
        assert_eq!(parse_public_value(&line).unwrap(), public);

        let mut wire = Vec::new();
        write_server_hello(&mut wire, &public).unwrap();
        assert_eq!(wire, b"OK\nbeef\n");
        assert_eq!(read_server_hello(&mut Cursor::new(wire)).unwrap(), public);

        assert!(read_server_hello(&mut Cursor::new(b"NO\nbeef\n".to_vec())).is_err());
    }
}
