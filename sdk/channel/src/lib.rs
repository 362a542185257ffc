//! SimpleSSLv0 secure channel.
//!
//! Finite-field Diffie-Hellman over a line-based handshake, a SHA-256 derived
//! 128-bit session key, and length-prefixed AES-128-GCM records with one
//! 96-bit counter nonce sequence per direction.

pub mod client;
pub mod error;
pub mod gcm;
pub mod handshake;
pub mod keys;
pub mod nonce;
pub mod params;
pub mod record;
pub mod session;

pub use client::{Client, ClientOptions};
pub use error::{ChannelError, Result};
pub use handshake::BannerPolicy;
pub use keys::{
    KeyPair, SessionKey, SharedSecret, compute_shared_secret, derive_session_key,
    encode_fixed_width, generate_keypair,
};
pub use nonce::{Nonce96, NonceState};
pub use params::FieldParameters;
pub use record::{RecordCodec, RecordReader, RecordWriter, RelayOutcome};
pub use session::{Session, SessionOptions, SessionState, SessionSummary};
