//! Finite-field Diffie-Hellman and session key derivation.
//!
//! Exponentiation uses `num-bigint`'s `modpow`, which is not constant-time in
//! the exponent. The private exponent is ephemeral and used for exactly two
//! exponentiations per session; a timing-hardened backend would be needed to
//! run this against untrusted remote peers.

use std::fmt;

use num_bigint::BigUint;
use rand_core::CryptoRng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{ChannelError, Result};
use crate::params::FieldParameters;

pub const SESSION_KEY_LEN: usize = 16;

/// An ephemeral keypair generated for a single session.
pub struct KeyPair {
    private: BigUint,
    public: BigUint,
}

impl KeyPair {
    pub fn generate<R: CryptoRng + ?Sized>(params: &FieldParameters, rng: &mut R) -> Self {
        let private = random_below(params.modulus(), rng);
        Self::from_private(params, private)
    }

    /// Builds the pair for a fixed private exponent, reduced modulo the modulus.
    pub fn from_private(params: &FieldParameters, private: BigUint) -> Self {
        let private = private % params.modulus();
        let public = params.generator().modpow(&private, params.modulus());
        Self { private, public }
    }

    pub fn public(&self) -> &BigUint {
        &self.public
    }

    pub fn shared_secret(&self, params: &FieldParameters, peer_public: &BigUint) -> SharedSecret {
        compute_shared_secret(params, &self.private, peer_public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// `peer_public ^ private mod modulus`. Only lives long enough to derive a key.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(BigUint);

impl SharedSecret {
    pub fn value(&self) -> &BigUint {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// The 128-bit key used for both record directions.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

pub fn generate_keypair<R: CryptoRng + ?Sized>(params: &FieldParameters, rng: &mut R) -> KeyPair {
    KeyPair::generate(params, rng)
}

/// Out-of-range peer values are reduced rather than rejected.
pub fn compute_shared_secret(
    params: &FieldParameters,
    private: &BigUint,
    peer_public: &BigUint,
) -> SharedSecret {
    let base = peer_public % params.modulus();
    SharedSecret(base.modpow(private, params.modulus()))
}

/// SHA-256 over the fixed-width big-endian secret, truncated to 128 bits.
pub fn derive_session_key(secret: &SharedSecret, params: &FieldParameters) -> Result<SessionKey> {
    let encoded = encode_fixed_width(secret.value(), params.secret_len())?;
    let digest: Zeroizing<[u8; 32]> = Zeroizing::new(Sha256::digest(encoded.as_slice()).into());

    let mut key = [0u8; SESSION_KEY_LEN];
    key.copy_from_slice(&digest[..SESSION_KEY_LEN]);
    Ok(SessionKey(key))
}

/// Serializes `value` big-endian into exactly `width` bytes, left-padded with zeros.
pub fn encode_fixed_width(value: &BigUint, width: usize) -> Result<Zeroizing<Vec<u8>>> {
    let digits = Zeroizing::new(value.to_bytes_be());
    // to_bytes_be renders zero as a single 0x00 byte
    let significant = match digits.iter().position(|&b| b != 0) {
        Some(first) => &digits[first..],
        None => &[][..],
    };
    if significant.len() > width {
        return Err(ChannelError::ValueTooWide {
            needed: significant.len(),
            width,
        });
    }

    let mut out = Zeroizing::new(vec![0u8; width]);
    out[width - significant.len()..].copy_from_slice(significant);
    Ok(out)
}

/// Uniform sample in `[0, bound)` by rejection over masked random bytes.
fn random_below<R: CryptoRng + ?Sized>(bound: &BigUint, rng: &mut R) -> BigUint {
    let bits = bound.bits();
    let len = bits.div_ceil(8) as usize;
    let excess = (len as u64 * 8 - bits) as u32;
    let mut buf = Zeroizing::new(vec![0u8; len]);

    loop {
        rng.fill_bytes(&mut buf);
        buf[0] &= 0xffu8 >> excess;
        let candidate = BigUint::from_bytes_be(&buf);
        if &candidate < bound {
            return candidate;
        }
    }
}
