//! Finite-field parameters shared out of band by both peers.

use num_bigint::BigUint;
use num_traits::One;

use crate::error::{ChannelError, Result};

/// The SimpleSSLv0 modulus: a 2048-bit prime written with one leading zero
/// byte. Peers encode shared secrets at the width of this literal (257 bytes).
pub const STANDARD_PRIME_HEX: &str = concat!(
    "00f2b2ab9d7b23c84f9f0ec2f3bc40c5c4ec",
    "4764a7c3d01449662620dd43f3d97a64515a",
    "2af5b3c8e3f224b8d18d07b6b62261200ad8",
    "48f5ff8ac19a1b7343994de846de69c1c2ee",
    "5e62fe4ed374e685e486f1b897d72d01df5c",
    "99ae72b8e9a31777ccaa11a5ae6ca08cfc81",
    "0269337660248d0be9b8214ecdd4656f207d",
    "2977a7364e443acf431af76aead7224f86a0",
    "3eb9998692acebd50c558ce9a7fefc37ab24",
    "2f0c19b51a0167d5dae94b853210f6f492a9",
    "bbb39ad809396b44a299bd85acafdfedbc4d",
    "21ae2ec307ab3dab09d799c6011c41cf813d",
    "621ef205cf2276d0cf7acf09108e14a8b8dd",
    "e1ee2045deaebdb529dbd187d4ee4b30a946",
    "58b156ac33",
);

pub const STANDARD_GENERATOR: u32 = 2;

/// Modulus, generator and the fixed width used to serialize shared secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParameters {
    modulus: BigUint,
    generator: BigUint,
    secret_len: usize,
}

impl FieldParameters {
    /// Builds parameters whose secret width is the minimal width of `modulus`.
    pub fn new(modulus: BigUint, generator: BigUint) -> Result<Self> {
        if modulus <= BigUint::one() {
            return Err(ChannelError::InvalidParameters(
                "modulus must be greater than one".into(),
            ));
        }
        if generator <= BigUint::one() || generator >= modulus {
            return Err(ChannelError::InvalidParameters(
                "generator must lie strictly between 1 and the modulus".into(),
            ));
        }
        let secret_len = minimal_width(&modulus);
        Ok(Self {
            modulus,
            generator,
            secret_len,
        })
    }

    /// Parses a hex modulus, keeping the width it is written at (leading zero
    /// bytes included) as the secret width.
    pub fn from_hex(modulus_hex: &str, generator: u32) -> Result<Self> {
        let digits = modulus_hex.trim();
        let modulus = BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(|| {
            ChannelError::InvalidParameters("modulus is not valid hexadecimal".into())
        })?;
        let written = digits.len().div_ceil(2);
        Self::new(modulus, BigUint::from(generator))?.with_secret_len(written)
    }

    /// Overrides the serialization width. It may not be narrower than the modulus.
    pub fn with_secret_len(mut self, secret_len: usize) -> Result<Self> {
        let needed = minimal_width(&self.modulus);
        if secret_len < needed {
            return Err(ChannelError::InvalidParameters(format!(
                "secret width {secret_len} is narrower than the {needed}-byte modulus"
            )));
        }
        self.secret_len = secret_len;
        Ok(self)
    }

    /// The compiled-in SimpleSSLv0 suite.
    pub fn standard() -> Self {
        Self::from_hex(STANDARD_PRIME_HEX, STANDARD_GENERATOR)
            .expect("compiled-in SimpleSSLv0 parameters are valid")
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// Width in bytes of a serialized shared secret.
    pub fn secret_len(&self) -> usize {
        self.secret_len
    }
}

fn minimal_width(value: &BigUint) -> usize {
    value.bits().div_ceil(8) as usize
}
