//! Incremental AES-128-GCM.
//!
//! Records are processed one chunk at a time, so the cipher is assembled from
//! AES, 32-bit big-endian CTR and GHASH instead of a one-shot AEAD. No
//! associated data is authenticated. Output is identical to standard
//! AES-128-GCM with a 96-bit IV.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use ghash::GHash;
use ghash::universal_hash::UniversalHash;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{ChannelError, Result};
use crate::keys::SESSION_KEY_LEN;
use crate::nonce::NONCE_LEN;

pub const TAG_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

type Aes128Ctr = ctr::Ctr32BE<Aes128>;

/// CTR keystream plus a GHASH that accepts input at any alignment.
struct GcmCore {
    keystream: Aes128Ctr,
    ghash: GHash,
    pending: [u8; BLOCK_LEN],
    pending_len: usize,
    text_len: u64,
    tag_mask: [u8; BLOCK_LEN],
}

impl GcmCore {
    fn new(key: &[u8; SESSION_KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        let cipher = Aes128::new(GenericArray::from_slice(key));

        let mut hash_key = GenericArray::default();
        cipher.encrypt_block(&mut hash_key);

        // J0 = IV || 1 masks the tag; the keystream starts at IV || 2
        let mut counter = [0u8; BLOCK_LEN];
        counter[..NONCE_LEN].copy_from_slice(nonce);
        counter[BLOCK_LEN - 1] = 1;
        let mut tag_mask = GenericArray::clone_from_slice(&counter);
        cipher.encrypt_block(&mut tag_mask);

        counter[BLOCK_LEN - 1] = 2;
        let keystream = Aes128Ctr::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(&counter),
        );

        let mut mask = [0u8; BLOCK_LEN];
        mask.copy_from_slice(&tag_mask);

        let core = Self {
            keystream,
            ghash: GHash::new(&hash_key),
            pending: [0u8; BLOCK_LEN],
            pending_len: 0,
            text_len: 0,
            tag_mask: mask,
        };
        hash_key.as_mut_slice().zeroize();
        tag_mask.as_mut_slice().zeroize();
        core
    }

    /// Feeds ciphertext into GHASH, carrying partial blocks between calls.
    fn absorb(&mut self, mut data: &[u8]) {
        self.text_len += data.len() as u64;

        if self.pending_len > 0 {
            let take = (BLOCK_LEN - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len < BLOCK_LEN {
                return;
            }
            self.ghash
                .update(&[ghash::Block::clone_from_slice(&self.pending)]);
            self.pending_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for block in &mut blocks {
            self.ghash.update(&[ghash::Block::clone_from_slice(block)]);
        }
        let rest = blocks.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    fn tag(mut self) -> [u8; TAG_LEN] {
        if self.pending_len > 0 {
            self.ghash.update_padded(&self.pending[..self.pending_len]);
        }

        // bit lengths of the (empty) associated data and of the text
        let mut lengths = [0u8; BLOCK_LEN];
        lengths[8..].copy_from_slice(&(self.text_len * 8).to_be_bytes());
        self.ghash.update(&[ghash::Block::clone_from_slice(&lengths)]);

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&self.ghash.finalize());
        for (t, m) in tag.iter_mut().zip(self.tag_mask.iter()) {
            *t ^= m;
        }
        self.pending.zeroize();
        self.tag_mask.zeroize();
        tag
    }
}

/// Encrypts in place, chunk by chunk.
pub struct GcmEncryptor {
    core: GcmCore,
}

impl GcmEncryptor {
    pub fn new(key: &[u8; SESSION_KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        Self {
            core: GcmCore::new(key, nonce),
        }
    }

    pub fn update(&mut self, buf: &mut [u8]) {
        self.core.keystream.apply_keystream(buf);
        self.core.absorb(buf);
    }

    pub fn finish(self) -> [u8; TAG_LEN] {
        self.core.tag()
    }
}

/// Decrypts in place, chunk by chunk. Nothing it produces is trustworthy
/// until [`GcmDecryptor::finish`] accepts the tag.
pub struct GcmDecryptor {
    core: GcmCore,
}

impl GcmDecryptor {
    pub fn new(key: &[u8; SESSION_KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        Self {
            core: GcmCore::new(key, nonce),
        }
    }

    pub fn update(&mut self, buf: &mut [u8]) {
        self.core.absorb(buf);
        self.core.keystream.apply_keystream(buf);
    }

    pub fn finish(self, tag: &[u8; TAG_LEN]) -> Result<()> {
        let expected = self.core.tag();
        if bool::from(expected.as_slice().ct_eq(tag.as_slice())) {
            Ok(())
        } else {
            Err(ChannelError::AuthenticationFailure)
        }
    }
}
