//! Per-direction 96-bit nonce counters.
//!
//! The responder receives under a counter that starts at all-ones and counts
//! down, and sends under one that starts at zero and counts up. The initiator
//! mirrors this. Counters never wrap: the protocol defines nothing beyond
//! ~2^32 records, and a sequence that runs off either end is reported as
//! exhausted instead of reusing a nonce.

use crate::error::{ChannelError, Result};

pub const NONCE_LEN: usize = 12;

const NONCE_MASK: u128 = (1u128 << 96) - 1;

/// A 96-bit unsigned integer, serialized big-endian as a GCM IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nonce96(u128);

impl Nonce96 {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(NONCE_MASK);

    pub fn new(value: u128) -> Option<Self> {
        (value <= NONCE_MASK).then_some(Self(value))
    }

    pub fn value(self) -> u128 {
        self.0
    }

    pub fn checked_increment(self) -> Option<Self> {
        self.0.checked_add(1).and_then(Self::new)
    }

    pub fn checked_decrement(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    pub fn to_bytes(self) -> [u8; NONCE_LEN] {
        let wide = self.0.to_be_bytes();
        let mut out = [0u8; NONCE_LEN];
        out.copy_from_slice(&wide[16 - NONCE_LEN..]);
        out
    }

    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        let mut wide = [0u8; 16];
        wide[16 - NONCE_LEN..].copy_from_slice(&bytes);
        Self(u128::from_be_bytes(wide))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Yields each nonce once, in order.
#[derive(Debug, Clone)]
pub struct NonceSequence {
    next: Option<Nonce96>,
    direction: Direction,
}

impl NonceSequence {
    pub fn ascending() -> Self {
        Self::starting_at(Nonce96::ZERO, Direction::Ascending)
    }

    pub fn descending() -> Self {
        Self::starting_at(Nonce96::MAX, Direction::Descending)
    }

    pub fn starting_at(start: Nonce96, direction: Direction) -> Self {
        Self {
            next: Some(start),
            direction,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the current nonce and steps past it; `None` once exhausted.
    pub fn advance(&mut self) -> Option<Nonce96> {
        let current = self.next?;
        self.next = match self.direction {
            Direction::Ascending => current.checked_increment(),
            Direction::Descending => current.checked_decrement(),
        };
        Some(current)
    }
}

/// Both directions of one session.
#[derive(Debug, Clone)]
pub struct NonceState {
    recv: NonceSequence,
    send: NonceSequence,
}

impl NonceState {
    pub fn new(recv: NonceSequence, send: NonceSequence) -> Self {
        Self { recv, send }
    }

    pub fn responder() -> Self {
        Self::new(NonceSequence::descending(), NonceSequence::ascending())
    }

    pub fn initiator() -> Self {
        Self::new(NonceSequence::ascending(), NonceSequence::descending())
    }

    pub fn next_recv_nonce(&mut self) -> Result<[u8; NONCE_LEN]> {
        self.recv
            .advance()
            .map(Nonce96::to_bytes)
            .ok_or(ChannelError::NonceExhausted("receive"))
    }

    pub fn next_send_nonce(&mut self) -> Result<[u8; NONCE_LEN]> {
        self.send
            .advance()
            .map(Nonce96::to_bytes)
            .ok_or(ChannelError::NonceExhausted("send"))
    }
}

impl Default for NonceState {
    fn default() -> Self {
        Self::responder()
    }
}
