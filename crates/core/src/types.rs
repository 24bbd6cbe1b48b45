//! Node identifiers and protocol sequence counters.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Monotonic revision counter for a node's published description.
pub type DescSqn = u32;

/// Per-neighbor monotonically increasing counter used for packet replay
/// detection.
pub type BurstSqn = u32;

/// Index of the network device a packet left the sender on.
pub type DevIdx = u16;

/// Number of bytes in a [`GlobalId`] (BLAKE3 output size).
pub const GLOBAL_ID_LEN: usize = 32;

/// Errors from parsing a textual node identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("identity string too short: {0} chars (need {})", 2 * GLOBAL_ID_LEN)]
    TooShort(usize),

    #[error("identity string is not valid hex: {0}")]
    BadHex(String),
}

/// Permanent hash-based identity of a node, derived from its long-term
/// public-key record with BLAKE3.
///
/// `GlobalId` is the unique key across all trust and key-tracking
/// structures; the ordering is plain byte order so identities can live in
/// ordered sets.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalId([u8; GLOBAL_ID_LEN]);

impl GlobalId {
    /// The all-zero identity, used as an iteration floor and never valid
    /// as a real node identity.
    pub const ZERO: GlobalId = GlobalId([0u8; GLOBAL_ID_LEN]);

    pub fn from_bytes(bytes: [u8; GLOBAL_ID_LEN]) -> Self {
        GlobalId(bytes)
    }

    /// Borrows an id out of a wire buffer. Fails when the slice is not
    /// exactly [`GLOBAL_ID_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; GLOBAL_ID_LEN] = bytes.try_into().ok()?;
        Some(GlobalId(arr))
    }

    /// Parses an identity from its hex form, the naming convention of
    /// trust-directory files. Only the first 64 characters are considered,
    /// so file names may carry a human-readable suffix.
    pub fn from_hex(s: &str) -> Result<Self, IdParseError> {
        if s.len() < 2 * GLOBAL_ID_LEN {
            return Err(IdParseError::TooShort(s.len()));
        }
        let mut bytes = [0u8; GLOBAL_ID_LEN];
        hex::decode_to_slice(&s[..2 * GLOBAL_ID_LEN], &mut bytes)
            .map_err(|e| IdParseError::BadHex(e.to_string()))?;
        Ok(GlobalId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; GLOBAL_ID_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; GLOBAL_ID_LEN]
    }

    /// Shortened hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalId({})", self.short())
    }
}
