//! Content hashing (BLAKE3) for digests and identity derivation.

use filament_core::GlobalId;
use std::fmt;

/// Bytes in a [`Digest`].
pub const DIGEST_LEN: usize = 32;

/// A BLAKE3 digest over signed content.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

/// One-shot digest of a byte slice.
pub fn digest(bytes: &[u8]) -> Digest {
    Digest(*blake3::hash(bytes).as_bytes())
}

/// Incremental digest, used where the signed region is assembled from
/// several buffers (link address, frame header, payload).
#[derive(Default)]
pub struct DigestState {
    hasher: blake3::Hasher,
}

impl DigestState {
    pub fn new() -> Self {
        DigestState {
            hasher: blake3::Hasher::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(bytes);
        self
    }

    pub fn finalize(&self) -> Digest {
        Digest(*self.hasher.finalize().as_bytes())
    }
}

/// Derives the [`GlobalId`] naming a content body in the hash-addressed
/// store, and thereby a node's permanent identity when the body is its
/// public-key record.
pub fn content_id(body: &[u8]) -> GlobalId {
    GlobalId::from_bytes(*blake3::hash(body).as_bytes())
}
