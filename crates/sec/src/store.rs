//! Hash-addressed content lookup.
//!
//! Descriptions reference their public keys by content hash; resolving a
//! hash to its byte body is the job of an external content cache. The
//! engines consume it through the [`ContentStore`] trait; the in-memory
//! implementation backs tests and small deployments.

use filament_core::GlobalId;
use filament_crypto::content_id;
use std::collections::HashMap;

/// A resolved content body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub body: Vec<u8>,
}

/// Resolves a content hash to its underlying bytes, if locally available.
pub trait ContentStore {
    fn resolve(&self, id: &GlobalId) -> Option<&ContentEntry>;
}

/// Plain in-memory content store keyed by body hash.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    entries: HashMap<GlobalId, ContentEntry>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a body under its own hash and returns the id.
    pub fn insert(&mut self, body: Vec<u8>) -> GlobalId {
        let id = content_id(&body);
        self.entries.insert(id, ContentEntry { body });
        id
    }

    pub fn remove(&mut self, id: &GlobalId) -> Option<ContentEntry> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn resolve(&self, id: &GlobalId) -> Option<&ContentEntry> {
        self.entries.get(id)
    }
}
