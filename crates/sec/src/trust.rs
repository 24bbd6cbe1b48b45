//! Trust graph: directory-driven trust sets, neighbor slots, and the
//! per-origin trust bitmaps.
//!
//! Each active neighbor holds a small slot index allocated first-fit
//! from a bounded arena. Every origin carries a bitmap over those slots
//! recording which neighbors it trusts; the bitmaps of all origins grow
//! in lockstep, one word at a time, so a slot index is valid against any
//! origin's bitmap at all times.

use crate::config::SecConfig;
use crate::context::SecurityContext;
use crate::error::{Result, SecError};
use crate::registry::{ClaimedKeyTable, Credits};
use filament_core::{BurstSqn, GlobalId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

const SLOT_WORD_BITS: u16 = 32;

/// Which of the two directory-driven sets an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustSetKind {
    Trusted,
    Supported,
}

/// Answer to "do we support this id", three-valued because support is
/// only meaningful when a supported directory is configured at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportLevel {
    /// No supported directory configured; support is not tracked.
    Untracked,
    NotSupported,
    /// Supported with the given weight.
    Supported(u8),
}

/// Result of re-evaluating one origin/neighbor trust edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustChange {
    Granted,
    Revoked,
}

/// Net effect of one directory synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub added: usize,
    pub removed: usize,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        self.added != 0 || self.removed != 0
    }
}

#[derive(Debug, Default)]
struct TrustNode {
    /// Seen-in-current-scan marker, cleared by the removal pass.
    updated: bool,
    max_trust: u8,
}

#[derive(Debug)]
struct OriginTrust {
    /// Ids this origin trusts. `None` leaves trust unrestricted.
    trusted: Option<BTreeSet<GlobalId>>,
    bitmap: Vec<u32>,
}

/// A currently active, authenticated neighbor.
#[derive(Debug)]
pub struct Neighbor {
    pub slot: u16,
    pub burst_sqn: BurstSqn,
}

#[derive(Debug)]
pub struct TrustGraph {
    trusted: BTreeMap<GlobalId, TrustNode>,
    supported: BTreeMap<GlobalId, TrustNode>,
    trusted_configured: bool,
    supported_configured: bool,
    origins: HashMap<GlobalId, OriginTrust>,
    neighbors: HashMap<GlobalId, Neighbor>,
    /// Slot availability, bit set = slot in use.
    used_slots: Vec<u32>,
    /// Current length of every origin bitmap, in words.
    words: usize,
    max_neighbors: u16,
    self_id: GlobalId,
}

impl TrustGraph {
    pub fn new(config: &SecConfig, self_id: GlobalId) -> Self {
        let mut graph = Self {
            trusted: BTreeMap::new(),
            supported: BTreeMap::new(),
            trusted_configured: config.trusted_dir.is_some(),
            supported_configured: config.supported_dir.is_some(),
            origins: HashMap::new(),
            neighbors: HashMap::new(),
            used_slots: vec![0; (config.max_neighbors as usize + 31) / 32],
            words: 0,
            max_neighbors: config.max_neighbors,
            self_id,
        };
        // The node always trusts and supports itself.
        if graph.trusted_configured {
            graph.trusted.insert(self_id, TrustNode::default());
        }
        if graph.supported_configured {
            graph.supported.insert(self_id, TrustNode::default());
        }
        graph
    }

    fn tree(&mut self, kind: TrustSetKind) -> &mut BTreeMap<GlobalId, TrustNode> {
        match kind {
            TrustSetKind::Trusted => &mut self.trusted,
            TrustSetKind::Supported => &mut self.supported,
        }
    }

    /// Reconciles one trust set against a directory snapshot. Newly
    /// supported ids earn a friend credit; ids that left the supported
    /// set have it revoked. A change to the trusted set marks the local
    /// description dirty so the new referral list gets republished.
    pub fn sync_directory(
        &mut self,
        kind: TrustSetKind,
        snapshot: &BTreeSet<GlobalId>,
        ctx: &mut SecurityContext,
        registry: &mut ClaimedKeyTable,
    ) -> SyncOutcome {
        let self_id = self.self_id;
        let is_supported = kind == TrustSetKind::Supported;
        let tree = self.tree(kind);
        let mut outcome = SyncOutcome::default();

        for id in snapshot {
            match tree.get_mut(id) {
                Some(node) => node.updated = true,
                None => {
                    tree.insert(
                        *id,
                        TrustNode {
                            updated: true,
                            max_trust: 0,
                        },
                    );
                    info!(set = ?kind, id = %id.short(), "trust set gained entry");
                    if is_supported {
                        registry.update_credits(id, Credits { friend: true, ..Credits::default() });
                    }
                    outcome.added += 1;
                }
            }
        }

        tree.retain(|id, node| {
            if node.updated || *id == self_id {
                node.updated = false;
                true
            } else {
                info!(set = ?kind, id = %id.short(), "trust set lost entry");
                if is_supported {
                    registry
                        .update_credits(id, Credits { revoke_friend: true, ..Credits::default() });
                }
                outcome.removed += 1;
                false
            }
        });

        if kind == TrustSetKind::Trusted && outcome.changed() {
            ctx.mark_description_dirty();
        }
        outcome
    }

    /// Ids in the trusted set, in id order (includes the node itself).
    pub fn trusted_ids(&self) -> impl Iterator<Item = &GlobalId> {
        self.trusted.keys()
    }

    /// The trusted set as an id list, `None` when no trusted directory is
    /// configured (and thus no list should be published).
    pub fn trusted_snapshot(&self) -> Option<Vec<GlobalId>> {
        self.trusted_configured
            .then(|| self.trusted.keys().copied().collect())
    }

    /// The supported set as an id list, `None` when unconfigured.
    pub fn supported_snapshot(&self) -> Option<Vec<GlobalId>> {
        self.supported_configured
            .then(|| self.supported.keys().copied().collect())
    }

    /// Whether descriptions from `id` should be processed at all. With
    /// no trusted directory configured, everyone qualifies.
    pub fn description_trusted(&self, id: &GlobalId) -> bool {
        !self.trusted_configured || self.trusted.contains_key(id)
    }

    pub fn supported_trust_level(&self, id: &GlobalId) -> SupportLevel {
        if id.is_zero() {
            return SupportLevel::NotSupported;
        }
        if !self.supported_configured {
            return SupportLevel::Untracked;
        }
        match self.supported.get(id) {
            Some(node) => SupportLevel::Supported(node.max_trust + 1),
            None => SupportLevel::NotSupported,
        }
    }

    /// Registers `id` as an active neighbor, allocating the lowest free
    /// slot and seeding its trust bit in every origin bitmap. Bitmaps
    /// grow by at most one word per registration.
    pub fn register_neighbor(&mut self, id: GlobalId) -> Result<u16> {
        if let Some(nb) = self.neighbors.get(&id) {
            return Ok(nb.slot);
        }
        let slot = (0..self.max_neighbors)
            .find(|s| !word_bit(&self.used_slots, *s))
            .ok_or(SecError::Invariant("neighbor slots exhausted"))?;
        set_word_bit(&mut self.used_slots, slot);

        let needed = slot as usize / SLOT_WORD_BITS as usize + 1;
        if needed > self.words {
            debug_assert_eq!(needed, self.words + 1);
            for origin in self.origins.values_mut() {
                origin.bitmap.push(0);
            }
            self.words = needed;
        }

        for origin in self.origins.values_mut() {
            if origin_admits(origin, &id) {
                set_word_bit(&mut origin.bitmap, slot);
            }
        }
        debug!(id = %id.short(), slot, "neighbor slot allocated");
        self.neighbors.insert(id, Neighbor { slot, burst_sqn: 0 });
        Ok(slot)
    }

    /// Releases a neighbor's slot and clears its bit everywhere. The
    /// bitmaps never shrink; a freed slot is simply reusable.
    pub fn unregister_neighbor(&mut self, id: &GlobalId) {
        if let Some(nb) = self.neighbors.remove(id) {
            clear_word_bit(&mut self.used_slots, nb.slot);
            for origin in self.origins.values_mut() {
                clear_word_bit(&mut origin.bitmap, nb.slot);
            }
            debug!(id = %id.short(), slot = nb.slot, "neighbor slot released");
        }
    }

    pub fn neighbor(&self, id: &GlobalId) -> Option<&Neighbor> {
        self.neighbors.get(id)
    }

    pub fn neighbor_mut(&mut self, id: &GlobalId) -> Option<&mut Neighbor> {
        self.neighbors.get_mut(id)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Installs or replaces an origin's trust list and re-evaluates its
    /// bit for every active neighbor. Returns the edges that changed so
    /// the caller can purge routing state for revoked neighbors.
    pub fn set_origin_trust(
        &mut self,
        origin_id: GlobalId,
        trusted: Option<BTreeSet<GlobalId>>,
    ) -> Vec<(GlobalId, TrustChange)> {
        let words = self.words;
        let origin = self.origins.entry(origin_id).or_insert_with(|| OriginTrust {
            trusted: None,
            bitmap: vec![0; words],
        });
        origin.trusted = trusted;

        let mut changes = Vec::new();
        for (nb_id, nb) in &self.neighbors {
            let had = word_bit(&origin.bitmap, nb.slot);
            let has = origin_admits(origin, nb_id);
            if has && !had {
                set_word_bit(&mut origin.bitmap, nb.slot);
                changes.push((*nb_id, TrustChange::Granted));
            } else if !has && had {
                clear_word_bit(&mut origin.bitmap, nb.slot);
                changes.push((*nb_id, TrustChange::Revoked));
            }
        }
        for (nb_id, change) in &changes {
            debug!(origin = %origin_id.short(), neighbor = %nb_id.short(), ?change,
                   "origin trust edge changed");
        }
        changes
    }

    pub fn remove_origin(&mut self, origin_id: &GlobalId) {
        self.origins.remove(origin_id);
    }

    /// Bitmap test: does `origin` currently trust the neighbor `id`?
    /// Unknown origins and non-neighbors are untrusted.
    pub fn origin_trusts_neighbor(&self, origin: &GlobalId, id: &GlobalId) -> bool {
        let Some(nb) = self.neighbors.get(id) else {
            return false;
        };
        match self.origins.get(origin) {
            Some(o) => word_bit(&o.bitmap, nb.slot),
            None => false,
        }
    }

    #[cfg(test)]
    fn bitmap_words(&self, origin: &GlobalId) -> usize {
        self.origins[origin].bitmap.len()
    }
}

fn origin_admits(origin: &OriginTrust, id: &GlobalId) -> bool {
    match &origin.trusted {
        None => true,
        Some(set) => set.contains(id),
    }
}

fn word_bit(words: &[u32], slot: u16) -> bool {
    words[(slot / SLOT_WORD_BITS) as usize] & (1u32 << (slot % SLOT_WORD_BITS)) != 0
}

fn set_word_bit(words: &mut [u32], slot: u16) {
    words[(slot / SLOT_WORD_BITS) as usize] |= 1u32 << (slot % SLOT_WORD_BITS);
}

fn clear_word_bit(words: &mut [u32], slot: u16) {
    words[(slot / SLOT_WORD_BITS) as usize] &= !(1u32 << (slot % SLOT_WORD_BITS));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecConfig;
    use crate::context::SecurityContext;
    use filament_crypto::{generate, KeyAlgorithm};
    use std::path::PathBuf;

    fn id(byte: u8) -> GlobalId {
        GlobalId::from_bytes([byte; 32])
    }

    fn graph(max_neighbors: u16) -> TrustGraph {
        let config = SecConfig {
            trusted_dir: Some(PathBuf::from("/tmp/trusted")),
            supported_dir: Some(PathBuf::from("/tmp/supported")),
            max_neighbors,
            ..SecConfig::default()
        };
        TrustGraph::new(&config, id(0xee))
    }

    fn ctx() -> SecurityContext {
        let config = SecConfig {
            trusted_dir: Some(PathBuf::from("/tmp/trusted")),
            supported_dir: Some(PathBuf::from("/tmp/supported")),
            ..SecConfig::default()
        };
        SecurityContext::from_parts(config, generate(KeyAlgorithm::Ed25519))
    }

    #[test]
    fn test_slot_first_fit_reuse() {
        let mut g = graph(8);
        assert_eq!(g.register_neighbor(id(1)).unwrap(), 0);
        assert_eq!(g.register_neighbor(id(2)).unwrap(), 1);
        assert_eq!(g.register_neighbor(id(3)).unwrap(), 2);
        g.unregister_neighbor(&id(2));
        // Lowest free slot wins, not a fresh one.
        assert_eq!(g.register_neighbor(id(4)).unwrap(), 1);
        // Registering an existing neighbor is a no-op.
        assert_eq!(g.register_neighbor(id(1)).unwrap(), 0);
    }

    #[test]
    fn test_slot_arena_bounded() {
        let mut g = graph(2);
        g.register_neighbor(id(1)).unwrap();
        g.register_neighbor(id(2)).unwrap();
        assert!(matches!(
            g.register_neighbor(id(3)),
            Err(SecError::Invariant(_))
        ));
    }

    #[test]
    fn test_bitmaps_grow_lockstep_one_word() {
        let mut g = graph(80);
        g.set_origin_trust(id(0xa0), None);
        g.set_origin_trust(id(0xa1), Some(BTreeSet::new()));
        assert_eq!(g.bitmap_words(&id(0xa0)), 0);

        for i in 0..33 {
            g.register_neighbor(id(i)).unwrap();
        }
        // 33 slots need exactly two words, in every origin's bitmap.
        assert_eq!(g.bitmap_words(&id(0xa0)), 2);
        assert_eq!(g.bitmap_words(&id(0xa1)), 2);
    }

    #[test]
    fn test_origin_trust_edges() {
        let mut g = graph(8);
        g.register_neighbor(id(1)).unwrap();
        g.register_neighbor(id(2)).unwrap();

        // No list: trust unrestricted.
        g.set_origin_trust(id(0xa0), None);
        assert!(g.origin_trusts_neighbor(&id(0xa0), &id(1)));
        assert!(g.origin_trusts_neighbor(&id(0xa0), &id(2)));

        // Restricting the list revokes the missing neighbor.
        let mut set = BTreeSet::new();
        set.insert(id(1));
        let changes = g.set_origin_trust(id(0xa0), Some(set));
        assert_eq!(changes, vec![(id(2), TrustChange::Revoked)]);
        assert!(g.origin_trusts_neighbor(&id(0xa0), &id(1)));
        assert!(!g.origin_trusts_neighbor(&id(0xa0), &id(2)));

        // A neighbor registered later picks up the current list.
        let mut set = BTreeSet::new();
        set.insert(id(3));
        g.set_origin_trust(id(0xa1), Some(set));
        g.register_neighbor(id(3)).unwrap();
        assert!(g.origin_trusts_neighbor(&id(0xa1), &id(3)));
        assert!(!g.origin_trusts_neighbor(&id(0xa0), &id(3)));
    }

    #[test]
    fn test_sync_directory_supported_credits() {
        let mut g = graph(8);
        let mut ctx = ctx();
        let mut registry = ClaimedKeyTable::new();

        let mut snapshot = BTreeSet::new();
        snapshot.insert(id(1));
        snapshot.insert(id(2));
        let out = g.sync_directory(TrustSetKind::Supported, &snapshot, &mut ctx, &mut registry);
        assert_eq!(out, SyncOutcome { added: 2, removed: 0 });
        assert!(registry.get(&id(1)).unwrap().is_friend());

        snapshot.remove(&id(2));
        let out = g.sync_directory(TrustSetKind::Supported, &snapshot, &mut ctx, &mut registry);
        assert_eq!(out, SyncOutcome { added: 0, removed: 1 });
        assert!(!registry.get(&id(2)).unwrap().is_friend());
        assert_eq!(
            g.supported_trust_level(&id(1)),
            SupportLevel::Supported(1)
        );
        assert_eq!(g.supported_trust_level(&id(2)), SupportLevel::NotSupported);
        assert_eq!(
            g.supported_trust_level(&GlobalId::ZERO),
            SupportLevel::NotSupported
        );
    }

    #[test]
    fn test_trusted_sync_marks_description_dirty() {
        let mut g = graph(8);
        let mut ctx = ctx();
        let mut registry = ClaimedKeyTable::new();
        ctx.take_description_dirty();

        let mut snapshot = BTreeSet::new();
        snapshot.insert(id(7));
        g.sync_directory(TrustSetKind::Trusted, &snapshot, &mut ctx, &mut registry);
        assert!(ctx.take_description_dirty());

        // An identical snapshot changes nothing.
        g.sync_directory(TrustSetKind::Trusted, &snapshot, &mut ctx, &mut registry);
        assert!(!ctx.take_description_dirty());
        // The node itself stays in the set without appearing on disk.
        assert!(g.description_trusted(&id(0xee)));
        assert!(g.description_trusted(&id(7)));
        assert!(!g.description_trusted(&id(8)));
    }
}
