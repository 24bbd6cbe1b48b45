//! Claimed-key registry.
//!
//! Every identity the node has heard of is tracked here under its global
//! id, together with its certification level, its current (and possibly
//! pending) description content, and the credits that move it up the
//! certification ladder.

use crate::error::{Result, SecError};
use filament_core::{DescSqn, GlobalId};
use filament_crypto::PublicKey;
use filament_wire::{FrameType, LinkAddrRecord, PubkeyRecord, TrustRecord};
use std::collections::BTreeMap;

/// Certification ladder for a claimed key. Levels only ever rise through
/// earned credits and fall through revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CertLevel {
    /// Id seen in some trust list, nothing else known.
    Listed,
    /// Key material requested or known, description not yet accepted.
    Tracked,
    /// A signed description has been verified.
    Certified,
    /// Currently exchanging authenticated packets with us.
    Neighbor,
}

/// Credit grants applied to a claimed key in one step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credits {
    /// A packet signature from this key verified correctly.
    pub pkt_sign: bool,
    /// The id appeared in the locally supported set.
    pub friend: bool,
    /// The id left the locally supported set.
    pub revoke_friend: bool,
}

/// Decoded description content: the sequence number plus the body frames
/// that followed the identity prefix.
#[derive(Debug, Clone, Default)]
pub struct DescContent {
    pub desc_sqn: DescSqn,
    /// References to content not yet locally resolved. The description is
    /// not usable for packet verification until this drops to zero.
    pub unresolved_refs: u32,
    frames: BTreeMap<u8, Vec<u8>>,
}

impl DescContent {
    pub fn new(desc_sqn: DescSqn) -> Self {
        Self {
            desc_sqn,
            ..Self::default()
        }
    }

    pub fn insert_frame(&mut self, frame_type: u8, body: Vec<u8>) {
        self.frames.insert(frame_type, body);
    }

    pub fn frame(&self, frame_type: FrameType) -> Option<&[u8]> {
        self.frames.get(&frame_type.code()).map(Vec::as_slice)
    }

    /// Ids this origin trusts. `None` means the description carries no
    /// trust list at all, which leaves trust unrestricted.
    pub fn trusted_ids(&self) -> Option<Vec<GlobalId>> {
        let body = self.frame(FrameType::Trusts)?;
        // Lists are validated when the description is accepted.
        TrustRecord::decode_list(body).ok()
    }

    /// Whether this origin's trust list admits `id`. `None` when the
    /// description carries no list (trust unrestricted).
    pub fn contains_trusted(&self, id: &GlobalId) -> Option<bool> {
        self.trusted_ids().map(|ids| ids.contains(id))
    }

    /// Link-layer addresses the origin announced, if any.
    pub fn link_addrs(&self) -> Option<Vec<[u8; 16]>> {
        let body = self.frame(FrameType::LinkAddr)?;
        LinkAddrRecord::decode_list(body).ok()
    }

    /// The origin's announced packet-signing key record, if any.
    pub fn pkt_pubkey(&self) -> Option<PubkeyRecord<'_>> {
        PubkeyRecord::decode(self.frame(FrameType::PktPubkey)?).ok()
    }
}

/// Everything known about one remote identity.
#[derive(Debug, Default)]
pub struct ClaimedKey {
    pub cert: CertLevel,
    /// Description currently in effect.
    pub curr_desc: Option<DescContent>,
    /// Newer description accepted but not yet adopted (unresolved refs).
    pub next_desc: Option<DescContent>,
    /// Cached packet-signing key, populated once the id is a neighbor.
    pub neighbor_pkt_key: Option<PublicKey>,
    pkt_sign_credits: u32,
    friend: bool,
}

impl Default for CertLevel {
    fn default() -> Self {
        CertLevel::Listed
    }
}

impl ClaimedKey {
    /// Lowest description sequence number still acceptable from this id.
    pub fn desc_sqn_floor(&self) -> DescSqn {
        self.next_desc
            .as_ref()
            .or(self.curr_desc.as_ref())
            .map(|dc| dc.desc_sqn)
            .unwrap_or(0)
    }

    /// Looks up the description matching `desc_sqn`. A pending next
    /// description shadows the current one. The second tuple element is
    /// true when the match is the adopted current description.
    pub fn desc_for(&self, desc_sqn: DescSqn) -> Option<(&DescContent, bool)> {
        if let Some(next) = &self.next_desc {
            return (next.desc_sqn == desc_sqn).then_some((next, false));
        }
        let curr = self.curr_desc.as_ref()?;
        (curr.desc_sqn == desc_sqn).then_some((curr, true))
    }

    pub fn is_friend(&self) -> bool {
        self.friend
    }

    pub fn pkt_sign_credits(&self) -> u32 {
        self.pkt_sign_credits
    }
}

/// Registry of all claimed keys, ordered by global id.
#[derive(Debug, Default)]
pub struct ClaimedKeyTable {
    nodes: BTreeMap<GlobalId, ClaimedKey>,
}

impl ClaimedKeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &GlobalId) -> Option<&ClaimedKey> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &GlobalId) -> Option<&mut ClaimedKey> {
        self.nodes.get_mut(id)
    }

    /// Ensures `id` is tracked, creating an entry at [`CertLevel::Tracked`]
    /// if it was unknown or merely listed.
    pub fn track(&mut self, id: GlobalId) -> &mut ClaimedKey {
        let ck = self.nodes.entry(id).or_default();
        if ck.cert < CertLevel::Tracked {
            ck.cert = CertLevel::Tracked;
        }
        ck
    }

    /// Applies credit grants and returns the resulting certification
    /// level. Unknown ids are created only by a `friend` grant.
    pub fn update_credits(&mut self, id: &GlobalId, credits: Credits) -> Option<CertLevel> {
        if !self.nodes.contains_key(id) {
            if !credits.friend {
                return None;
            }
            self.track(*id);
        }
        let ck = self.nodes.get_mut(id)?;
        if credits.friend {
            ck.friend = true;
        }
        if credits.revoke_friend {
            ck.friend = false;
            if ck.cert > CertLevel::Tracked {
                ck.cert = CertLevel::Tracked;
                ck.neighbor_pkt_key = None;
            }
        }
        if credits.pkt_sign {
            ck.pkt_sign_credits = ck.pkt_sign_credits.saturating_add(1);
            if ck.cert >= CertLevel::Certified {
                ck.cert = CertLevel::Neighbor;
            }
        }
        Some(ck.cert)
    }

    /// Adopts a verified description for `id`, enforcing the sequence
    /// floor: a description older than what is already held is replayed
    /// state and gets rejected.
    pub fn adopt_description(&mut self, id: GlobalId, desc: DescContent) -> Result<()> {
        let ck = self.track(id);
        let floor = ck.desc_sqn_floor();
        if (ck.curr_desc.is_some() || ck.next_desc.is_some()) && desc.desc_sqn <= floor {
            return Err(SecError::Replay("description sequence not advancing"));
        }
        if desc.unresolved_refs == 0 {
            ck.curr_desc = Some(desc);
            ck.next_desc = None;
            if ck.cert < CertLevel::Certified {
                ck.cert = CertLevel::Certified;
            }
        } else {
            ck.next_desc = Some(desc);
        }
        Ok(())
    }

    /// Promotes a pending description whose references have all resolved.
    pub fn resolve_pending(&mut self, id: &GlobalId) -> bool {
        let Some(ck) = self.nodes.get_mut(id) else {
            return false;
        };
        match ck.next_desc.take() {
            Some(next) if next.unresolved_refs == 0 => {
                ck.curr_desc = Some(next);
                if ck.cert < CertLevel::Certified {
                    ck.cert = CertLevel::Certified;
                }
                true
            }
            other => {
                ck.next_desc = other;
                false
            }
        }
    }

    pub fn remove(&mut self, id: &GlobalId) -> Option<ClaimedKey> {
        self.nodes.remove(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
