//! Per-packet authentication.
//!
//! Outbound packets carry a signature frame holding the sender's burst
//! and description sequence numbers, device index, and a signature by
//! the sender's ephemeral packet key over the source address, that
//! header, and the rest of the packet. The frame is encoded in two
//! phases so the signature can cover payload framed after it.
//!
//! Inbound verification runs a fixed chain of checks ordered cheapest
//! first; each failure maps onto the error taxonomy's fatal/ignorable
//! split and, where the cause is merely unresolved content, emits a
//! corrective fetch request instead of an alarm.

use crate::context::SecurityContext;
use crate::error::{Result, SecError};
use crate::links::{LinkId, LinkTable};
use crate::registry::{CertLevel, ClaimedKeyTable, Credits};
use crate::store::ContentStore;
use crate::trust::TrustGraph;
use filament_core::{DescSqn, GlobalId};
use filament_crypto::{DigestState, KeyAlgorithm, PublicKey};
use filament_wire::{
    FrameType, PacketSigHeader, TlvWriter, PACKET_SIG_HDR_LEN, TLV_HDR_LEN,
};
use tracing::{debug, trace, warn};

/// Decoded packet-signature frame body.
#[derive(Debug, Clone, Copy)]
pub struct PacketFrame<'a> {
    pub header: PacketSigHeader,
    /// Algorithm code of the signature; 0 on unsigned packets.
    pub sig_type: u8,
    pub signature: &'a [u8],
}

impl<'a> PacketFrame<'a> {
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        if body.len() < PACKET_SIG_HDR_LEN + 1 {
            return Err(SecError::malformed(
                "packet signature frame",
                format!("{} byte body", body.len()),
            ));
        }
        Ok(PacketFrame {
            header: PacketSigHeader::decode(&body[..PACKET_SIG_HDR_LEN])?,
            sig_type: body[PACKET_SIG_HDR_LEN],
            signature: &body[PACKET_SIG_HDR_LEN + 1..],
        })
    }
}

/// Link-layer context of a received packet.
#[derive(Debug)]
pub struct PacketMeta<'a> {
    /// Global id the sender claims.
    pub claimed_id: GlobalId,
    /// Link-local source address the packet arrived from.
    pub src_addr: [u8; 16],
    /// Interface the packet arrived on.
    pub iface: &'a str,
}

/// Corrective action requested by an ignorable verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRequest {
    Description { id: GlobalId, desc_sqn: DescSqn },
}

/// Successful packet verification.
#[derive(Debug, Clone, Copy)]
pub struct Accepted {
    /// The verified link, present once the sender is an active neighbor
    /// speaking from its current description.
    pub link: Option<LinkId>,
}

/// In-progress signed packet: the frame is written, the signature field
/// is reserved, payload may follow.
#[derive(Debug)]
pub struct PacketSigner {
    hdr_at: usize,
    sig_at: usize,
    sig_len: usize,
    payload_at: usize,
}

impl PacketSigner {
    /// Phase one: frames the packet-signature record with a zeroed
    /// signature field. Requires a live packet key when signing is
    /// enabled; an unsigned frame (type 0, empty signature) is emitted
    /// when it is not.
    pub fn begin(
        w: &mut TlvWriter,
        ctx: &SecurityContext,
        header: PacketSigHeader,
    ) -> Result<PacketSigner> {
        let (type_code, sig_len) = if ctx.config.packet_sign_bits != 0 {
            let key = ctx.packet_key().ok_or_else(|| {
                SecError::KeyLifecycle("no live packet key at encode time".to_owned())
            })?;
            (key.algorithm().code(), key.algorithm().sig_len())
        } else {
            (0, 0)
        };

        let mut body = Vec::with_capacity(PACKET_SIG_HDR_LEN + 1 + sig_len);
        body.extend_from_slice(&header.encode());
        body.push(type_code);
        body.resize(PACKET_SIG_HDR_LEN + 1 + sig_len, 0);
        let record_at = w.record(FrameType::PacketSignature.code(), &body);

        Ok(PacketSigner {
            hdr_at: record_at + TLV_HDR_LEN,
            sig_at: record_at + TLV_HDR_LEN + PACKET_SIG_HDR_LEN + 1,
            sig_len,
            payload_at: w.len(),
        })
    }

    /// Phase two: signs source address, frame header, and everything
    /// framed after [`begin`](PacketSigner::begin), then patches the
    /// reserved field.
    pub fn finish(
        self,
        w: &mut TlvWriter,
        ctx: &SecurityContext,
        src_addr: &[u8; 16],
    ) -> Result<()> {
        if self.sig_len == 0 {
            return Ok(());
        }
        let key = ctx.packet_key().ok_or_else(|| {
            SecError::KeyLifecycle("packet key retired mid-encode".to_owned())
        })?;

        let d = {
            let buf = w.as_slice();
            DigestState::new()
                .update(src_addr)
                .update(&buf[self.hdr_at..self.hdr_at + PACKET_SIG_HDR_LEN])
                .update(&buf[self.payload_at..])
                .finalize()
        };
        let sig = key.sign(&d);
        debug_assert_eq!(sig.len(), self.sig_len);
        w.as_mut_slice()[self.sig_at..self.sig_at + self.sig_len].copy_from_slice(&sig);
        Ok(())
    }
}

/// Verifies one received packet against all sender state.
///
/// `payload` is every packet byte after the signature frame. On an
/// unresolved description, a [`FetchRequest`] is pushed so the caller
/// can schedule the retrieval.
#[allow(clippy::too_many_arguments)]
pub fn verify_packet(
    frame: &PacketFrame<'_>,
    payload: &[u8],
    meta: &PacketMeta<'_>,
    ctx: &SecurityContext,
    registry: &mut ClaimedKeyTable,
    store: &impl ContentStore,
    graph: &mut TrustGraph,
    links: &mut LinkTable,
    fetches: &mut Vec<FetchRequest>,
) -> Result<Accepted> {
    let result = verify_packet_inner(
        frame, payload, meta, ctx, registry, store, graph, links, fetches,
    );
    match &result {
        Ok(accepted) => trace!(
            id = %meta.claimed_id.short(),
            burst = frame.header.burst_sqn,
            link = ?accepted.link,
            "packet verified"
        ),
        Err(e) if e.is_fatal() => warn!(
            id = %meta.claimed_id.short(),
            iface = meta.iface,
            error = %e,
            "packet failed verification"
        ),
        Err(e) => debug!(id = %meta.claimed_id.short(), error = %e, "packet dropped"),
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn verify_packet_inner(
    frame: &PacketFrame<'_>,
    payload: &[u8],
    meta: &PacketMeta<'_>,
    ctx: &SecurityContext,
    registry: &mut ClaimedKeyTable,
    store: &impl ContentStore,
    graph: &mut TrustGraph,
    links: &mut LinkTable,
    fetches: &mut Vec<FetchRequest>,
) -> Result<Accepted> {
    // Structural checks on the signature frame itself.
    let sig_alg = if frame.sig_type != 0 {
        let alg = KeyAlgorithm::from_code(frame.sig_type).ok_or_else(|| {
            SecError::malformed(
                "packet signature frame",
                format!("unknown algorithm code {}", frame.sig_type),
            )
        })?;
        if frame.signature.len() != alg.sig_len() {
            return Err(SecError::malformed(
                "packet signature frame",
                format!(
                    "signature length {} does not match {}",
                    frame.signature.len(),
                    alg.name()
                ),
            ));
        }
        Some(alg)
    } else if !frame.signature.is_empty() {
        return Err(SecError::malformed(
            "packet signature frame",
            "signature bytes on an unsigned frame",
        ));
    } else {
        None
    };

    // Signed span must hold at least one record.
    if payload.len() <= TLV_HDR_LEN {
        return Err(SecError::malformed("packet", "no payload after signature frame"));
    }

    // Strength window; unsigned packets count as strength 0.
    let strength = sig_alg.map(KeyAlgorithm::strength_bits).unwrap_or(0);
    if !ctx.config.packet_strength_acceptable(strength) {
        return Err(SecError::Unsupported {
            what: "packet signature strength",
        });
    }

    // Sender certification and description state.
    let ck = registry
        .get(&meta.claimed_id)
        .ok_or(SecError::TrustInsufficient("unknown sender id"))?;
    if ck.cert < CertLevel::Tracked {
        return Err(SecError::TrustInsufficient("sender id not tracked"));
    }
    if frame.header.desc_sqn < ck.desc_sqn_floor() {
        return Err(SecError::Replay("outdated description sequence"));
    }
    if store.resolve(&meta.claimed_id).is_none() {
        return Err(SecError::Unresolved { id: meta.claimed_id });
    }
    let Some((dc, dc_is_current)) = ck.desc_for(frame.header.desc_sqn) else {
        fetches.push(FetchRequest::Description {
            id: meta.claimed_id,
            desc_sqn: frame.header.desc_sqn,
        });
        return Err(SecError::Unresolved { id: meta.claimed_id });
    };
    if ck.cert < CertLevel::Certified {
        return Err(SecError::TrustInsufficient("sender id not certified"));
    }
    if dc.unresolved_refs != 0 {
        return Err(SecError::Unresolved { id: meta.claimed_id });
    }

    // Source address must be one the description announces, when it
    // announces any.
    if let Some(addrs) = dc.link_addrs() {
        if !addrs.is_empty() && !addrs.contains(&meta.src_addr) {
            return Err(SecError::Spoofed("source address not announced by sender"));
        }
    }

    // Packet key: the cached neighbor key, or the one the description
    // announces.
    let cached = ck.neighbor_pkt_key.as_ref();
    let parsed: Option<PublicKey> = if cached.is_none() {
        match dc.pkt_pubkey() {
            Some(rec) => {
                let alg = KeyAlgorithm::from_code(rec.algorithm)
                    .ok_or(SecError::Integrity("described packet key algorithm unknown"))?;
                Some(
                    PublicKey::from_raw(alg, rec.key)
                        .map_err(|_| SecError::Integrity("described packet key invalid"))?,
                )
            }
            None => None,
        }
    } else {
        None
    };
    let pkt_key: Option<&PublicKey> = cached.or(parsed.as_ref());

    // Described and used key must agree in existence and algorithm.
    match (pkt_key, sig_alg) {
        (Some(_), None) => {
            return Err(SecError::Integrity("described packet key not used"));
        }
        (None, Some(_)) => {
            return Err(SecError::Integrity("undescribed packet key used"));
        }
        (Some(key), Some(alg)) => {
            if key.algorithm() != alg {
                return Err(SecError::Integrity("described key differs from used key"));
            }
            let d = DigestState::new()
                .update(&meta.src_addr)
                .update(&frame.header.encode())
                .update(payload)
                .finalize();
            if !key.verify(&d, frame.signature) {
                return Err(SecError::Integrity("packet signature verification failed"));
            }
        }
        (None, None) => {}
    }

    // The verified signature earns a credit; the sender must come out of
    // it at neighbor level to be admitted.
    let cert = registry
        .update_credits(&meta.claimed_id, Credits { pkt_sign: true, ..Credits::default() })
        .unwrap_or(CertLevel::Listed);
    if cert < CertLevel::Neighbor {
        return Err(SecError::TrustInsufficient("sender below neighbor level"));
    }

    // Burst anti-replay and link admission apply only to an active
    // neighbor speaking from its adopted current description.
    let mut link = None;
    if dc_is_current {
        if let Some(nb) = graph.neighbor_mut(&meta.claimed_id) {
            if frame.header.burst_sqn < nb.burst_sqn {
                return Err(SecError::Replay("outdated burst sequence"));
            }
            nb.burst_sqn = frame.header.burst_sqn;
            link = Some(
                links
                    .get_or_create(
                        meta.iface,
                        meta.src_addr,
                        frame.header.dev_idx,
                        meta.claimed_id,
                    )
                    .ok_or(SecError::Exhausted("link table full"))?,
            );
        }
    }
    Ok(Accepted { link })
}
