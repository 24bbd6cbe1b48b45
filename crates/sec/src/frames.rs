//! Description body frames: shape validation and local assembly.
//!
//! The identity prefix is handled positionally by the identity parser;
//! everything after it is a body frame validated here before it is
//! stored as description content.

use crate::context::SecurityContext;
use crate::error::{Result, SecError};
use crate::trust::TrustGraph;
use filament_core::DescSqn;
use filament_crypto::KeyAlgorithm;
use filament_wire::{
    FrameType, PubkeyRecord, TlvWriter, LINK_ADDR_LEN, TRUST_RECORD_LEN, VERSION_RECORD_LEN,
};

/// Body-shape rule of one frame type.
#[derive(Debug, Clone, Copy)]
enum BodyRule {
    /// Exactly this many body bytes.
    Exact(usize),
    /// Zero or more entries of this size.
    Multiple(usize),
    /// Algorithm code plus a key of that algorithm's length.
    PublicKey,
    /// Legal only at its fixed prefix/packet position, never in a body.
    Positional,
}

/// One entry of the frame handler table.
#[derive(Debug)]
pub struct FrameHandler {
    pub name: &'static str,
    pub frame_type: FrameType,
    rule: BodyRule,
}

/// The security frame database: every frame type the core produces or
/// consumes, with its body-shape rule.
static HANDLERS: &[FrameHandler] = &[
    FrameHandler { name: "content-hash", frame_type: FrameType::ContentHash, rule: BodyRule::Positional },
    FrameHandler { name: "desc-signature", frame_type: FrameType::Signature, rule: BodyRule::Positional },
    FrameHandler { name: "desc-signature-dummy", frame_type: FrameType::SignatureDummy, rule: BodyRule::Positional },
    FrameHandler { name: "desc-version", frame_type: FrameType::Version, rule: BodyRule::Exact(VERSION_RECORD_LEN) },
    FrameHandler { name: "desc-pubkey", frame_type: FrameType::Pubkey, rule: BodyRule::PublicKey },
    FrameHandler { name: "desc-pkt-pubkey", frame_type: FrameType::PktPubkey, rule: BodyRule::PublicKey },
    FrameHandler { name: "desc-trusts", frame_type: FrameType::Trusts, rule: BodyRule::Multiple(TRUST_RECORD_LEN) },
    FrameHandler { name: "desc-supports", frame_type: FrameType::Supports, rule: BodyRule::Multiple(TRUST_RECORD_LEN) },
    FrameHandler { name: "desc-llocal", frame_type: FrameType::LinkAddr, rule: BodyRule::Multiple(LINK_ADDR_LEN) },
    FrameHandler { name: "packet-signature", frame_type: FrameType::PacketSignature, rule: BodyRule::Positional },
];

/// Looks up the handler for a frame type.
pub fn handler(frame_type: FrameType) -> &'static FrameHandler {
    // The table covers every FrameType variant.
    HANDLERS
        .iter()
        .find(|h| h.frame_type == frame_type)
        .expect("frame handler table is total")
}

/// Validates the body shape of one description frame against the
/// handler table. Positional frames appearing in a body are malformed.
pub fn validate_body_frame(frame_type: FrameType, body: &[u8]) -> Result<()> {
    let h = handler(frame_type);
    match h.rule {
        BodyRule::Exact(len) if body.len() != len => Err(SecError::malformed(
            "description body",
            format!("{} frame with {} byte body", h.name, body.len()),
        )),
        BodyRule::Multiple(unit) if body.len() % unit != 0 => Err(SecError::malformed(
            "description body",
            format!("{} frame with ragged {} byte body", h.name, body.len()),
        )),
        BodyRule::PublicKey => {
            let rec = PubkeyRecord::decode(body)?;
            let alg = KeyAlgorithm::from_code(rec.algorithm).ok_or_else(|| {
                SecError::malformed(
                    "public-key frame",
                    format!("unknown algorithm code {}", rec.algorithm),
                )
            })?;
            if rec.key.len() != alg.key_len() {
                return Err(SecError::malformed(
                    "public-key frame",
                    format!("{} byte key for {}", rec.key.len(), alg.name()),
                ));
            }
            Ok(())
        }
        BodyRule::Positional => Err(SecError::malformed(
            "description body",
            format!("{} frame outside its position", h.name),
        )),
        _ => Ok(()),
    }
}

/// Assembles this node's description body frames: identity key, the live
/// packet key if signing is enabled, the published trust lists, and the
/// announced link addresses.
pub fn build_local_frames(
    ctx: &SecurityContext,
    graph: &TrustGraph,
    link_addrs: &[[u8; LINK_ADDR_LEN]],
) -> Vec<u8> {
    let mut w = TlvWriter::new();
    w.record(FrameType::Pubkey.code(), &ctx.identity().record_body());
    if let Some(key) = ctx.packet_key() {
        w.record(FrameType::PktPubkey.code(), &key.record_body());
    }
    if let Some(ids) = graph.trusted_snapshot() {
        w.record(
            FrameType::Trusts.code(),
            &filament_wire::TrustRecord::encode_list(&ids),
        );
    }
    if let Some(ids) = graph.supported_snapshot() {
        w.record(
            FrameType::Supports.code(),
            &filament_wire::TrustRecord::encode_list(&ids),
        );
    }
    if !link_addrs.is_empty() {
        w.record(
            FrameType::LinkAddr.code(),
            &filament_wire::LinkAddrRecord::encode_list(link_addrs),
        );
    }
    w.into_vec()
}

/// Builds this node's complete signed description.
pub fn build_local_description(
    ctx: &SecurityContext,
    graph: &TrustGraph,
    desc_sqn: DescSqn,
    link_addrs: &[[u8; LINK_ADDR_LEN]],
) -> Vec<u8> {
    let body = build_local_frames(ctx, graph, link_addrs);
    crate::desc::build_description(ctx, desc_sqn, &body)
}
