//! Description signing and verification.
//!
//! A description is signed in two phases: the identity prefix is framed
//! with a zeroed signature field, the body frames are appended, and the
//! signature over everything from the version record onward is patched
//! into the reserved field. Verification reverses this: parse the
//! prefix, resolve the signer's key by content hash, and check the
//! signature over the same span.

use crate::config::SecConfig;
use crate::context::SecurityContext;
use crate::error::{Result, SecError};
use crate::ident::{parse_identity, DescIdentity};
use crate::registry::{ClaimedKeyTable, DescContent};
use crate::store::{ContentEntry, ContentStore};
use crate::trust::{TrustChange, TrustGraph};
use filament_core::{DescSqn, GlobalId};
use filament_crypto::{content_id, digest, KeyAlgorithm, PublicKey};
use filament_wire::{
    read_record, ContentHashRecord, FrameType, PubkeyRecord, SignatureRecord, TlvCursor,
    TlvWriter, TrustRecord, VersionRecord, TLV_HDR_LEN,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Builds and signs this node's description: identity prefix, then the
/// given body frames, with the signature patched in after framing.
pub fn build_description(
    ctx: &SecurityContext,
    desc_sqn: DescSqn,
    body_frames: &[u8],
) -> Vec<u8> {
    let identity = ctx.identity();
    let alg = identity.algorithm();

    let mut w = TlvWriter::new();
    ContentHashRecord {
        gzip: false,
        max_nesting: 1,
        expanded_type: FrameType::Pubkey.code(),
        expanded_id: identity.global_id(),
    }
    .write(&mut w);
    // Phase one: frame the signature record with a zeroed signature.
    let sig_record_at = w.record(
        FrameType::Signature.code(),
        &SignatureRecord::encode_body(alg.code(), &vec![0u8; alg.sig_len()]),
    );
    let payload_at = w.len();
    VersionRecord {
        comp_version: ctx.config.comp_version,
        capabilities: 0,
        desc_sqn,
    }
    .write(&mut w);
    w.raw(body_frames);

    // Phase two: sign from the version record to the end and patch the
    // reserved field.
    let d = digest(&w.as_slice()[payload_at..]);
    let sig = identity.sign(&d);
    let sig_at = sig_record_at + TLV_HDR_LEN + 1;
    w.as_mut_slice()[sig_at..sig_at + sig.len()].copy_from_slice(&sig);
    w.into_vec()
}

/// Verifies a received description end to end.
///
/// Returns the parsed identity and the resolved public-key content on
/// success. Failure severity follows the error taxonomy: structural and
/// signature failures are fatal, an unresolved key or an out-of-window
/// signature strength is not.
pub fn verify_description<'a, 's, S: ContentStore>(
    desc: &'a [u8],
    config: &SecConfig,
    store: &'s S,
) -> Result<(DescIdentity<'a>, &'s ContentEntry)> {
    let ident = parse_identity(desc, config)?;

    if ident.sig_algorithm.strength_bits() > config.desc_verify_max_bits {
        return Err(SecError::Unsupported {
            what: "description signature strength",
        });
    }

    let entry = store
        .resolve(&ident.id)
        .ok_or(SecError::Unresolved { id: ident.id })?;
    if content_id(&entry.body) != ident.id {
        return Err(SecError::Integrity("content body does not match its hash"));
    }

    let rec = PubkeyRecord::decode(&entry.body)
        .map_err(|_| SecError::Integrity("unparseable public-key content"))?;
    if rec.algorithm != ident.sig_algorithm.code() {
        return Err(SecError::Integrity(
            "described key algorithm differs from signature algorithm",
        ));
    }
    if rec.key.len() != ident.sig_algorithm.key_len() {
        return Err(SecError::Integrity("described key has wrong length"));
    }
    let key = PublicKey::from_raw(ident.sig_algorithm, rec.key)
        .map_err(|_| SecError::Integrity("described key is not a valid key"))?;

    let d = digest(&desc[ident.payload_offset..]);
    if !key.verify(&d, ident.signature.signature) {
        return Err(SecError::Integrity("description signature verification failed"));
    }
    Ok((ident, entry))
}

/// Outcome of an accepted description.
///
/// `trust_changes` lists the neighbor edges the origin's new trust list
/// flipped; the caller must purge routes through any `Revoked` neighbor
/// for this origin.
#[derive(Debug)]
pub struct DescOutcome {
    pub id: GlobalId,
    pub trust_changes: Vec<(GlobalId, TrustChange)>,
}

/// Verifies a description and, when it passes the trust gate, installs it
/// as the claimed key's description content and refreshes the origin's
/// trust list.
pub fn process_description<S: ContentStore>(
    desc: &[u8],
    ctx: &SecurityContext,
    store: &S,
    registry: &mut ClaimedKeyTable,
    graph: &mut TrustGraph,
) -> Result<DescOutcome> {
    let (ident, _entry) = verify_description(desc, &ctx.config, store).map_err(|e| {
        if e.is_fatal() {
            warn!(error = %e, "description rejected");
        } else {
            debug!(error = %e, "description not yet processable");
        }
        e
    })?;

    if !graph.description_trusted(&ident.id) {
        debug!(id = %ident.id.short(), "description from untrusted id ignored");
        return Err(SecError::TrustInsufficient("id not in trusted set"));
    }

    let mut content = DescContent::new(ident.version.desc_sqn);
    let mut cur = TlvCursor::new(&desc[ident.payload_offset..]);
    while !cur.is_empty() {
        let rec = read_record(&mut cur)?;
        let Some(ft) = FrameType::from_code(rec.frame_type) else {
            // Unknown body frames are carried but never interpreted.
            content.insert_frame(rec.frame_type, rec.body.to_vec());
            continue;
        };
        crate::frames::validate_body_frame(ft, rec.body)?;
        if ft != FrameType::Version {
            content.insert_frame(rec.frame_type, rec.body.to_vec());
        }
    }

    let trusted: Option<BTreeSet<GlobalId>> = content
        .frame(FrameType::Trusts)
        .map(|body| {
            // Validated above; re-decode into a set.
            TrustRecord::decode_list(body)
                .map(|ids| ids.into_iter().collect())
                .map_err(SecError::from)
        })
        .transpose()?;

    registry.adopt_description(ident.id, content)?;
    let trust_changes = graph.set_origin_trust(ident.id, trusted);

    // A neighbor's announced packet key changes take effect immediately.
    if graph.neighbor(&ident.id).is_some() {
        let ck = registry
            .get_mut(&ident.id)
            .ok_or(SecError::Invariant("adopted description has no registry entry"))?;
        ck.neighbor_pkt_key = match ck
            .curr_desc
            .as_ref()
            .and_then(|dc| dc.pkt_pubkey())
        {
            Some(rec) => {
                let alg = KeyAlgorithm::from_code(rec.algorithm)
                    .ok_or(SecError::Integrity("described packet key algorithm unknown"))?;
                Some(
                    PublicKey::from_raw(alg, rec.key)
                        .map_err(|_| SecError::Integrity("described packet key invalid"))?,
                )
            }
            None => None,
        };
    }

    info!(id = %ident.id.short(), desc_sqn = ident.version.desc_sqn, "description accepted");
    Ok(DescOutcome { id: ident.id, trust_changes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryContentStore;
    use filament_crypto::generate;

    fn ctx_with(alg: KeyAlgorithm) -> SecurityContext {
        SecurityContext::from_parts(SecConfig::default(), generate(alg))
    }

    fn store_for(ctx: &SecurityContext) -> MemoryContentStore {
        let mut store = MemoryContentStore::new();
        store.insert(ctx.identity().record_body());
        store
    }

    #[test]
    fn test_signed_description_verifies() {
        let ctx = ctx_with(KeyAlgorithm::Ed25519);
        let store = store_for(&ctx);
        let desc = build_description(&ctx, 9, &[]);

        let (ident, entry) = verify_description(&desc, &ctx.config, &store).unwrap();
        assert_eq!(ident.id, ctx.global_id());
        assert_eq!(ident.version.desc_sqn, 9);
        assert_eq!(content_id(&entry.body), ident.id);
    }

    #[test]
    fn test_any_payload_flip_fails_verification() {
        let ctx = ctx_with(KeyAlgorithm::Ed25519);
        let store = store_for(&ctx);
        let mut w = TlvWriter::new();
        w.record(FrameType::Trusts.code(), &[3u8; 32]);
        let desc = build_description(&ctx, 1, w.as_slice());
        let ident = parse_identity(&desc, &ctx.config).unwrap();

        // Flip one bit in each signed byte position in turn.
        for pos in ident.payload_offset..desc.len() {
            let mut tampered = desc.clone();
            tampered[pos] ^= 0x01;
            let r = verify_description(&tampered, &ctx.config, &store);
            assert!(r.is_err(), "flip at {pos} accepted");
        }
    }

    #[test]
    fn test_unresolved_key_is_ignorable() {
        let ctx = ctx_with(KeyAlgorithm::Ed25519);
        let empty = MemoryContentStore::new();
        let desc = build_description(&ctx, 1, &[]);
        let err = verify_description(&desc, &ctx.config, &empty).unwrap_err();
        assert!(matches!(err, SecError::Unresolved { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_strength_window_is_ignorable() {
        let ctx = ctx_with(KeyAlgorithm::Ed25519);
        let store = store_for(&ctx);
        let mut config = ctx.config.clone();
        config.desc_verify_max_bits = 128;
        let desc = build_description(&ctx, 1, &[]);
        let err = verify_description(&desc, &config, &store).unwrap_err();
        assert!(matches!(err, SecError::Unsupported { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_wrong_signer_key_fails_verification() {
        // Description signed by one identity, then re-targeted at another
        // identity's resolvable key: the signature cannot check out.
        let ctx = ctx_with(KeyAlgorithm::Ed25519);
        let other = ctx_with(KeyAlgorithm::Ed25519);
        let store = store_for(&other);

        let mut desc = build_description(&ctx, 1, &[]);
        // Splice the other identity's id into the content-hash record.
        let at = TLV_HDR_LEN + 3;
        desc[at..at + 32].copy_from_slice(other.global_id().as_bytes());

        let err = verify_description(&desc, &other.config, &store).unwrap_err();
        assert!(matches!(err, SecError::Integrity(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_process_description_installs_state() {
        let ctx = ctx_with(KeyAlgorithm::Ed25519);
        let store = store_for(&ctx);
        let mut registry = ClaimedKeyTable::new();
        let mut graph = TrustGraph::new(&ctx.config, GlobalId::from_bytes([0xee; 32]));

        let trusted_peer = GlobalId::from_bytes([5; 32]);
        let mut w = TlvWriter::new();
        w.record(FrameType::Trusts.code(), &TrustRecord::encode_list(&[trusted_peer]));
        let desc = build_description(&ctx, 3, w.as_slice());

        let out = process_description(&desc, &ctx, &store, &mut registry, &mut graph).unwrap();
        assert_eq!(out.id, ctx.global_id());
        let ck = registry.get(&out.id).unwrap();
        assert_eq!(ck.desc_sqn_floor(), 3);
        assert_eq!(
            ck.curr_desc.as_ref().unwrap().contains_trusted(&trusted_peer),
            Some(true)
        );

        // Replaying the same description is rejected on the sequence floor.
        let err =
            process_description(&desc, &ctx, &store, &mut registry, &mut graph).unwrap_err();
        assert!(matches!(err, SecError::Replay(_)));
    }

    #[test]
    fn test_revoked_trust_edges_surface_to_caller() {
        let ctx = ctx_with(KeyAlgorithm::Ed25519);
        let store = store_for(&ctx);
        let mut registry = ClaimedKeyTable::new();
        let mut graph = TrustGraph::new(&ctx.config, GlobalId::from_bytes([0xee; 32]));
        let nb = GlobalId::from_bytes([7; 32]);
        graph.register_neighbor(nb).unwrap();

        let mut w = TlvWriter::new();
        w.record(FrameType::Trusts.code(), &TrustRecord::encode_list(&[nb]));
        let desc = build_description(&ctx, 1, w.as_slice());
        let out = process_description(&desc, &ctx, &store, &mut registry, &mut graph).unwrap();
        assert_eq!(out.trust_changes, vec![(nb, TrustChange::Granted)]);
        assert!(graph.origin_trusts_neighbor(&ctx.global_id(), &nb));

        // A later list that drops the neighbor must hand the revocation
        // back so routes through it can be purged.
        let mut w = TlvWriter::new();
        w.record(FrameType::Trusts.code(), &TrustRecord::encode_list(&[]));
        let desc = build_description(&ctx, 2, w.as_slice());
        let out = process_description(&desc, &ctx, &store, &mut registry, &mut graph).unwrap();
        assert_eq!(out.trust_changes, vec![(nb, TrustChange::Revoked)]);
        assert!(!graph.origin_trusts_neighbor(&ctx.global_id(), &nb));

        // The revocation drives the link teardown.
        let mut links = crate::links::LinkTable::new(4);
        links.get_or_create("wlan0", [1; 16], 0, nb).unwrap();
        for (peer, change) in &out.trust_changes {
            if *change == TrustChange::Revoked {
                links.purge_neighbor(peer);
            }
        }
        assert_eq!(links.len(), 0);
    }
}
