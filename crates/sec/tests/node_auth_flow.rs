//! End-to-end authentication flow between two nodes.
//!
//! Scenario suite: a sender publishes its signed description, a receiver
//! verifies it, and authenticated packets flow; then a red-cell pass
//! checks that forged, tampered, replayed, and spoofed traffic is
//! rejected with the expected severity.

use filament_core::{GlobalId, Scheduler};
use filament_crypto::generate;
use filament_sec::{
    build_description, process_description, verify_packet, CertLevel, ClaimedKeyTable,
    DirWatch, FetchRequest, LinkTable, MemoryContentStore, PacketFrame, PacketMeta,
    PacketSigner, SecConfig, SecError, SecurityContext, TrustGraph, TrustSetKind,
};
use filament_wire::{
    read_record, FrameType, LinkAddrRecord, PacketSigHeader, TlvCursor, TlvWriter,
};

const SENDER_ADDR: [u8; 16] = [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x42];

/// One simulated node: its security context plus the receiver-side state
/// it keeps about everyone else.
struct Node {
    ctx: SecurityContext,
    registry: ClaimedKeyTable,
    store: MemoryContentStore,
    graph: TrustGraph,
    links: LinkTable,
    sched: Scheduler<filament_sec::SecTask>,
}

impl Node {
    fn new(config: SecConfig) -> Self {
        let ctx = SecurityContext::from_parts(config.clone(), generate(config.key_algorithm));
        Node {
            graph: TrustGraph::new(&config, ctx.global_id()),
            ctx,
            registry: ClaimedKeyTable::new(),
            store: MemoryContentStore::new(),
            links: LinkTable::new(16),
            sched: Scheduler::new(),
        }
    }

    fn learn(&mut self, peer: &SecurityContext, desc: &[u8]) {
        self.store.insert(peer.identity().record_body());
        process_description(desc, &self.ctx, &self.store, &mut self.registry, &mut self.graph)
            .expect("peer description must verify");
        self.graph.register_neighbor(peer.global_id()).unwrap();
    }

    fn receive(
        &mut self,
        claimed_id: GlobalId,
        src_addr: [u8; 16],
        packet: &[u8],
    ) -> (Result<filament_sec::Accepted, SecError>, Vec<FetchRequest>) {
        let mut cur = TlvCursor::new(packet);
        let rec = read_record(&mut cur).unwrap();
        let frame = PacketFrame::parse(rec.body).unwrap();
        let mut fetches = Vec::new();
        let result = verify_packet(
            &frame,
            cur.rest(),
            &PacketMeta { claimed_id, src_addr, iface: "mesh0" },
            &self.ctx,
            &mut self.registry,
            &self.store,
            &mut self.graph,
            &mut self.links,
            &mut fetches,
        );
        (result, fetches)
    }
}

fn published_description(sender: &SecurityContext, desc_sqn: u32) -> Vec<u8> {
    let mut body = TlvWriter::new();
    body.record(FrameType::Pubkey.code(), &sender.identity().record_body());
    body.record(
        FrameType::PktPubkey.code(),
        &sender.packet_key().expect("sender has a packet key").record_body(),
    );
    body.record(
        FrameType::LinkAddr.code(),
        &LinkAddrRecord::encode_list(&[SENDER_ADDR]),
    );
    build_description(sender, desc_sqn, body.as_slice())
}

fn signed_packet(sender: &SecurityContext, burst_sqn: u32, desc_sqn: u32, note: &[u8]) -> Vec<u8> {
    let mut w = TlvWriter::new();
    let signer = PacketSigner::begin(
        &mut w,
        sender,
        PacketSigHeader { burst_sqn, desc_sqn, dev_idx: 1 },
    )
    .unwrap();
    w.record(FrameType::Trusts.code(), &[0u8; 32]);
    w.record(0x7e, note);
    signer.finish(&mut w, sender, &SENDER_ADDR).unwrap();
    w.into_vec()
}

fn sender_node() -> Node {
    let mut node = Node::new(SecConfig::default());
    node.ctx.ensure_packet_key(1_000, &mut node.sched).unwrap();
    node
}

#[test]
fn test_two_node_description_and_packet_exchange() {
    let sender = sender_node();
    let mut receiver = Node::new(SecConfig::default());
    receiver.learn(&sender.ctx, &published_description(&sender.ctx, 1));

    // Certified after the description, neighbor after the first packet.
    let id = sender.ctx.global_id();
    assert_eq!(receiver.registry.get(&id).unwrap().cert, CertLevel::Certified);

    let (result, fetches) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 1, 1, b"hello"));
    let accepted = result.unwrap();
    assert!(accepted.link.is_some());
    assert!(fetches.is_empty());
    assert_eq!(receiver.registry.get(&id).unwrap().cert, CertLevel::Neighbor);

    // A later burst keeps the same link.
    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 2, 1, b"again"));
    assert_eq!(result.unwrap().link, accepted.link);
}

#[test]
fn test_red_cell_packet_attacks_rejected() {
    let sender = sender_node();
    let mut receiver = Node::new(SecConfig::default());
    receiver.learn(&sender.ctx, &published_description(&sender.ctx, 1));
    let id = sender.ctx.global_id();

    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 5, 1, b"legit"));
    result.unwrap();

    // Replay: burst sequence behind the verified one.
    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 4, 1, b"old"));
    let err = result.unwrap_err();
    assert!(matches!(err, SecError::Replay(_)));
    assert!(!err.is_fatal());

    // Tamper: any payload bit flip breaks the signature.
    let mut tampered = signed_packet(&sender.ctx, 6, 1, b"tamper");
    let last = tampered.len() - 1;
    tampered[last] ^= 0x80;
    let (result, _) = receiver.receive(id, SENDER_ADDR, &tampered);
    let err = result.unwrap_err();
    assert!(matches!(err, SecError::Integrity(_)));
    assert!(err.is_fatal());

    // Spoof: valid signature, wrong source address for the claimed id.
    let (result, _) =
        receiver.receive(id, [0xde; 16], &signed_packet(&sender.ctx, 7, 1, b"spoof"));
    assert!(matches!(result.unwrap_err(), SecError::Spoofed(_)));

    // Impersonation: a stranger signing under its own key but claiming
    // the sender's id fails on the described-key comparison.
    let mut stranger = Node::new(SecConfig::default());
    stranger.ctx.ensure_packet_key(0, &mut stranger.sched).unwrap();
    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&stranger.ctx, 8, 1, b"forged"));
    let err = result.unwrap_err();
    assert!(matches!(err, SecError::Integrity(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_description_update_supersedes_old_packets() {
    let sender = sender_node();
    let mut receiver = Node::new(SecConfig::default());
    receiver.learn(&sender.ctx, &published_description(&sender.ctx, 1));
    let id = sender.ctx.global_id();

    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 1, 1, b"v1"));
    result.unwrap();

    // The sender republishes under a higher sequence number.
    let desc2 = published_description(&sender.ctx, 2);
    process_description(
        &desc2,
        &receiver.ctx,
        &receiver.store,
        &mut receiver.registry,
        &mut receiver.graph,
    )
    .unwrap();

    // Packets referencing the superseded description are replays now.
    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 2, 1, b"stale"));
    assert!(matches!(result.unwrap_err(), SecError::Replay(_)));

    // Packets under the new description and key verify.
    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 2, 2, b"fresh"));
    result.unwrap();
}

#[test]
fn test_unknown_desc_sqn_triggers_fetch_request() {
    let sender = sender_node();
    let mut receiver = Node::new(SecConfig::default());
    receiver.learn(&sender.ctx, &published_description(&sender.ctx, 1));
    let id = sender.ctx.global_id();

    let (result, fetches) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 1, 3, b"future"));
    assert!(matches!(result.unwrap_err(), SecError::Unresolved { .. }));
    assert_eq!(fetches, vec![FetchRequest::Description { id, desc_sqn: 3 }]);
}

#[test]
fn test_supported_directory_drives_admission() {
    let dir = tempfile::tempdir().unwrap();
    let config = SecConfig {
        supported_dir: Some(dir.path().to_path_buf()),
        ..SecConfig::default()
    };
    let sender = sender_node();
    let mut receiver = Node::new(config);
    let id = sender.ctx.global_id();

    // The sender's id appears in the supported directory.
    std::fs::write(dir.path().join(format!("{id}.field-unit")), b"").unwrap();
    let mut watch = DirWatch::new(TrustSetKind::Supported, dir.path().to_path_buf(), false);
    let out = watch
        .rescan(
            0,
            &mut receiver.graph,
            &mut receiver.ctx,
            &mut receiver.registry,
            &mut receiver.sched,
        )
        .unwrap();
    assert_eq!(out.added, 1);
    assert!(receiver.registry.get(&id).unwrap().is_friend());

    receiver.learn(&sender.ctx, &published_description(&sender.ctx, 1));
    let (result, _) =
        receiver.receive(id, SENDER_ADDR, &signed_packet(&sender.ctx, 1, 1, b"supported"));
    assert!(result.unwrap().link.is_some());

    // Removing the file revokes support and demotes the neighbor.
    std::fs::remove_file(dir.path().join(format!("{id}.field-unit"))).unwrap();
    let out = watch
        .rescan(
            5_000,
            &mut receiver.graph,
            &mut receiver.ctx,
            &mut receiver.registry,
            &mut receiver.sched,
        )
        .unwrap();
    assert_eq!(out.removed, 1);
    assert_eq!(receiver.registry.get(&id).unwrap().cert, CertLevel::Tracked);
}
