//! End-to-end association scenarios over the simulated loopback medium.

use swen_config::SwenConfig;
use swen_core::events::{EventId, Ready};
use swen_l3::proto::{self, Op};
use swen_l3::xtea::Xtea;
use swen_l3::{AssocState, L3Error, Node};
use swen_link::frame;
use swen_sim::{DropAll, DropNth, NoLoss, NodePair};

const ADDR_A: u8 = 0x01;
const ADDR_B: u8 = 0x02;

#[derive(Default)]
struct TestApp {
    events: Vec<(u8, Ready)>,
    received: Vec<Vec<u8>>,
}

/// Records every readiness event and consumes delivered payloads. Clears
/// one-shot masks so the dispatch loop terminates.
fn recorder(node: &mut Node<TestApp>, id: EventId, ready: Ready) {
    let peer = node.peer_of(id);
    node.app.events.push((peer, ready));
    if ready.contains(Ready::READ) {
        if let Some(payload) = node.get_packet(peer) {
            node.app.received.push(payload.to_vec());
        }
    }
    if ready.contains(Ready::WRITE) {
        let _ = node.clear_event_mask(peer, Ready::WRITE);
    }
}

fn pair(cfg: &SwenConfig) -> NodePair<TestApp, TestApp> {
    pair_with_loss(cfg, Box::new(NoLoss), Box::new(NoLoss))
}

fn pair_with_loss(
    cfg: &SwenConfig,
    loss_a: Box<dyn swen_sim::LossModel>,
    loss_b: Box<dyn swen_sim::LossModel>,
) -> NodePair<TestApp, TestApp> {
    swen_telemetry::init_logging();
    let mut pair = NodePair::build(
        cfg,
        (ADDR_A, TestApp::default(), loss_a),
        (ADDR_B, TestApp::default(), loss_b),
    )
    .expect("default config builds");

    let all = Ready::READ | Ready::WRITE | Ready::ERROR | Ready::HANGUP;
    pair.a.bind(0, ADDR_B, recorder).unwrap();
    pair.a.set_event_mask(ADDR_B, all).unwrap();
    pair.b.bind(0, ADDR_A, recorder).unwrap();
    pair.b.set_event_mask(ADDR_A, all).unwrap();
    pair
}

fn connect(pair: &mut NodePair<TestApp, TestApp>) {
    pair.a.associate(ADDR_B).unwrap();
    pair.settle();
    assert_eq!(pair.a.assoc_state(ADDR_B), Some(AssocState::Connected));
    assert_eq!(pair.b.assoc_state(ADDR_A), Some(AssocState::Connected));
}

fn l3_hdr(frame_bytes: &[u8]) -> proto::L3Hdr {
    proto::parse_hdr(&frame_bytes[frame::HDR_LEN..]).unwrap()
}

#[test]
fn handshake_is_exactly_four_frames() {
    let mut pair = pair(&SwenConfig::default());
    connect(&mut pair);

    let trace = pair.link.trace();
    assert_eq!(trace.len(), 4);
    assert_eq!(
        trace.iter().map(|e| e.sender).collect::<Vec<_>>(),
        vec!['a', 'b', 'a', 'b']
    );

    let ops: Vec<_> = trace.iter().map(|e| l3_hdr(&e.frame)).collect();
    assert_eq!(ops[0].op, Op::AssocSyn);
    assert_eq!((ops[0].seq, ops[0].ack), (0, 0));
    assert_eq!(ops[1].op, Op::AssocSynAck);
    assert_eq!((ops[1].seq, ops[1].ack), (0, 0));
    assert_eq!(ops[2].op, Op::AssocComplete);
    assert_eq!((ops[2].seq, ops[2].ack), (1, 1));
    assert_eq!(ops[3].op, Op::Ack);
    assert_eq!((ops[3].seq, ops[3].ack), (0, 1));

    // The opening syn is a fixed byte sequence.
    assert_eq!(
        trace[0].frame,
        vec![0x02, 0x01, 0x01, 0xFC, 0xFD, 0x01, 0x00, 0x00]
    );

    // Both sides were told they can write.
    assert!(pair.a.app.events.iter().any(|(p, r)| *p == ADDR_B && r.contains(Ready::WRITE)));
    assert!(pair.b.app.events.iter().any(|(p, r)| *p == ADDR_A && r.contains(Ready::WRITE)));

    // Nothing left in flight.
    assert_eq!(pair.a.pool.in_use(), 0);
    assert_eq!(pair.b.pool.in_use(), 0);
}

#[test]
fn encrypted_handshake_uses_sealed_envelopes() {
    let mut cfg = SwenConfig::default();
    cfg.l3.key = Some("000102030405060708090a0b0c0d0e0f".into());
    let mut pair = pair(&cfg);
    connect(&mut pair);

    let key = cfg.l3.key_bytes().unwrap().unwrap();
    let cipher = Xtea::new(&key);
    let trace = pair.link.trace();
    assert_eq!(trace.len(), 4);
    let mut ops = Vec::new();
    for entry in &trace {
        // One cipher block: {len, hdr, zero padding}.
        let payload = &entry.frame[frame::HDR_LEN..];
        assert_eq!(payload.len(), 8);
        let mut envelope = payload.to_vec();
        let (hdr, inner) = proto::open_envelope(&cipher, &mut envelope).unwrap();
        assert!(inner.is_empty());
        ops.push(hdr.op);
        // The wire bytes are ciphertext, not the sealed plaintext.
        assert_ne!(envelope, payload);
    }
    assert_eq!(
        ops,
        vec![Op::AssocSyn, Op::AssocSynAck, Op::AssocComplete, Op::Ack]
    );
}

#[test]
fn dropped_complete_is_retransmitted_byte_identically() {
    // Second frame out of node A is the assoc-complete.
    let mut pair = pair_with_loss(
        &SwenConfig::default(),
        Box::new(DropNth::new(2)),
        Box::new(NoLoss),
    );
    pair.a.associate(ADDR_B).unwrap();
    pair.settle();
    assert_eq!(pair.a.assoc_state(ADDR_B), Some(AssocState::ConnComplete));
    assert_eq!(pair.b.assoc_state(ADDR_A), Some(AssocState::Connecting));

    // Let the retry timer fire (first interval is not jittered for
    // in-handshake retransmissions).
    pair.advance(SwenConfig::default().l3.retry_interval_ticks);
    assert_eq!(pair.a.assoc_state(ADDR_B), Some(AssocState::Connected));
    assert_eq!(pair.b.assoc_state(ADDR_A), Some(AssocState::Connected));

    let a_frames: Vec<_> = pair
        .link
        .trace()
        .into_iter()
        .filter(|e| e.sender == 'a')
        .collect();
    // Syn, dropped complete, resent complete.
    assert_eq!(a_frames.len(), 3);
    assert!(a_frames[1].dropped);
    assert!(!a_frames[2].dropped);
    assert_eq!(a_frames[1].frame, a_frames[2].frame);
}

#[test]
fn data_roundtrip_delivers_and_acks() {
    let mut pair = pair(&SwenConfig::default());
    connect(&mut pair);

    pair.a.send(ADDR_B, b"temp:21.5").unwrap();
    pair.settle();

    assert_eq!(pair.b.app.received, vec![b"temp:21.5".to_vec()]);
    assert!(pair
        .b
        .app
        .events
        .iter()
        .any(|(p, r)| *p == ADDR_A && r.contains(Ready::READ)));
    // Ack retired the transmission; no buffers remain in flight.
    assert_eq!(pair.a.pool.in_use(), 0);
    assert_eq!(pair.b.pool.in_use(), 0);
}

#[test]
fn duplicate_data_is_reacked_not_redelivered() {
    // Third frame out of node B is the ack for the first data frame.
    let mut pair = pair_with_loss(
        &SwenConfig::default(),
        Box::new(NoLoss),
        Box::new(DropNth::new(3)),
    );
    connect(&mut pair);

    pair.a.send(ADDR_B, b"ping").unwrap();
    pair.settle();
    // Delivered, but the ack was eaten; the sender still holds the packet.
    assert_eq!(pair.b.app.received, vec![b"ping".to_vec()]);
    assert_eq!(pair.a.pool.in_use(), 1);

    pair.advance(SwenConfig::default().l3.retry_interval_ticks);
    // The duplicate was re-acked, not delivered twice.
    assert_eq!(pair.b.app.received, vec![b"ping".to_vec()]);
    assert_eq!(pair.a.pool.in_use(), 0);
}

#[test]
fn teardown_closes_both_sides() {
    let mut pair = pair(&SwenConfig::default());
    connect(&mut pair);
    pair.a.send(ADDR_B, b"bye").unwrap();
    pair.settle();

    pair.a.disassociate(ADDR_B).unwrap();
    pair.settle();

    assert_eq!(pair.a.assoc_state(ADDR_B), Some(AssocState::Closed));
    assert_eq!(pair.b.assoc_state(ADDR_A), Some(AssocState::Closed));
    assert!(pair.a.app.events.iter().any(|(_, r)| r.contains(Ready::HANGUP)));
    assert!(pair.b.app.events.iter().any(|(_, r)| r.contains(Ready::HANGUP)));
    assert_eq!(pair.a.send(ADDR_B, b"more"), Err(L3Error::NotConnected));
    assert_eq!(pair.a.pool.in_use(), 0);
    assert_eq!(pair.b.pool.in_use(), 0);
    assert!(pair.a.idle());
    assert!(pair.b.idle());
}

#[test]
fn binding_reconnects_after_teardown() {
    let mut pair = pair(&SwenConfig::default());
    connect(&mut pair);
    pair.a.disassociate(ADDR_B).unwrap();
    pair.settle();
    assert_eq!(pair.a.assoc_state(ADDR_B), Some(AssocState::Closed));
    assert_eq!(pair.b.assoc_state(ADDR_A), Some(AssocState::Closed));

    // The binding survives; a fresh handshake must not be mistaken for a
    // replay of the previous connection's frames.
    connect(&mut pair);
    assert!(!pair
        .a
        .app
        .events
        .iter()
        .any(|(_, r)| r.contains(Ready::ERROR)));

    pair.a.send(ADDR_B, b"again").unwrap();
    pair.settle();
    assert_eq!(pair.b.app.received, vec![b"again".to_vec()]);
    assert_eq!(pair.a.pool.in_use(), 0);
    assert_eq!(pair.b.pool.in_use(), 0);
}

#[test]
fn retry_exhaustion_raises_error_and_restarts() {
    let mut cfg = SwenConfig::default();
    cfg.l3.retry_max = 3;
    let mut pair = pair_with_loss(&cfg, Box::new(DropAll), Box::new(NoLoss));
    pair.a.associate(ADDR_B).unwrap();

    // First retry lands within ten jittered intervals, then one per
    // interval; the budget is gone well inside 150 ticks.
    pair.advance(150);

    assert!(pair
        .a
        .app
        .events
        .iter()
        .any(|(p, r)| *p == ADDR_B && r.contains(Ready::ERROR)));
    // The association restarted itself and keeps trying.
    assert_eq!(pair.a.assoc_state(ADDR_B), Some(AssocState::Connecting));
    assert_eq!(pair.b.assoc_state(ADDR_A), Some(AssocState::Closed));
}

#[test]
fn pool_exhaustion_parks_writer_until_acks_free_packets() {
    let mut cfg = SwenConfig::default();
    cfg.core.pool_packets = 2;
    let mut pair = pair(&cfg);
    connect(&mut pair);

    pair.a.send(ADDR_B, b"one").unwrap();
    pair.a.send(ADDR_B, b"two").unwrap();
    assert_eq!(pair.a.send(ADDR_B, b"three"), Err(L3Error::PoolExhausted));

    // Park on write readiness and let the acks come back.
    let all = Ready::READ | Ready::WRITE | Ready::ERROR | Ready::HANGUP;
    pair.a.set_event_mask(ADDR_B, all).unwrap();
    pair.a.app.events.clear();
    pair.settle();

    assert!(pair
        .a
        .app
        .events
        .iter()
        .any(|(p, r)| *p == ADDR_B && r.contains(Ready::WRITE)));
    pair.a.send(ADDR_B, b"three").unwrap();
    pair.settle();
    assert_eq!(
        pair.b.app.received,
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
    );
}
