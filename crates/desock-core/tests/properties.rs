//! Property tests for the packet channel and the connection pool.
//!
//! - Every connection receives exactly its own bytes, in order, when the
//!   decoder is driven by its readiness map
//! - Arbitrary bytes never panic the decoder, they only produce errors
//! - Pool reference counts always match the descriptors mapped to a slot

use std::collections::HashMap;

use desock_core::{encode_packets, ConnPool, Decoder, Packet, StreamBuilder};
use proptest::prelude::*;

// ============================================================================
// Strategy helpers
// ============================================================================

const MAX_CONNS: usize = 4;

fn packet_strategy() -> impl Strategy<Value = Packet> {
    (
        0..MAX_CONNS as u32,
        prop::collection::vec(any::<u8>(), 1..16),
        any::<bool>(),
    )
        .prop_map(|(conn, payload, ends_round)| Packet { conn, payload, ends_round })
}

fn arbitrary_bytes(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

#[derive(Debug, Clone)]
enum PoolOp {
    Open(i32),
    Close(i32),
    Dup(i32, i32),
}

fn pool_op_strategy() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        (0..16i32).prop_map(PoolOp::Open),
        (0..16i32).prop_map(PoolOp::Close),
        (0..16i32, 0..16i32).prop_map(|(a, b)| PoolOp::Dup(a, b)),
    ]
}

/// Drain the decoder through its readiness map; returns bytes per connection.
fn drain(decoder: &mut Decoder<Vec<u8>>, chunk: usize, max_passes: usize) -> Option<Vec<Vec<u8>>> {
    let mut received = vec![Vec::new(); decoder.max_conns()];
    let mut buf = vec![0u8; chunk];

    for _ in 0..max_passes {
        if decoder.is_end_of_stream() {
            return Some(received);
        }
        decoder.recompute_readiness().ok()?;
        if decoder.max_conns() > 1 {
            assert!(decoder.readiness().any(), "readiness empty before end of stream");
        }
        for conn in 0..decoder.max_conns() {
            if decoder.has_data(conn) {
                let n = decoder.read(conn, &mut buf).ok()?;
                received[conn].extend_from_slice(&buf[..n]);
            }
        }
    }
    None
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn per_connection_round_trip(
        packets in prop::collection::vec(packet_strategy(), 0..24),
        chunk in 1usize..32,
    ) {
        let mut expected = vec![Vec::new(); MAX_CONNS];
        for packet in &packets {
            expected[packet.conn as usize].extend_from_slice(&packet.payload);
        }

        let mut decoder = Decoder::with_channel(MAX_CONNS, encode_packets(&packets)).unwrap();
        let passes = 16 * (packets.iter().map(|p| p.payload.len()).sum::<usize>() + 8);
        let received = drain(&mut decoder, chunk, passes);

        prop_assert_eq!(received, Some(expected));
    }

    #[test]
    fn at_most_one_ready_while_data_remains(
        packets in prop::collection::vec(packet_strategy(), 1..16),
    ) {
        let mut decoder = Decoder::with_channel(MAX_CONNS, encode_packets(&packets)).unwrap();
        decoder.recompute_readiness().unwrap();

        // First packet owner is always the only ready connection
        prop_assert_eq!(decoder.readiness().count(), 1);
        prop_assert!(decoder.has_data(packets[0].conn as usize));
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in arbitrary_bytes(256), chunk in 1usize..16) {
        let mut decoder = Decoder::new(MAX_CONNS);
        if decoder.attach(data).is_ok() {
            let _ = drain(&mut decoder, chunk, 512);
        }
    }

    #[test]
    fn corrupted_stream_yields_errors_only(
        packets in prop::collection::vec(packet_strategy(), 1..8),
        position in any::<prop::sample::Index>(),
        byte in any::<u8>(),
    ) {
        let mut channel = encode_packets(&packets);
        let at = position.index(channel.len());
        channel[at] = byte;

        let mut decoder = Decoder::new(MAX_CONNS);
        if decoder.attach(channel).is_ok() {
            let _ = drain(&mut decoder, 8, 2048);
        }
    }

    #[test]
    fn pool_refcounts_match_mappings(ops in prop::collection::vec(pool_op_strategy(), 0..64)) {
        let mut pool = ConnPool::new(MAX_CONNS, 16);
        let mut model: HashMap<i32, usize> = HashMap::new();

        for op in ops {
            match op {
                PoolOp::Open(fd) => {
                    if let Ok(slot) = pool.open(fd) {
                        model.insert(fd, slot);
                    } else {
                        model.remove(&fd);
                    }
                }
                PoolOp::Close(fd) => {
                    prop_assert_eq!(pool.close(fd).unwrap(), model.remove(&fd));
                }
                PoolOp::Dup(old, new) => {
                    let result = pool.duplicate(old, new);
                    match model.get(&old).copied() {
                        Some(slot) => {
                            prop_assert_eq!(result, Ok(slot));
                            model.insert(new, slot);
                        }
                        None => prop_assert!(result.is_err()),
                    }
                }
            }

            for slot in 0..MAX_CONNS {
                let mapped = model.values().filter(|&&s| s == slot).count() as u32;
                prop_assert_eq!(pool.refcount(slot), mapped);
            }
            prop_assert_eq!(pool.any_open(), !model.is_empty());
        }
    }
}

#[test]
fn builder_and_encoder_agree() {
    let packets = vec![Packet::new(0, "a").ending_round(), Packet::new(1, "b")];
    let built = StreamBuilder::new().data(0, b"a").separator().data(1, b"b").finish();
    assert_eq!(encode_packets(&packets), built);
}
