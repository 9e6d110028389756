//! Property-based tests for frame encoding/decoding.
//!
//! Verifies the codec round-trips arbitrary well-formed frames and rejects
//! every single-byte corruption of the header or payload.

use bytes::Bytes;
use proptest::prelude::*;
use rudp_proto::{Frame, FramingError, HEADER_LEN, PacketType};

fn arbitrary_ptype() -> impl Strategy<Value = PacketType> {
    prop_oneof![
        Just(PacketType::Data),
        Just(PacketType::Ack),
        Just(PacketType::Syn),
        Just(PacketType::Fin),
        Just(PacketType::SynAck),
    ]
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (
        arbitrary_ptype(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..2048),
    )
        .prop_map(|(ptype, seq, ack, wnd, payload)| {
            Frame::new(ptype, seq, ack, wnd, Bytes::from(payload))
        })
}

#[test]
fn prop_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        let wire = frame.encode();
        let decoded = Frame::decode(&wire).expect("decode should succeed");

        // PROPERTY: decode ∘ encode is the identity
        prop_assert_eq!(decoded, frame);
    });
}

#[test]
fn prop_encoded_size_correct() {
    proptest!(|(frame in arbitrary_frame())| {
        let wire = frame.encode();

        // PROPERTY: wire size is exactly header + payload
        prop_assert_eq!(wire.len(), HEADER_LEN + frame.payload.len());
    });
}

#[test]
fn prop_single_byte_corruption_rejected() {
    proptest!(|(frame in arbitrary_frame(), flip in any::<prop::sample::Index>())| {
        let mut wire = frame.encode().to_vec();
        let pos = flip.index(wire.len());
        wire[pos] ^= 0xFF;

        // PROPERTY: any bit damage fails validation; nothing corrupt decodes
        // back to the original frame
        match Frame::decode(&wire) {
            Ok(decoded) => prop_assert_ne!(decoded, frame),
            Err(_) => {},
        }
    });
}

#[test]
fn prop_truncation_rejected() {
    proptest!(|(frame in arbitrary_frame(), cut in 1usize..8)| {
        let wire = frame.encode();
        prop_assume!(wire.len() > cut);
        let truncated = &wire[..wire.len() - cut];

        let expected = if truncated.len() < HEADER_LEN {
            matches!(Frame::decode(truncated), Err(FramingError::ShortFrame { .. }))
        } else {
            matches!(Frame::decode(truncated), Err(FramingError::SizeMismatch { .. }))
        };
        prop_assert!(expected);
    });
}
