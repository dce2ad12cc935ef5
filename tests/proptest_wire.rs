use proptest::prelude::*;
use sendspin::protocol::client::BinaryFrame;
use sendspin::protocol::messages::{ClientSyncOffset, ClientTime, Message};

// =============================================================================
// Envelope round-trip (§8 property 1)
// =============================================================================

proptest! {
    #[test]
    fn client_time_envelope_round_trips(client_transmitted in any::<i64>()) {
        let message = Message::ClientTime(ClientTime { client_transmitted });
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        match decoded {
            Message::ClientTime(t) => prop_assert_eq!(t.client_transmitted, client_transmitted),
            other => prop_assert!(false, "expected ClientTime, got {:?}", other),
        }
    }

    #[test]
    fn client_sync_offset_envelope_round_trips(
        player_id in "[a-zA-Z0-9-]{1,32}",
        offset_ms in -10_000.0f64..10_000.0,
        has_source in any::<bool>(),
        timestamp in any::<i64>(),
    ) {
        let source = if has_source { Some("manual".to_string()) } else { None };
        let message = Message::ClientSyncOffset(ClientSyncOffset {
            player_id: player_id.clone(),
            offset_ms,
            source: source.clone(),
            timestamp: Some(timestamp),
        });
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        match decoded {
            Message::ClientSyncOffset(m) => {
                prop_assert_eq!(m.player_id, player_id);
                prop_assert_eq!(m.offset_ms, offset_ms);
                prop_assert_eq!(m.source, source);
                prop_assert_eq!(m.timestamp, Some(timestamp));
            }
            other => prop_assert!(false, "expected ClientSyncOffset, got {:?}", other),
        }
    }
}

// =============================================================================
// Binary frame round-trip (§8 property 2)
// =============================================================================

fn encode_frame(type_id: u8, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(9 + payload.len());
    frame.push(type_id);
    frame.extend_from_slice(&timestamp.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

proptest! {
    #[test]
    fn binary_frame_round_trips_player_audio(
        timestamp in any::<i64>(),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let frame = encode_frame(0x04, timestamp, &payload);
        let parsed = BinaryFrame::from_bytes(&frame).unwrap();
        match parsed {
            BinaryFrame::Audio(chunk) => {
                prop_assert_eq!(chunk.timestamp, timestamp);
                prop_assert_eq!(&*chunk.data, payload.as_slice());
            }
            other => prop_assert!(false, "expected Audio, got {:?}", other),
        }
    }

    #[test]
    fn binary_frame_round_trips_unknown_type(
        type_id in (0u8..=255u8).prop_filter("known type byte", |t| {
            !(*t == 0x04 || (0x08..=0x0B).contains(t) || *t == 0x10)
        }),
        timestamp in any::<i64>(),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let frame = encode_frame(type_id, timestamp, &payload);
        let parsed = BinaryFrame::from_bytes(&frame).unwrap();
        match parsed {
            BinaryFrame::Unknown { type_id: parsed_type, timestamp: parsed_ts, data } => {
                prop_assert_eq!(parsed_type, type_id);
                prop_assert_eq!(parsed_ts, timestamp);
                prop_assert_eq!(data, payload);
            }
            other => prop_assert!(false, "expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn binary_frame_shorter_than_nine_bytes_fails(len in 0usize..9) {
        let frame = vec![0u8; len];
        prop_assert!(BinaryFrame::from_bytes(&frame).is_err());
    }
}
