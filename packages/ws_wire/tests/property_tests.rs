use proptest::prelude::*;

use ws_wire::{Frame, MAX_BASE_PAYLOAD, Opcode, WsError, accept_key, apply_mask, encode_text};

fn arb_key() -> impl Strategy<Value = [u8; 4]> {
    any::<[u8; 4]>()
}

/// Strings whose UTF-8 encoding fits a base-length frame.
fn arb_text() -> impl Strategy<Value = String> {
    ".{0,40}".prop_filter("fits in 125 bytes", |s| s.len() <= MAX_BASE_PAYLOAD)
}

fn arb_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Continuation),
        Just(Opcode::Text),
        Just(Opcode::Binary),
        Just(Opcode::Close),
        Just(Opcode::Ping),
        Just(Opcode::Pong),
    ]
}

// --- Masking ---

proptest! {
    #[test]
    fn mask_is_involution(
        payload in proptest::collection::vec(any::<u8>(), 0..=MAX_BASE_PAYLOAD),
        key in arb_key(),
    ) {
        let mut buf = payload.clone();
        apply_mask(&mut buf, key);
        apply_mask(&mut buf, key);
        prop_assert_eq!(buf, payload);
    }

    #[test]
    fn zero_key_is_identity(payload in proptest::collection::vec(any::<u8>(), 0..=MAX_BASE_PAYLOAD)) {
        let mut buf = payload.clone();
        apply_mask(&mut buf, [0; 4]);
        prop_assert_eq!(buf, payload);
    }
}

// --- Codec round-trips ---

proptest! {
    #[test]
    fn client_frame_roundtrip(text in arb_text(), key in arb_key()) {
        let wire = Frame::masked_text(text.as_bytes(), key).encode();
        let (frame, used) = Frame::parse(&wire).unwrap().unwrap();
        prop_assert_eq!(used, wire.len());
        prop_assert_eq!(frame.into_message().unwrap(), text);
    }

    #[test]
    fn server_frame_reparsed_by_client(text in arb_text()) {
        let wire = encode_text(&text);
        prop_assert_eq!(wire[0], 0b1000_0001);
        prop_assert_eq!(wire[1] as usize, text.len());
        let (frame, _) = Frame::parse(&wire).unwrap().unwrap();
        prop_assert!(!frame.masked());
        prop_assert_eq!(frame.payload, text.into_bytes());
    }

    #[test]
    fn only_terminal_text_is_a_message(
        opcode in arb_opcode(),
        fin in any::<bool>(),
        key in arb_key(),
    ) {
        let frame = Frame { fin, opcode, mask_key: Some(key), payload: b"x".to_vec() };
        let wire = frame.encode();
        let (parsed, _) = Frame::parse(&wire).unwrap().unwrap();
        let accepted = parsed.into_message().is_ok();
        prop_assert_eq!(accepted, fin && opcode == Opcode::Text);
    }

    #[test]
    fn parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..200)) {
        match Frame::parse(&bytes) {
            Ok(Some((_, used))) => prop_assert!(used <= bytes.len()),
            Ok(None) => {}
            Err(e) => prop_assert!(matches!(e, WsError::ProtocolViolation(_))),
        }
    }

    #[test]
    fn accept_key_is_28_chars(key in "[A-Za-z0-9+/]{22}==") {
        prop_assert_eq!(accept_key(&key).len(), 28);
    }
}

// --- Boundary lengths ---

#[test]
fn roundtrip_boundary_lengths() {
    for len in [0usize, 1, MAX_BASE_PAYLOAD] {
        let text = "a".repeat(len);
        let key = [0x11, 0x22, 0x33, 0x44];

        let server = encode_text(&text);
        assert_eq!(server.len(), 2 + len);
        let (frame, _) = Frame::parse(&server).unwrap().unwrap();
        assert_eq!(frame.payload, text.as_bytes());

        // A client echoing it back masks it first.
        let client = Frame::masked_text(frame.payload, key).encode();
        let (frame, _) = Frame::parse(&client).unwrap().unwrap();
        assert_eq!(frame.into_message().unwrap(), text);
    }
}
