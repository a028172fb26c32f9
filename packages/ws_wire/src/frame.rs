//! Base framing (RFC 6455 Section 5.2), restricted to 7-bit payload lengths.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Masking-key, if MASK set   |
//! |I|S|S|S|  (4)  |A|     (7)     |                               |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------+ - - - - - - - - - - - - - - - +
//! :                     Payload Data continued ...                :
//! +---------------------------------------------------------------+
//! ```
//!
//! The RSV bits are read and ignored; no extensions are ever negotiated.
//! Length markers 126 and 127 (16/64-bit extended lengths) are rejected.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Violation, WsError};

/// Largest payload expressible in the 7-bit length field.
pub const MAX_BASE_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0b1000_0000;
const OPCODE_BITS: u8 = 0b0000_1111;
const MASK_BIT: u8 = 0b1000_0000;
const LENGTH_BITS: u8 = 0b0111_1111;

/// Frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Result<Self, Violation> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(Violation::ReservedOpcode(other)),
        }
    }

    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// The two fixed header bytes, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    fin: bool,
    opcode: Opcode,
    masked: bool,
    len: usize,
}

impl Header {
    fn parse(first: u8, second: u8) -> Result<Self, WsError> {
        let fin = first & FIN_BIT != 0;
        let raw_opcode = first & OPCODE_BITS;
        let masked = second & MASK_BIT != 0;
        let len = second & LENGTH_BITS;
        trace!(
            first,
            second,
            fin,
            opcode = raw_opcode,
            masked,
            len,
            "frame header"
        );

        let opcode = Opcode::from_u8(raw_opcode)?;
        if len as usize > MAX_BASE_PAYLOAD {
            return Err(Violation::ExtendedLength(len).into());
        }

        Ok(Self {
            fin,
            opcode,
            masked,
            len: len as usize,
        })
    }

    fn body_len(&self) -> usize {
        if self.masked { 4 + self.len } else { self.len }
    }
}

/// A single wire frame.
///
/// `payload` always holds the unmasked bytes; `mask_key` records the key the
/// payload is (or was) masked with on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask_key: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Unmasked, terminal text frame as sent by a server.
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            mask_key: None,
            payload: payload.into(),
        }
    }

    /// Masked, terminal text frame as sent by a client.
    pub fn masked_text(payload: impl Into<Vec<u8>>, key: [u8; 4]) -> Self {
        Self {
            mask_key: Some(key),
            ..Self::text(payload)
        }
    }

    pub fn masked(&self) -> bool {
        self.mask_key.is_some()
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Serialize the frame, masking the payload if a key is set.
    ///
    /// The length byte is `mask_bit | len` truncated to eight bits: payloads
    /// over 125 bytes have no base-framing representation and produce a
    /// corrupt length, but the mask bit always matches `mask_key`.
    pub fn encode(&self) -> Vec<u8> {
        let first = (if self.fin { FIN_BIT } else { 0 }) | self.opcode as u8;
        let mask_bit = if self.masked() { MASK_BIT } else { 0 };
        let second = mask_bit | self.payload.len() as u8;

        let mut out = Vec::with_capacity(2 + 4 + self.payload.len());
        out.push(first);
        out.push(second);
        match self.mask_key {
            Some(key) => {
                out.extend_from_slice(&key);
                let start = out.len();
                out.extend_from_slice(&self.payload);
                apply_mask(&mut out[start..], key);
            }
            None => out.extend_from_slice(&self.payload),
        }
        out
    }

    /// Parse one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` while `buf` does not yet hold a whole frame, and the
    /// frame plus the number of bytes it occupied once it does.
    pub fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>, WsError> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let header = Header::parse(buf[0], buf[1])?;
        let total = 2 + header.body_len();
        if buf.len() < total {
            return Ok(None);
        }

        let mut rest = &buf[2..total];
        let mask_key = if header.masked {
            let key = [rest[0], rest[1], rest[2], rest[3]];
            rest = &rest[4..];
            Some(key)
        } else {
            None
        };

        let mut payload = rest.to_vec();
        if let Some(key) = mask_key {
            apply_mask(&mut payload, key);
        }

        Ok(Some((
            Frame {
                fin: header.fin,
                opcode: header.opcode,
                mask_key,
                payload,
            },
            total,
        )))
    }

    /// Accept the frame as a chat message.
    ///
    /// Only a terminal, masked text frame with a UTF-8 payload qualifies.
    pub fn into_message(self) -> Result<String, WsError> {
        if !self.fin || self.opcode != Opcode::Text {
            return Err(Violation::UnsupportedFrame {
                fin: self.fin,
                opcode: self.opcode as u8,
            }
            .into());
        }
        if !self.masked() {
            return Err(Violation::Unmasked.into());
        }
        String::from_utf8(self.payload).map_err(|_| Violation::InvalidUtf8.into())
    }
}

/// XOR byte `i` of `payload` with `key[i % 4]`. Applying it twice is a no-op.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Read exactly one frame, blocking until it has fully arrived.
///
/// Any I/O failure, including EOF part-way through, aborts with
/// `StreamReadFailure`; nothing read so far is kept.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, WsError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    reader
        .read_exact(&mut head)
        .await
        .map_err(WsError::StreamReadFailure)?;
    let header = Header::parse(head[0], head[1])?;

    let mask_key = if header.masked {
        let mut key = [0u8; 4];
        reader
            .read_exact(&mut key)
            .await
            .map_err(WsError::StreamReadFailure)?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; header.len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(WsError::StreamReadFailure)?;
    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Frame {
        fin: header.fin,
        opcode: header.opcode,
        mask_key,
        payload,
    })
}

/// Read one client frame and accept it as a message.
pub async fn read_message<R>(reader: &mut R) -> Result<String, WsError>
where
    R: AsyncRead + Unpin,
{
    let message = read_frame(reader).await?.into_message()?;
    trace!(len = message.len(), "decoded text message");
    Ok(message)
}

/// Server-to-client text frame: `0b1000_0001`, `0 ^ len`, payload.
pub fn encode_text(text: &str) -> Vec<u8> {
    Frame::text(text.as_bytes()).encode()
}

/// Encode `text` and write the whole frame to `writer`.
///
/// A failed or short write is reported once and never retried.
pub async fn write_text<W>(writer: &mut W, text: &str) -> Result<(), WsError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_text(text);
    trace!(bytes = ?bytes, "writing text frame");
    writer
        .write_all(&bytes)
        .await
        .map_err(WsError::StreamWriteFailure)?;
    writer.flush().await.map_err(WsError::StreamWriteFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    // RFC 6455 Section 5.7 samples.
    const HELLO_UNMASKED: [u8; 7] = [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
    const HELLO_MASKED: [u8; 11] = [
        0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
    ];

    #[test]
    fn encode_matches_rfc_sample() {
        assert_eq!(encode_text("Hello"), HELLO_UNMASKED);
    }

    #[test]
    fn masked_encode_matches_rfc_sample() {
        let frame = Frame::masked_text("Hello", [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(frame.encode(), HELLO_MASKED);
    }

    #[test]
    fn parse_masked_rfc_sample() {
        let (frame, used) = Frame::parse(&HELLO_MASKED).unwrap().unwrap();
        assert_eq!(used, HELLO_MASKED.len());
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.mask_key, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(frame.payload_len(), 5);
        assert_eq!(frame.into_message().unwrap(), "Hello");
    }

    #[test]
    fn parse_incomplete_prefixes() {
        for cut in 0..HELLO_MASKED.len() {
            assert!(Frame::parse(&HELLO_MASKED[..cut]).unwrap().is_none());
        }
    }

    #[test]
    fn parse_leaves_trailing_bytes() {
        let mut buf = HELLO_MASKED.to_vec();
        buf.extend_from_slice(&HELLO_UNMASKED);
        let (_, used) = Frame::parse(&buf).unwrap().unwrap();
        let (second, _) = Frame::parse(&buf[used..]).unwrap().unwrap();
        assert_eq!(second.payload, b"Hello");
        assert!(!second.masked());
    }

    #[test]
    fn extended_lengths_rejected() {
        for marker in [126u8, 127] {
            let err = Frame::parse(&[0x81, MASK_BIT | marker]).unwrap_err();
            assert!(matches!(
                err,
                WsError::ProtocolViolation(Violation::ExtendedLength(m)) if m == marker
            ));
        }
    }

    #[test]
    fn reserved_opcode_rejected() {
        let err = Frame::parse(&[0x83, 0x80, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            WsError::ProtocolViolation(Violation::ReservedOpcode(3))
        ));
    }

    #[test]
    fn rsv_bits_ignored() {
        let mut bytes = HELLO_MASKED;
        bytes[0] |= 0b0111_0000;
        let (frame, _) = Frame::parse(&bytes).unwrap().unwrap();
        assert_eq!(frame.into_message().unwrap(), "Hello");
    }

    #[test]
    fn unmasked_client_frame_is_violation() {
        let (frame, _) = Frame::parse(&HELLO_UNMASKED).unwrap().unwrap();
        assert!(matches!(
            frame.into_message(),
            Err(WsError::ProtocolViolation(Violation::Unmasked))
        ));
    }

    #[test]
    fn non_terminal_and_non_text_frames_rejected() {
        let key = [1, 2, 3, 4];
        let mut partial = Frame::masked_text("hi", key);
        partial.fin = false;
        let mut binary = Frame::masked_text("hi", key);
        binary.opcode = Opcode::Binary;
        let mut close = Frame::masked_text("", key);
        close.opcode = Opcode::Close;

        for (frame, fin, opcode) in [(partial, false, 1u8), (binary, true, 2), (close, true, 8)] {
            let err = frame.into_message().unwrap_err();
            match err {
                WsError::ProtocolViolation(Violation::UnsupportedFrame {
                    fin: f,
                    opcode: o,
                }) => {
                    assert_eq!(f, fin);
                    assert_eq!(o, opcode);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn invalid_utf8_rejected() {
        let frame = Frame::masked_text(vec![0xff, 0xfe], [9, 9, 9, 9]);
        assert!(matches!(
            frame.into_message(),
            Err(WsError::ProtocolViolation(Violation::InvalidUtf8))
        ));
    }

    #[test]
    fn empty_payload_is_a_message() {
        let bytes = Frame::masked_text("", [1, 2, 3, 4]).encode();
        assert_eq!(bytes, [0x81, 0x80, 1, 2, 3, 4]);
        let (frame, _) = Frame::parse(&bytes).unwrap().unwrap();
        assert_eq!(frame.into_message().unwrap(), "");
    }

    #[test]
    fn oversized_length_byte_wraps() {
        let text = "x".repeat(200);
        let bytes = encode_text(&text);
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 200u8);
        assert_eq!(bytes.len(), 202);
    }

    #[test]
    fn oversized_masked_frame_keeps_mask_bit() {
        let frame = Frame::masked_text("x".repeat(200), [1, 2, 3, 4]);
        let bytes = frame.encode();
        assert_ne!(bytes[1] & MASK_BIT, 0);
        assert_eq!(bytes[1], MASK_BIT | 200u8);
        assert_eq!(bytes.len(), 2 + 4 + 200);
    }

    #[test]
    fn opcode_classification() {
        assert!(Opcode::Ping.is_control());
        assert!(!Opcode::Text.is_control());
        assert_eq!(Opcode::from_u8(0xA).unwrap(), Opcode::Pong);
        assert_eq!(Opcode::from_u8(0xB), Err(Violation::ReservedOpcode(0xB)));
    }

    #[tokio::test]
    async fn read_message_from_stream() {
        let mut input: &[u8] = &HELLO_MASKED;
        assert_eq!(read_message(&mut input).await.unwrap(), "Hello");
        assert!(input.is_empty());
    }

    #[tokio::test]
    async fn read_consecutive_frames() {
        let mut bytes = Frame::masked_text("one", [5, 6, 7, 8]).encode();
        bytes.extend(Frame::masked_text("two", [8, 7, 6, 5]).encode());
        let mut input: &[u8] = &bytes;
        assert_eq!(read_message(&mut input).await.unwrap(), "one");
        assert_eq!(read_message(&mut input).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn eof_mid_frame_is_read_failure() {
        let mut input: &[u8] = &HELLO_MASKED[..8];
        let err = read_frame(&mut input).await.unwrap_err();
        assert!(matches!(err, WsError::StreamReadFailure(_)));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn read_frame_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&Frame::masked_text("ping?", [0xde, 0xad, 0xbe, 0xef]).encode())
            .await
            .unwrap();
        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame.payload, b"ping?");
    }

    #[tokio::test]
    async fn write_text_emits_whole_frame() {
        let mut out: Vec<u8> = Vec::new();
        write_text(&mut out, "Hello").await.unwrap();
        assert_eq!(out, HELLO_UNMASKED);
    }

    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failure_reported() {
        let err = write_text(&mut BrokenWriter, "hi").await.unwrap_err();
        assert!(matches!(err, WsError::StreamWriteFailure(_)));
    }
}
