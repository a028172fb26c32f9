//! WS Wire - a hand-rolled RFC 6455 protocol engine
//!
//! This crate covers the opening handshake and the base frame codec, operating
//! on plain tokio byte streams. It has no HTTP framework dependency: callers
//! take over the transport however their server allows and hand the raw
//! halves to [`read_message`] and [`write_text`].
//!
//! # Example
//!
//! ```
//! use ws_wire::{Frame, HandshakeResponse, read_message, encode_text};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let resp = HandshakeResponse::new(Some("dGhlIHNhbXBsZSBub25jZQ==")).unwrap();
//! assert_eq!(resp.accept(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
//!
//! // What a browser would send for "hi".
//! let wire = Frame::masked_text("hi", [1, 2, 3, 4]).encode();
//! let mut stream: &[u8] = &wire;
//! assert_eq!(read_message(&mut stream).await.unwrap(), "hi");
//!
//! assert_eq!(encode_text("hi"), [0x81, 0x02, b'h', b'i']);
//! # }
//! ```

mod error;
pub mod frame;
pub mod handshake;

pub use error::{Violation, WsError};
pub use frame::{
    Frame, MAX_BASE_PAYLOAD, Opcode, apply_mask, encode_text, read_frame, read_message,
    write_text,
};
pub use handshake::{HandshakeResponse, accept_key, client_key};
