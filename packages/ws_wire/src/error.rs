use std::fmt;
use std::io;

/// Errors raised while negotiating or speaking the WebSocket protocol.
///
/// Everything except the two handshake variants is local to a single
/// connection: the owner of the stream drops it and nobody else is told.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("missing Sec-WebSocket-Key header")]
    MissingHandshakeKey,

    #[error("transport does not support raw upgrade")]
    UpgradeUnsupported,

    #[error("protocol violation: {0}")]
    ProtocolViolation(Violation),

    #[error("stream read failed: {0}")]
    StreamReadFailure(#[source] io::Error),

    #[error("stream write failed: {0}")]
    StreamWriteFailure(#[source] io::Error),
}

impl WsError {
    /// Stable snake_case code used in logs and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingHandshakeKey => "missing_handshake_key",
            Self::UpgradeUnsupported => "upgrade_unsupported",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::StreamReadFailure(_) => "stream_read_failure",
            Self::StreamWriteFailure(_) => "stream_write_failure",
        }
    }

    /// True for failures caused by the peer before any upgrade took place.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingHandshakeKey)
    }

    /// True when the peer simply went away (EOF before a frame started, reset).
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::StreamReadFailure(e) | Self::StreamWriteFailure(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<Violation> for WsError {
    fn from(v: Violation) -> Self {
        WsError::ProtocolViolation(v)
    }
}

/// What exactly a peer did wrong on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Length marker 126 or 127; extended lengths are not supported.
    ExtendedLength(u8),
    /// Opcode in one of the reserved ranges.
    ReservedOpcode(u8),
    /// Client frame without the mask bit.
    Unmasked,
    /// Anything other than a single terminal text frame.
    UnsupportedFrame { fin: bool, opcode: u8 },
    /// Text payload is not UTF-8.
    InvalidUtf8,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ExtendedLength(marker) => {
                write!(f, "extended payload length marker {} not supported", marker)
            }
            Violation::ReservedOpcode(op) => write!(f, "reserved opcode {:#x}", op),
            Violation::Unmasked => write!(f, "client frame is not masked"),
            Violation::UnsupportedFrame { fin, opcode } => {
                write!(f, "unsupported frame (fin: {}, opcode: {:#x})", fin, opcode)
            }
            Violation::InvalidUtf8 => write!(f, "text payload is not valid UTF-8"),
        }
    }
}
