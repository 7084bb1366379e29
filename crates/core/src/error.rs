//! Error types for the H.264 RTP framing library.

/// Errors that can occur while reassembling or packetizing H.264 over RTP.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Session identity**: [`IdentityMismatch`](Self::IdentityMismatch) — a
///   packet from a different stream reached a locked session.
/// - **FU-A reassembly** (RFC 6184 §5.8): [`InvalidFuPacket`](Self::InvalidFuPacket),
///   [`FragmentTooShort`](Self::FragmentTooShort), [`NoOpenSpan`](Self::NoOpenSpan),
///   [`EmptySpan`](Self::EmptySpan).
/// - **Retrieval**: [`FrameNotComplete`](Self::FrameNotComplete).
/// - **Wire**: [`InvalidRtpPacket`](Self::InvalidRtpPacket) — RFC 3550 parse failure.
/// - **Setup**: [`InvalidConfig`](Self::InvalidConfig).
/// - **Pipeline**: [`Processing`](Self::Processing) — a frame processor rejected a frame.
///
/// In every case the offending packet is discarded and the session is left
/// as it was before the call. Nothing here is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// SSRC or payload type differs from the identity locked by the first packet.
    #[error(
        "stream identity mismatch: expected ssrc={expected_ssrc:#010X} pt={expected_payload_type}, \
         got ssrc={ssrc:#010X} pt={payload_type}"
    )]
    IdentityMismatch {
        expected_ssrc: u32,
        expected_payload_type: u8,
        ssrc: u32,
        payload_type: u8,
    },

    /// FU-A packet too short to carry the FU header byte.
    #[error("invalid FU-A packet: missing FU header")]
    InvalidFuPacket,

    /// Fragment payload lacks the 2-byte FU indicator + FU header prefix.
    #[error("FU-A fragment too short: {len} bytes")]
    FragmentTooShort { len: usize },

    /// A continuation or end fragment arrived with no span opened by a start bit.
    #[error("FU-A fragment seq={sequence} without an open span")]
    NoOpenSpan { sequence: u16 },

    /// A span was closed without any fragments in it.
    #[error("FU-A span closed with no fragments")]
    EmptySpan,

    /// Retrieval attempted before the access unit was complete.
    #[error("frame not complete")]
    FrameNotComplete,

    /// Malformed RTP packet on the wire (RFC 3550 §5.1).
    #[error("invalid RTP packet: {reason}")]
    InvalidRtpPacket { reason: &'static str },

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured frame processor failed.
    #[error("frame processing failed: {0}")]
    Processing(String),
}

/// Convenience alias for `Result<T, FramingError>`.
pub type Result<T> = std::result::Result<T, FramingError>;
