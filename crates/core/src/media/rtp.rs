use crate::error::{FramingError, Result};

/// Length of the RTP fixed header (no CSRCs or extensions).
pub const FIXED_HEADER_LEN: usize = 12;

/// A single RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Only the fields the framing layer cares about are kept. CSRCs, header
/// extensions and padding are validated and skipped by [`parse`](Self::parse);
/// [`serialize`](Self::serialize) always writes a bare fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// 16-bit, wrapping.
    pub sequence: u16,
    /// Media clock, 90 kHz for H.264 video.
    pub timestamp: u32,
    /// Synchronization source identifier.
    pub ssrc: u32,
    /// 7-bit payload type (RFC 3551). H.264 conventionally uses dynamic 96.
    pub payload_type: u8,
    /// Set on the last packet of an access unit (RFC 6184 §5.1).
    pub marker: bool,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Validate and decode an RTP packet from wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let invalid = |reason| FramingError::InvalidRtpPacket { reason };

        if data.len() < FIXED_HEADER_LEN {
            return Err(invalid("too short"));
        }
        if data[0] >> 6 != 2 {
            return Err(invalid("must be version 2"));
        }
        let has_padding = data[0] & 0x20 != 0;
        let has_extension = data[0] & 0x10 != 0;
        let csrc_count = usize::from(data[0] & 0x0f);

        let mut payload_start = FIXED_HEADER_LEN + 4 * csrc_count;
        if has_extension {
            // 16-bit profile id, then 16-bit length in 32-bit words.
            if data.len() < payload_start + 4 {
                return Err(invalid("extension is after end of packet"));
            }
            let words =
                u16::from_be_bytes([data[payload_start + 2], data[payload_start + 3]]);
            payload_start += 4 + 4 * usize::from(words);
        }
        if data.len() < payload_start {
            return Err(invalid("payload start is after end of packet"));
        }

        let mut payload_end = data.len();
        if has_padding {
            if payload_end == payload_start {
                return Err(invalid("missing padding"));
            }
            let padding = usize::from(data[data.len() - 1]);
            if padding == 0 {
                return Err(invalid("invalid padding length 0"));
            }
            payload_end = payload_end
                .checked_sub(padding)
                .filter(|&end| end >= payload_start)
                .ok_or(invalid("bad padding"))?;
        }

        Ok(Self {
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            payload_type: data[1] & 0x7f,
            marker: data[1] & 0x80 != 0,
            payload: data[payload_start..payload_end].to_vec(),
        })
    }

    /// Serialize to wire bytes: a 12-byte fixed header followed by the payload.
    ///
    /// Version is always 2. Padding, extension, and CSRC count are always 0.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + self.payload.len());
        out.push(2 << 6);
        out.push(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Allocator for outgoing RTP sequence numbers.
///
/// Sequence numbers must increase monotonically across a whole stream, not
/// per frame, so the counter lives with the stream and is threaded through
/// every [`packetize`](crate::media::h264::H264Packetizer::packetize) call.
/// Wraps at `u16::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u16,
}

impl SequenceCounter {
    pub fn new(start: u16) -> Self {
        Self { next: start }
    }

    /// Start from a random value, as RFC 3550 §5.1 recommends.
    pub fn random() -> Self {
        Self::new(rand::random::<u16>())
    }

    /// The sequence number the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> u16 {
        self.next
    }

    /// Allocate one sequence number.
    pub fn next(&mut self) -> u16 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
