use super::fragment::{FU_END_BIT, FU_PREFIX_LEN, FU_START_BIT};
use super::nal::{NAL_REF_MASK, NAL_TYPE_MASK, NalUnits, nal_type};
use super::rtp::{RtpPacket, SequenceCounter};
use crate::error::{FramingError, Result};

/// Default maximum RTP payload size, leaving room for IP/UDP/RTP headers
/// inside a typical 1500-byte MTU.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1200;

/// Dynamic payload type conventionally used for H.264.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// 90 kHz clock rate per RFC 6184 §8.1.
pub const CLOCK_RATE: u32 = 90_000;

/// Smallest payload size that still fits an FU-A prefix plus one data byte.
const MIN_PAYLOAD_SIZE: usize = FU_PREFIX_LEN + 1;

/// Fixed parameters of an outgoing H.264 RTP stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketizerConfig {
    /// Synchronization source written into every packet.
    pub ssrc: u32,
    /// RTP payload type (7-bit).
    pub payload_type: u8,
    /// Largest RTP payload, in bytes. NAL units above this are FU-A fragmented.
    pub max_payload_size: usize,
}

impl PacketizerConfig {
    pub fn new(ssrc: u32, payload_type: u8) -> Self {
        Self {
            ssrc,
            payload_type,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(payload_type: u8) -> Self {
        Self::new(rand::random::<u32>(), payload_type)
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size < MIN_PAYLOAD_SIZE {
            return Err(FramingError::InvalidConfig(format!(
                "max_payload_size {} is below the FU-A minimum of {MIN_PAYLOAD_SIZE}",
                self.max_payload_size
            )));
        }
        if self.payload_type > 0x7f {
            return Err(FramingError::InvalidConfig(format!(
                "payload type {} does not fit in 7 bits",
                self.payload_type
            )));
        }
        Ok(())
    }
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self::with_random_ssrc(DEFAULT_PAYLOAD_TYPE)
    }
}

/// H.264 RTP packetizer (RFC 6184).
///
/// Converts H.264 Annex B access units into RTP packets. Supports two
/// packetization modes from RFC 6184:
///
/// - **Single NAL Unit** (§5.6): NALs that fit within the maximum payload
///   size are sent as-is in a single RTP packet.
///
/// - **FU-A Fragmentation** (§5.8): larger NALs are split across
///   `ceil((len - 1) / (max - 2))` packets. The NAL header byte is folded
///   into the FU indicator/header pair and not repeated in the data:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to max - 2 bytes)
///   ```
///
/// ## Marker bit
///
/// Per RFC 6184 §5.1, the RTP marker bit is set on exactly one packet per
/// frame: the last packet of the last NAL unit.
///
/// ## Sequence numbers
///
/// The packetizer holds no per-stream state. The caller passes the stream's
/// [`SequenceCounter`] so numbering continues across frames; see
/// [`OutboundStream`](crate::stream::OutboundStream) for an owner that
/// serializes access to it.
#[derive(Debug, Clone)]
pub struct H264Packetizer {
    config: PacketizerConfig,
}

impl H264Packetizer {
    pub fn new(config: PacketizerConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            pt = config.payload_type,
            ssrc = format_args!("{:#010X}", config.ssrc),
            max_payload_size = config.max_payload_size,
            "H.264 packetizer created"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &PacketizerConfig {
        &self.config
    }

    pub fn ssrc(&self) -> u32 {
        self.config.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.config.payload_type
    }

    /// Number of RTP packets a NAL unit of `nal_len` bytes occupies.
    pub fn packet_count(&self, nal_len: usize) -> usize {
        let max = self.config.max_payload_size;
        if nal_len == 0 {
            0
        } else if nal_len <= max {
            1
        } else {
            (nal_len - 1).div_ceil(max - FU_PREFIX_LEN)
        }
    }

    /// Packetize one Annex B access unit stamped with `timestamp`.
    ///
    /// Sequence numbers are drawn from `seq` contiguously, in output order.
    /// An empty frame produces no packets.
    pub fn packetize(
        &self,
        frame: &[u8],
        timestamp: u32,
        seq: &mut SequenceCounter,
    ) -> Vec<RtpPacket> {
        let nal_units: Vec<&[u8]> = NalUnits::new(frame).collect();
        let mut packets = Vec::with_capacity(
            nal_units.iter().map(|nal| self.packet_count(nal.len())).sum(),
        );

        for (i, nal) in nal_units.iter().enumerate() {
            let is_last = i + 1 == nal_units.len();
            self.packetize_nal(nal, is_last, timestamp, seq, &mut packets);
        }

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = packets.len(),
            frame_bytes = frame.len(),
            next_seq = seq.peek(),
            ts = timestamp,
            "frame packetized"
        );

        packets
    }

    fn packet(
        &self,
        seq: &mut SequenceCounter,
        timestamp: u32,
        marker: bool,
        payload: Vec<u8>,
    ) -> RtpPacket {
        RtpPacket {
            sequence: seq.next(),
            timestamp,
            ssrc: self.config.ssrc,
            payload_type: self.config.payload_type,
            marker,
            payload,
        }
    }

    /// Packetize a single NAL unit into one or more RTP packets.
    fn packetize_nal(
        &self,
        nal_unit: &[u8],
        is_last_nal: bool,
        timestamp: u32,
        seq: &mut SequenceCounter,
        packets: &mut Vec<RtpPacket>,
    ) {
        let Some(&nal_header) = nal_unit.first() else {
            return;
        };

        if nal_unit.len() <= self.config.max_payload_size {
            // Single NAL Unit mode (RFC 6184 §5.6)
            packets.push(self.packet(seq, timestamp, is_last_nal, nal_unit.to_vec()));
            return;
        }

        // FU-A fragmentation (RFC 6184 §5.8)
        let original_type = nal_header & NAL_TYPE_MASK;
        let fu_indicator = (nal_header & NAL_REF_MASK) | nal_type::FU_A;
        let data = &nal_unit[1..];
        let chunks = data.chunks(self.config.max_payload_size - FU_PREFIX_LEN);
        let count = chunks.len();

        for (i, chunk) in chunks.enumerate() {
            let first = i == 0;
            let last = i + 1 == count;

            let mut fu_header = original_type;
            if first {
                fu_header |= FU_START_BIT;
            }
            if last {
                fu_header |= FU_END_BIT;
            }

            let mut payload = Vec::with_capacity(FU_PREFIX_LEN + chunk.len());
            payload.push(fu_indicator);
            payload.push(fu_header);
            payload.extend_from_slice(chunk);
            packets.push(self.packet(seq, timestamp, is_last_nal && last, payload));
        }

        tracing::trace!(
            nal_type = original_type,
            nal_size = nal_unit.len(),
            fragments = count,
            "FU-A fragmented NAL unit"
        );
    }
}
