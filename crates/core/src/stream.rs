//! Send side: one outgoing H.264 RTP stream.

use parking_lot::Mutex;

use crate::error::Result;
use crate::media::h264::{CLOCK_RATE, H264Packetizer, PacketizerConfig};
use crate::media::nal::{NalUnits, unit_type};
use crate::media::rtp::{RtpPacket, SequenceCounter};
use crate::media::sdp::{self, ParameterSets};

#[derive(Debug)]
struct StreamState {
    seq: SequenceCounter,
    params: ParameterSets,
    frames: u64,
    packets: u64,
}

/// An outgoing stream: a stateless [`H264Packetizer`] plus the state that
/// must persist across frames.
///
/// The sequence counter lives here, so numbering is monotonic for the life
/// of the stream. The first SPS and PPS sent are remembered for
/// [`sdp_attributes`](Self::sdp_attributes). Calls from several threads are
/// serialized on an internal lock, which keeps sequence allocation
/// contiguous per frame.
#[derive(Debug)]
pub struct OutboundStream {
    packetizer: H264Packetizer,
    state: Mutex<StreamState>,
}

impl OutboundStream {
    /// Create a stream whose sequence numbers start at a random value.
    pub fn new(config: PacketizerConfig) -> Result<Self> {
        Self::with_sequence(config, SequenceCounter::random())
    }

    pub fn with_sequence(config: PacketizerConfig, seq: SequenceCounter) -> Result<Self> {
        Ok(Self {
            packetizer: H264Packetizer::new(config)?,
            state: Mutex::new(StreamState {
                seq,
                params: ParameterSets::new(),
                frames: 0,
                packets: 0,
            }),
        })
    }

    pub fn packetizer(&self) -> &H264Packetizer {
        &self.packetizer
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    pub fn payload_type(&self) -> u8 {
        self.packetizer.payload_type()
    }

    pub fn clock_rate(&self) -> u32 {
        CLOCK_RATE
    }

    /// Sequence number the next packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.state.lock().seq.peek()
    }

    /// Packetize one Annex B access unit stamped with `timestamp`.
    pub fn send_frame(&self, frame: &[u8], timestamp: u32) -> Vec<RtpPacket> {
        let mut state = self.state.lock();

        if !state.params.is_complete() {
            for nal in NalUnits::new(frame) {
                if state.params.observe(nal) {
                    tracing::debug!(
                        ssrc = self.ssrc(),
                        nal_type = ?unit_type(nal),
                        bytes = nal.len(),
                        "parameter set captured from bitstream"
                    );
                }
            }
        }

        let packets = self.packetizer.packetize(frame, timestamp, &mut state.seq);
        state.frames += 1;
        state.packets += packets.len() as u64;
        packets
    }

    /// `a=rtpmap` / `a=fmtp` lines describing this stream.
    pub fn sdp_attributes(&self) -> Vec<String> {
        sdp::media_attributes(self.payload_type(), &self.state.lock().params)
    }

    /// Frames and packets sent so far.
    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.frames, state.packets)
    }
}
