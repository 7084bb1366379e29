//! Receive side: RTP packets back into H.264 access units.
//!
//! A [`FrameAssembler`] owns one reassembly session for one media stream.
//! Single-NAL packets contribute their NAL units directly; FU-A packets go
//! through a [`FragmentReassembler`](crate::media::fragment::FragmentReassembler)
//! span first. Once the access unit is judged complete it can be taken
//! exactly once with [`take_frame`](FrameAssembler::take_frame).
//!
//! ## Completion heuristics
//!
//! An access unit is complete when, after appending a packet's units:
//!
//! - the time since the previous packet exceeds
//!   [`AssemblerConfig::frame_timeout`], or
//! - the last NAL unit is end-of-sequence (10) or end-of-stream (12), or
//! - the packet carries the RTP marker bit (RFC 6184 §5.1).
//!
//! Closing an FU-A span only adds one NAL unit. An idle access unit is
//! only noticed on the next packet or an explicit [`poll`](FrameAssembler::poll).
//!
//! Completion is sticky: once set, later packets still join the pending
//! access unit until it is taken, and no later packet can clear the flag.
//! This differs from a point-in-time flag recomputed on every single-NAL
//! packet. The frame's timestamp is that of the last packet that added a
//! NAL unit, not of the last packet accepted.

pub mod state;

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Result;
use crate::media::nal::NalUnits;
use crate::media::rtp::RtpPacket;
pub use state::{Completion, Ingest, SequenceGap, SessionState};

/// Default time without packets after which a pending access unit is complete.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(100);

/// Identity of one RTP media stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub ssrc: u32,
    pub payload_type: u8,
}

impl StreamKey {
    pub fn new(ssrc: u32, payload_type: u8) -> Self {
        Self { ssrc, payload_type }
    }

    pub fn of(packet: &RtpPacket) -> Self {
        Self::new(packet.ssrc, packet.payload_type)
    }
}

/// A completed access unit in Annex B layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// NAL units, each behind a 4-byte start code.
    pub data: Vec<u8>,
    /// RTP timestamp of the last contributing packet.
    pub timestamp: u32,
}

impl AccessUnit {
    pub fn new(data: Vec<u8>, timestamp: u32) -> Self {
        Self { data, timestamp }
    }

    pub fn nal_units(&self) -> NalUnits<'_> {
        NalUnits::new(&self.data)
    }
}

/// Receive-side tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Gap between packets that marks the pending access unit complete.
    pub frame_timeout: Duration,
}

impl AssemblerConfig {
    pub fn with_frame_timeout(mut self, frame_timeout: Duration) -> Self {
        self.frame_timeout = frame_timeout;
        self
    }
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }
}

/// Thread-safe reassembly session for one stream.
///
/// All operations hold the session lock for their whole duration and never
/// block on I/O. Independent assemblers share nothing.
#[derive(Debug)]
pub struct FrameAssembler {
    config: AssemblerConfig,
    state: Mutex<SessionState>,
}

impl FrameAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState::Uninitialized),
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Feed one RTP packet, stamped with the current time.
    pub fn push(&self, packet: &RtpPacket) -> Result<Ingest> {
        self.push_at(packet, Instant::now())
    }

    /// Feed one RTP packet received at `now`.
    ///
    /// On error the packet is dropped and the session is unchanged.
    /// Sequence gaps are reported in the returned [`Ingest`], not as errors.
    pub fn push_at(&self, packet: &RtpPacket, now: Instant) -> Result<Ingest> {
        self.ingest(&mut self.state.lock(), packet, now)
    }

    fn ingest(
        &self,
        state: &mut SessionState,
        packet: &RtpPacket,
        now: Instant,
    ) -> Result<Ingest> {
        let ingest = match state.ingest(packet, now, self.config.frame_timeout) {
            Ok(ingest) => ingest,
            Err(e) => {
                tracing::debug!(
                    ssrc = packet.ssrc,
                    pt = packet.payload_type,
                    seq = packet.sequence,
                    error = %e,
                    "packet rejected"
                );
                return Err(e);
            }
        };

        if let Some(gap) = ingest.gap {
            tracing::warn!(
                ssrc = packet.ssrc,
                expected = gap.expected,
                received = gap.received,
                lost = ?gap.lost(),
                "RTP sequence discontinuity"
            );
        }
        if ingest.fragments_dropped > 0 {
            tracing::debug!(
                ssrc = packet.ssrc,
                seq = packet.sequence,
                dropped = ingest.fragments_dropped,
                "abandoned incomplete FU-A span"
            );
        }
        tracing::trace!(
            ssrc = packet.ssrc,
            seq = packet.sequence,
            ts = packet.timestamp,
            marker = packet.marker,
            payload_len = packet.payload.len(),
            units_added = ingest.units_added,
            pending = state.pending_units(),
            "packet accepted"
        );
        if let Some(reason) = ingest.completed {
            tracing::debug!(
                ssrc = packet.ssrc,
                ?reason,
                nal_units = state.pending_units(),
                "access unit complete"
            );
        }

        Ok(ingest)
    }

    /// Check for an idle access unit. Returns whether one is ready.
    pub fn poll(&self) -> bool {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&self, now: Instant) -> bool {
        self.state.lock().poll(now, self.config.frame_timeout)
    }

    /// Take the completed access unit.
    ///
    /// Fails with [`FramingError::FrameNotComplete`](crate::FramingError::FrameNotComplete)
    /// until a completion heuristic has fired.
    pub fn take_frame(&self) -> Result<AccessUnit> {
        let mut state = self.state.lock();
        let frame = state.take_frame()?;
        tracing::trace!(
            bytes = frame.data.len(),
            ts = frame.timestamp,
            "access unit taken"
        );
        Ok(frame)
    }

    /// Feed a packet and take the access unit if it completed.
    pub fn push_and_take(&self, packet: &RtpPacket) -> Result<Option<AccessUnit>> {
        self.push_and_take_at(packet, Instant::now())
    }

    /// [`push_and_take`](Self::push_and_take) with an explicit receive time.
    ///
    /// Ingest, the completion check and the take happen under one lock, so
    /// concurrent callers never race each other for the same frame.
    pub fn push_and_take_at(
        &self,
        packet: &RtpPacket,
        now: Instant,
    ) -> Result<Option<AccessUnit>> {
        let mut state = self.state.lock();
        self.ingest(&mut state, packet, now)?;
        if !state.is_complete() {
            return Ok(None);
        }
        state.take_frame().map(Some)
    }

    /// Poll for idleness at `now` and take the access unit if it is ready.
    pub fn poll_and_take_at(&self, now: Instant) -> Option<AccessUnit> {
        let mut state = self.state.lock();
        if !state.poll(now, self.config.frame_timeout) {
            return None;
        }
        state.take_frame().ok()
    }

    pub fn identity(&self) -> Option<StreamKey> {
        self.state.lock().identity()
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().is_complete()
    }

    pub fn pending_units(&self) -> usize {
        self.state.lock().pending_units()
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}
