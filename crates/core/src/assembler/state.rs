//! Reassembly session state machine.
//!
//! ```text
//! Uninitialized --first accepted packet--> Active
//! Active --packet--> Active            (units appended, maybe marked complete)
//! Active --take_frame--> Active        (units cleared, identity kept)
//! ```
//!
//! "Complete" is a flag on `Active`, not a state of its own. Once set it
//! stays set until the frame is taken.
//!
//! Every transition validates the whole packet before touching any field,
//! so a rejected packet leaves the session exactly as it was. Nothing here
//! logs or locks; outcomes are returned as [`Ingest`] for the caller to
//! surface.

use std::time::{Duration, Instant};

use super::{AccessUnit, StreamKey};
use crate::error::{FramingError, Result};
use crate::media::fragment::{FU_END_BIT, FU_START_BIT, FragmentReassembler};
use crate::media::nal::{self, NalUnits, nal_type};
use crate::media::rtp::RtpPacket;

/// Non-fatal continuity diagnostic: the packet was not the one expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub expected: u16,
    pub received: u16,
}

impl SequenceGap {
    /// Packets missing between the expected and received numbers, treating
    /// anything more than half the sequence space ahead as a reorder.
    pub fn lost(&self) -> Option<u16> {
        let ahead = self.received.wrapping_sub(self.expected);
        (ahead < 0x8000).then_some(ahead)
    }
}

/// Why an access unit was marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The gap since the previous packet exceeded the frame timeout.
    Timeout,
    /// The last NAL unit was end-of-sequence or end-of-stream.
    EndOfSequence,
    /// The packet carried the RTP marker bit.
    Marker,
}

/// Outcome of one accepted packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingest {
    /// Set when the sequence number did not follow the previous one.
    pub gap: Option<SequenceGap>,
    /// NAL units appended to the access unit by this packet.
    pub units_added: usize,
    /// Fragments of an abandoned FU-A span dropped by a new start bit.
    pub fragments_dropped: usize,
    /// Set when this packet made the access unit complete.
    pub completed: Option<Completion>,
}

#[derive(Debug)]
pub struct ActiveSession {
    identity: StreamKey,
    last_seq: u16,
    last_timestamp: u32,
    /// Timestamp of the last packet that contributed a unit to `nal_units`.
    au_timestamp: u32,
    nal_units: Vec<Vec<u8>>,
    complete: bool,
    last_receive: Instant,
    reassembler: FragmentReassembler,
}

impl ActiveSession {
    fn new(identity: StreamKey, packet: &RtpPacket, now: Instant) -> Self {
        Self {
            identity,
            last_seq: packet.sequence,
            last_timestamp: packet.timestamp,
            au_timestamp: packet.timestamp,
            nal_units: Vec::new(),
            complete: false,
            last_receive: now,
            reassembler: FragmentReassembler::new(),
        }
    }

    fn apply(
        &mut self,
        packet: &RtpPacket,
        plan: Plan<'_>,
        previous: Option<(u16, Instant)>,
        now: Instant,
        timeout: Duration,
    ) -> Result<Ingest> {
        let mut ingest = Ingest::default();
        if let Some((last_seq, _)) = previous {
            let expected = last_seq.wrapping_add(1);
            if packet.sequence != expected {
                ingest.gap = Some(SequenceGap {
                    expected,
                    received: packet.sequence,
                });
            }
        }
        self.last_seq = packet.sequence;
        self.last_timestamp = packet.timestamp;

        let before = self.nal_units.len();
        match plan {
            Plan::Single(payload) => {
                self.nal_units
                    .extend(NalUnits::new(payload).map(<[u8]>::to_vec));
            }
            Plan::Fragment { start, end } => {
                if start {
                    ingest.fragments_dropped = self.reassembler.begin_span(packet.sequence);
                }
                self.reassembler
                    .add_fragment(packet.sequence, &packet.payload)?;
                if end {
                    let nal = self.reassembler.close_span(packet.sequence)?;
                    self.nal_units
                        .extend(NalUnits::new(&nal).map(<[u8]>::to_vec));
                }
            }
        }
        ingest.units_added = self.nal_units.len() - before;
        if ingest.units_added > 0 {
            self.au_timestamp = packet.timestamp;
        }

        if !self.complete {
            let idle = previous.map(|(_, at)| now.saturating_duration_since(at));
            ingest.completed = self.completion(packet.marker, idle, timeout);
            self.complete = ingest.completed.is_some();
        }
        self.last_receive = now;

        Ok(ingest)
    }

    fn completion(
        &self,
        marker: bool,
        idle: Option<Duration>,
        timeout: Duration,
    ) -> Option<Completion> {
        let last = self.nal_units.last()?;
        if idle.is_some_and(|idle| idle > timeout) {
            Some(Completion::Timeout)
        } else if nal::unit_type(last).is_some_and(nal::is_end_marker) {
            Some(Completion::EndOfSequence)
        } else if marker {
            Some(Completion::Marker)
        } else {
            None
        }
    }
}

/// How a packet's payload will be applied, decided before any mutation.
enum Plan<'a> {
    Single(&'a [u8]),
    Fragment { start: bool, end: bool },
}

#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Active(ActiveSession),
}

impl SessionState {
    pub fn identity(&self) -> Option<StreamKey> {
        match self {
            Self::Uninitialized => None,
            Self::Active(s) => Some(s.identity),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Active(s) if s.complete)
    }

    /// NAL units accumulated for the access unit under construction.
    pub fn pending_units(&self) -> usize {
        match self {
            Self::Uninitialized => 0,
            Self::Active(s) => s.nal_units.len(),
        }
    }

    /// Whether an FU-A span is open.
    pub fn span_open(&self) -> bool {
        matches!(self, Self::Active(s) if s.reassembler.is_open())
    }

    pub fn last_sequence(&self) -> Option<u16> {
        match self {
            Self::Uninitialized => None,
            Self::Active(s) => Some(s.last_seq),
        }
    }

    /// RTP timestamp of the most recently accepted packet, contributing or not.
    pub fn last_timestamp(&self) -> Option<u32> {
        match self {
            Self::Uninitialized => None,
            Self::Active(s) => Some(s.last_timestamp),
        }
    }

    fn check_identity(&self, packet: &RtpPacket) -> Result<()> {
        let Self::Active(s) = self else {
            return Ok(());
        };
        if s.identity.ssrc != packet.ssrc || s.identity.payload_type != packet.payload_type {
            return Err(FramingError::IdentityMismatch {
                expected_ssrc: s.identity.ssrc,
                expected_payload_type: s.identity.payload_type,
                ssrc: packet.ssrc,
                payload_type: packet.payload_type,
            });
        }
        Ok(())
    }

    fn plan<'a>(&self, packet: &'a RtpPacket) -> Result<Plan<'a>> {
        let payload = packet.payload.as_slice();
        if nal::unit_type(payload) != Some(nal_type::FU_A) {
            return Ok(Plan::Single(payload));
        }
        let &fu_header = payload.get(1).ok_or(FramingError::InvalidFuPacket)?;
        let start = fu_header & FU_START_BIT != 0;
        let end = fu_header & FU_END_BIT != 0;
        match self {
            Self::Active(s) => s.reassembler.check_fragment(packet.sequence, payload, start)?,
            Self::Uninitialized if !start => {
                return Err(FramingError::NoOpenSpan {
                    sequence: packet.sequence,
                });
            }
            Self::Uninitialized => {}
        }
        Ok(Plan::Fragment { start, end })
    }

    /// Apply one RTP packet received at `now`.
    ///
    /// Fails with [`FramingError::IdentityMismatch`],
    /// [`FramingError::InvalidFuPacket`] or [`FramingError::NoOpenSpan`]
    /// without changing any state.
    pub fn ingest(
        &mut self,
        packet: &RtpPacket,
        now: Instant,
        timeout: Duration,
    ) -> Result<Ingest> {
        self.check_identity(packet)?;
        let plan = self.plan(packet)?;

        let previous = match self {
            Self::Active(s) => Some((s.last_seq, s.last_receive)),
            Self::Uninitialized => None,
        };
        let mut session = match std::mem::take(self) {
            Self::Active(s) => s,
            Self::Uninitialized => ActiveSession::new(StreamKey::of(packet), packet, now),
        };

        let result = session.apply(packet, plan, previous, now, timeout);
        if result.is_ok() || previous.is_some() {
            *self = Self::Active(session);
        }
        result
    }

    /// Mark a pending access unit complete if nothing arrived for longer than `timeout`.
    ///
    /// Returns whether the access unit is complete after the check.
    pub fn poll(&mut self, now: Instant, timeout: Duration) -> bool {
        let Self::Active(s) = self else {
            return false;
        };
        if !s.complete
            && !s.nal_units.is_empty()
            && now.saturating_duration_since(s.last_receive) > timeout
        {
            s.complete = true;
        }
        s.complete
    }

    /// Consume the completed access unit.
    ///
    /// Units are joined in arrival order, each behind a 4-byte start code.
    /// Identity and sequence tracking survive so the next access unit keeps
    /// the same continuity checks.
    pub fn take_frame(&mut self) -> Result<AccessUnit> {
        let s = match self {
            Self::Active(s) if s.complete => s,
            _ => return Err(FramingError::FrameNotComplete),
        };
        let len = s.nal_units.iter().map(|n| n.len() + nal::START_CODE.len()).sum();
        let mut data = Vec::with_capacity(len);
        for unit in s.nal_units.drain(..) {
            nal::write_annex_b(&mut data, &unit);
        }
        s.complete = false;
        Ok(AccessUnit {
            data,
            timestamp: s.au_timestamp,
        })
    }
}
