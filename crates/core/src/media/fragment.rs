//! FU-A fragment reassembly (RFC 6184 §5.8).
//!
//! A fragmented NAL unit travels as a run of FU-A packets, each carrying a
//! 2-byte prefix ahead of its slice of the original NAL payload:
//!
//! ```text
//! FU indicator:  [F|NRI|Type=28]
//! FU header:     [S|E|R|NAL_Type]
//! Fragment data: [...]
//! ```
//!
//! The run between a start-bit (S) packet and an end-bit (E) packet is a
//! *span*. [`FragmentReassembler`] holds at most one open span; opening a new
//! one drops whatever the previous span had collected.

use std::collections::HashMap;

use super::nal::{NAL_REF_MASK, NAL_TYPE_MASK};
use crate::error::{FramingError, Result};

/// FU indicator + FU header.
pub const FU_PREFIX_LEN: usize = 2;

/// FU header start bit.
pub const FU_START_BIT: u8 = 0x80;

/// FU header end bit.
pub const FU_END_BIT: u8 = 0x40;

#[derive(Debug)]
struct Span {
    start_seq: u16,
    /// Raw FU-A payloads (prefix included) keyed by RTP sequence number.
    fragments: HashMap<u16, Vec<u8>>,
}

impl Span {
    /// Distance from the span's start in circular 16-bit sequence space.
    fn offset(&self, seq: u16) -> u16 {
        seq.wrapping_sub(self.start_seq)
    }
}

/// Collects the fragments of one FU-A span and rebuilds the original NAL unit.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    span: Option<Span>,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a span is currently open.
    pub fn is_open(&self) -> bool {
        self.span.is_some()
    }

    /// Number of fragments collected in the open span.
    pub fn pending(&self) -> usize {
        self.span.as_ref().map_or(0, |s| s.fragments.len())
    }

    /// Open a new span starting at `seq`.
    ///
    /// Any span still open is discarded. Returns how many fragments were dropped.
    pub fn begin_span(&mut self, seq: u16) -> usize {
        let dropped = self.pending();
        self.span = Some(Span {
            start_seq: seq,
            fragments: HashMap::new(),
        });
        dropped
    }

    /// Check that [`add_fragment`](Self::add_fragment) would accept this fragment.
    ///
    /// `opens_span` is true when the caller is about to call
    /// [`begin_span`](Self::begin_span) for this very packet.
    pub fn check_fragment(&self, seq: u16, payload: &[u8], opens_span: bool) -> Result<()> {
        if payload.len() < FU_PREFIX_LEN {
            return Err(FramingError::FragmentTooShort { len: payload.len() });
        }
        if !opens_span && self.span.is_none() {
            return Err(FramingError::NoOpenSpan { sequence: seq });
        }
        Ok(())
    }

    /// Insert a raw FU-A payload (prefix included) into the open span.
    ///
    /// A repeated sequence number replaces the earlier payload.
    pub fn add_fragment(&mut self, seq: u16, payload: &[u8]) -> Result<()> {
        self.check_fragment(seq, payload, false)?;
        if let Some(span) = self.span.as_mut() {
            span.fragments.insert(seq, payload.to_vec());
        }
        Ok(())
    }

    /// Close the open span at end sequence `end_seq` and rebuild the NAL unit.
    ///
    /// Fragments are ordered by circular distance from the span's start
    /// sequence, so a span crossing the `u16` wrap sorts correctly. Fragments
    /// sequenced after `end_seq` are not part of this span and are ignored.
    ///
    /// The reconstructed header takes F/NRI from the first fragment's FU
    /// indicator and the type from its FU header. The span is consumed even
    /// on error.
    pub fn close_span(&mut self, end_seq: u16) -> Result<Vec<u8>> {
        let span = self
            .span
            .take()
            .ok_or(FramingError::NoOpenSpan { sequence: end_seq })?;
        let end = span.offset(end_seq);

        let mut ordered: Vec<(u16, &Vec<u8>)> = span
            .fragments
            .iter()
            .map(|(&seq, data)| (span.offset(seq), data))
            .filter(|&(offset, _)| offset <= end)
            .collect();
        ordered.sort_unstable_by_key(|&(offset, _)| offset);

        let (_, first) = ordered.first().ok_or(FramingError::EmptySpan)?;
        let header = (first[0] & NAL_REF_MASK) | (first[1] & NAL_TYPE_MASK);

        let len = ordered
            .iter()
            .map(|(_, data)| data.len() - FU_PREFIX_LEN)
            .sum::<usize>();
        let mut nal = Vec::with_capacity(1 + len);
        nal.push(header);
        for (_, data) in &ordered {
            nal.extend_from_slice(&data[FU_PREFIX_LEN..]);
        }
        Ok(nal)
    }
}
