//! Annex B NAL unit scanning (ITU-T H.264 Annex B).
//!
//! An Annex B byte stream delimits NAL units with the 4-byte start code
//! `00 00 00 01`:
//!
//! ```text
//! [00 00 00 01][NAL header | payload][00 00 00 01][NAL header | payload]...
//! ```
//!
//! The NAL header's low 5 bits carry the unit type (H.264 Table 7-1):
//!
//! ```text
//! +---------------+
//! |0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+
//! |F|NRI|  Type   |
//! +---------------+
//! ```
//!
//! The scanner is shared by the receive side (single-NAL payloads and
//! reassembled FU-A spans) and the send side (splitting a frame before
//! packetization).

/// 4-byte Annex B start code.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Mask selecting the NAL unit type from the header byte.
pub const NAL_TYPE_MASK: u8 = 0x1f;

/// Mask selecting the forbidden bit and `nal_ref_idc` from the header byte.
pub const NAL_REF_MASK: u8 = 0xe0;

/// NAL unit type values used by this crate.
pub mod nal_type {
    pub const NON_IDR_SLICE: u8 = 1;
    pub const IDR_SLICE: u8 = 5;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
    pub const END_OF_SEQUENCE: u8 = 10;
    pub const END_OF_STREAM: u8 = 12;
    /// Fragmentation unit type A. Only appears on the wire (RFC 6184 §5.8).
    pub const FU_A: u8 = 28;
}

/// Returns the NAL unit type of `nal`, or `None` for an empty slice.
pub fn unit_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| b & NAL_TYPE_MASK)
}

/// Whether `ty` is a VCL (coded slice) NAL unit type.
pub fn is_vcl(ty: u8) -> bool {
    (nal_type::NON_IDR_SLICE..=nal_type::IDR_SLICE).contains(&ty)
}

/// Whether `ty` terminates an access unit on its own (end of sequence / stream).
pub fn is_end_marker(ty: u8) -> bool {
    ty == nal_type::END_OF_SEQUENCE || ty == nal_type::END_OF_STREAM
}

/// Lazy iterator over the NAL units of an Annex B buffer.
///
/// Bytes before the first start code form a unit of their own, so a
/// payload holding a bare NAL unit (no start code at all) yields that
/// unit unchanged. Zero-length units between back-to-back start codes are
/// never yielded.
#[derive(Debug, Clone)]
pub struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NalUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        while self.pos < self.data.len() {
            let rest = &self.data[self.pos..];
            match find_start_code(rest) {
                Some(0) => self.pos += START_CODE.len(),
                Some(idx) => {
                    self.pos += idx + START_CODE.len();
                    return Some(&rest[..idx]);
                }
                None => {
                    self.pos = self.data.len();
                    return Some(rest);
                }
            }
        }
        None
    }
}

/// Position of the first start code in `data`.
///
/// `windows` yields nothing for inputs shorter than the start code, so
/// short buffers can't underflow the search bound.
fn find_start_code(data: &[u8]) -> Option<usize> {
    data.windows(START_CODE.len()).position(|w| w == START_CODE)
}

/// Eagerly split an Annex B buffer into NAL unit slices.
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    NalUnits::new(data).collect()
}

/// Append `nal` to `out` prefixed with a 4-byte start code.
pub fn write_annex_b(out: &mut Vec<u8>, nal: &[u8]) {
    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(nal);
}
