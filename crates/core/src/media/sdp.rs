//! SDP media attributes for an outgoing H.264 stream (RFC 6184 §8).
//!
//! ```text
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1;profile-level-id=42001e;sprop-parameter-sets=Z0IAHg==,aM44gA==
//! ```
//!
//! `profile-level-id` and `sprop-parameter-sets` are only emitted once both
//! an SPS and a PPS have been seen.

use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::h264::CLOCK_RATE;
use super::nal::{nal_type, unit_type};

/// SPS/PPS captured from an outgoing bitstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl ParameterSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sps(&self) -> Option<&[u8]> {
        self.sps.as_deref()
    }

    pub fn pps(&self) -> Option<&[u8]> {
        self.pps.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.sps.is_some() && self.pps.is_some()
    }

    /// Remember `nal` if it is the first SPS or PPS seen. Returns whether it was kept.
    pub fn observe(&mut self, nal: &[u8]) -> bool {
        let slot = match unit_type(nal) {
            Some(nal_type::SPS) => &mut self.sps,
            Some(nal_type::PPS) => &mut self.pps,
            _ => return false,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(nal.to_vec());
        true
    }

    /// profile_idc, constraint flags and level_idc: SPS bytes 1–3 as hex.
    pub fn profile_level_id(&self) -> Option<String> {
        match self.sps.as_deref() {
            Some([_, profile, constraints, level, ..]) => {
                Some(format!("{profile:02x}{constraints:02x}{level:02x}"))
            }
            _ => None,
        }
    }

    pub fn sprop_parameter_sets(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        let pps = self.pps.as_deref()?;
        Some(format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ))
    }
}

/// `a=rtpmap` and `a=fmtp` lines for payload type `pt`.
///
/// `a=rtpmap` defines the payload type and must precede `a=fmtp`.
pub fn media_attributes(pt: u8, params: &ParameterSets) -> Vec<String> {
    let mut fmtp = format!("a=fmtp:{pt} packetization-mode=1");
    if params.is_complete() {
        if let Some(pl) = params.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={pl}"));
        }
        if let Some(sprop) = params.sprop_parameter_sets() {
            fmtp.push_str(&format!(";sprop-parameter-sets={sprop}"));
        }
    }
    vec![format!("a=rtpmap:{pt} H264/{CLOCK_RATE}"), fmtp]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 4] = [0x67, 0x42, 0x00, 0x1e];
    const PPS: [u8; 4] = [0x68, 0xce, 0x38, 0x80];

    #[test]
    fn captures_first_sps_and_pps_only() {
        let mut p = ParameterSets::new();
        assert!(p.observe(&SPS));
        assert!(!p.observe(&[0x67, 0x64, 0x00, 0x28]));
        assert!(!p.observe(&[0x65, 0x88]));
        assert!(p.observe(&PPS));
        assert_eq!(p.sps(), Some(&SPS[..]));
        assert_eq!(p.pps(), Some(&PPS[..]));
    }

    #[test]
    fn attributes_without_parameter_sets() {
        let attrs = media_attributes(96, &ParameterSets::new());
        assert_eq!(attrs[0], "a=rtpmap:96 H264/90000");
        assert_eq!(attrs[1], "a=fmtp:96 packetization-mode=1");
    }

    #[test]
    fn attributes_with_parameter_sets() {
        let mut p = ParameterSets::new();
        p.observe(&SPS);
        p.observe(&PPS);
        let attrs = media_attributes(97, &p);
        assert_eq!(attrs[0], "a=rtpmap:97 H264/90000");
        assert_eq!(
            attrs[1],
            "a=fmtp:97 packetization-mode=1;profile-level-id=42001e;\
             sprop-parameter-sets=Z0IAHg==,aM44gA=="
        );
    }

    #[test]
    fn short_sps_has_no_profile() {
        let mut p = ParameterSets::new();
        p.observe(&[0x67, 0x42]);
        assert_eq!(p.profile_level_id(), None);
    }
}
