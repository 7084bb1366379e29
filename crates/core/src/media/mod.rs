//! H.264 over RTP codecs (RFC 6184).
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame (access unit) is split into one or more RTP
//! packets. Every RTP packet carries a 12-byte fixed header
//! ([`rtp::RtpPacket`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping) — for reordering and loss detection.
//! - **Timestamp** (32-bit) — media clock, 90 kHz for video.
//! - **SSRC** (32-bit) — identifies the sender.
//! - **Marker bit** — set on the last packet of an access unit.
//!
//! ## Building blocks
//!
//! | Module | Direction | Purpose |
//! |--------|-----------|---------|
//! | [`nal`] | both | Annex B NAL unit scanning |
//! | [`fragment`] | receive | FU-A span reassembly |
//! | [`h264`] | send | Single NAL / FU-A packetization |
//! | [`rtp`] | both | RTP wire codec and sequence allocation |
//! | [`sdp`] | send | `a=rtpmap` / `a=fmtp` attributes |
//!
//! STAP-A/B, MTAP and FU-B payloads are not supported.

pub mod fragment;
pub mod h264;
pub mod nal;
pub mod rtp;
pub mod sdp;
