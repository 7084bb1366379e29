//! H.264 framing for RTP (RFC 3550 / RFC 6184).
//!
//! Send side: [`OutboundStream`] / [`H264Packetizer`] split Annex B access
//! units into Single NAL and FU-A packets. Receive side: [`FrameAssembler`]
//! rebuilds access units from those packets, one session per stream, with
//! [`SessionRegistry`] routing packets of many streams. [`Relay`] chains
//! both around a [`FrameProcessor`].

pub mod assembler;
pub mod error;
pub mod media;
pub mod processing;
pub mod relay;
pub mod session;
pub mod stream;

pub use assembler::{AccessUnit, AssemblerConfig, FrameAssembler, StreamKey};
pub use error::{FramingError, Result};
pub use media::h264::{H264Packetizer, PacketizerConfig};
pub use media::rtp::{RtpPacket, SequenceCounter};
pub use processing::{FrameProcessor, Passthrough};
pub use relay::Relay;
pub use session::SessionRegistry;
pub use stream::OutboundStream;
