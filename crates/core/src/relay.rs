//! Receive, process and re-send one H.264 track.
//!
//! ```text
//! RTP in ──▶ FrameAssembler ──▶ FrameProcessor ──▶ OutboundStream ──▶ RTP out
//! ```
//!
//! Outgoing packets carry the timestamp of the access unit they came from,
//! and their own SSRC / sequence space.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::assembler::{AccessUnit, FrameAssembler};
use crate::error::{FramingError, Result};
use crate::media::rtp::RtpPacket;
use crate::processing::{FrameProcessor, Passthrough};
use crate::stream::OutboundStream;

pub struct Relay {
    assembler: Arc<FrameAssembler>,
    processor: Mutex<Box<dyn FrameProcessor>>,
    outbound: OutboundStream,
}

impl Relay {
    pub fn new(
        assembler: Arc<FrameAssembler>,
        processor: Box<dyn FrameProcessor>,
        outbound: OutboundStream,
    ) -> Self {
        Self {
            assembler,
            processor: Mutex::new(processor),
            outbound,
        }
    }

    /// Relay that forwards frames unchanged.
    pub fn passthrough(assembler: Arc<FrameAssembler>, outbound: OutboundStream) -> Self {
        Self::new(assembler, Box::new(Passthrough), outbound)
    }

    pub fn assembler(&self) -> &Arc<FrameAssembler> {
        &self.assembler
    }

    pub fn outbound(&self) -> &OutboundStream {
        &self.outbound
    }

    /// Feed one inbound packet. Returns the outgoing packets of the access
    /// unit it completed, or nothing while the unit is still pending.
    pub fn push(&self, packet: &RtpPacket) -> Result<Vec<RtpPacket>> {
        self.push_at(packet, Instant::now())
    }

    pub fn push_at(&self, packet: &RtpPacket, now: Instant) -> Result<Vec<RtpPacket>> {
        match self.assembler.push_and_take_at(packet, now)? {
            Some(frame) => self.forward(frame),
            None => Ok(Vec::new()),
        }
    }

    /// Flush an access unit that went idle. See [`FrameAssembler::poll`].
    pub fn poll_at(&self, now: Instant) -> Result<Vec<RtpPacket>> {
        match self.assembler.poll_and_take_at(now) {
            Some(frame) => self.forward(frame),
            None => Ok(Vec::new()),
        }
    }

    pub fn poll(&self) -> Result<Vec<RtpPacket>> {
        self.poll_at(Instant::now())
    }

    fn forward(&self, frame: AccessUnit) -> Result<Vec<RtpPacket>> {
        let frame = self.process(frame)?;
        Ok(self.outbound.send_frame(&frame.data, frame.timestamp))
    }

    fn process(&self, frame: AccessUnit) -> Result<AccessUnit> {
        let mut processor = self.processor.lock();
        let name = processor.name();
        let timestamp = frame.timestamp;
        processor.process(frame).map_err(|e| {
            tracing::warn!(processor = name, ts = timestamp, error = %e, "frame dropped");
            match e {
                FramingError::Processing(_) => e,
                other => FramingError::Processing(other.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::h264::PacketizerConfig;
    use crate::media::rtp::SequenceCounter;

    fn inbound(seq: u16, marker: bool, payload: &[u8]) -> RtpPacket {
        RtpPacket {
            sequence: seq,
            timestamp: 9000,
            ssrc: 1000,
            payload_type: 96,
            marker,
            payload: payload.to_vec(),
        }
    }

    fn outbound() -> OutboundStream {
        OutboundStream::with_sequence(PacketizerConfig::new(2000, 97), SequenceCounter::new(10))
            .unwrap()
    }

    #[test]
    fn forwards_completed_frame_with_its_timestamp() {
        let relay = Relay::passthrough(Arc::new(FrameAssembler::default()), outbound());
        assert!(relay.push(&inbound(1, false, &[0x67, 0x42])).unwrap().is_empty());
        let out = relay.push(&inbound(2, true, &[0x65, 0x88])).unwrap();

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.ssrc == 2000 && p.payload_type == 97));
        assert!(out.iter().all(|p| p.timestamp == 9000));
        assert_eq!(out[0].payload, vec![0x67, 0x42]);
        assert_eq!(out[1].payload, vec![0x65, 0x88]);
        assert_eq!((out[0].sequence, out[1].sequence), (10, 11));
        assert!(!out[0].marker && out[1].marker);
    }

    #[test]
    fn idle_frame_flushed_by_poll() {
        let relay = Relay::passthrough(Arc::new(FrameAssembler::default()), outbound());
        let t0 = Instant::now();
        relay.push_at(&inbound(1, false, &[0x41, 1]), t0).unwrap();
        assert!(relay.poll_at(t0).unwrap().is_empty());
        let out = relay.poll_at(t0 + std::time::Duration::from_millis(150)).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].marker);
    }

    #[test]
    fn processor_output_is_packetized() {
        let strip_sps = |frame: AccessUnit| -> Result<AccessUnit> {
            let mut data = Vec::new();
            for nal in frame.nal_units().filter(|n| n.first() != Some(&0x67)) {
                crate::media::nal::write_annex_b(&mut data, nal);
            }
            Ok(AccessUnit::new(data, frame.timestamp))
        };
        let relay = Relay::new(
            Arc::new(FrameAssembler::default()),
            Box::new(strip_sps),
            outbound(),
        );
        relay.push(&inbound(1, false, &[0x67, 0x42])).unwrap();
        let out = relay.push(&inbound(2, true, &[0x65, 0x88])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, vec![0x65, 0x88]);
    }

    #[test]
    fn processor_error_drops_frame() {
        let fail = |_: AccessUnit| -> Result<AccessUnit> { Err(FramingError::EmptySpan) };
        let relay = Relay::new(Arc::new(FrameAssembler::default()), Box::new(fail), outbound());
        let err = relay.push(&inbound(1, true, &[0x65])).unwrap_err();
        assert!(matches!(err, FramingError::Processing(_)));
        assert!(!relay.assembler().is_complete());
        assert_eq!(relay.outbound().next_sequence(), 10);
    }

    #[test]
    fn concurrent_pushes_each_forward_their_frame() {
        let relay = Arc::new(Relay::passthrough(
            Arc::new(FrameAssembler::default()),
            outbound(),
        ));
        let handles: Vec<_> = (0..4u16)
            .map(|t| {
                let relay = relay.clone();
                std::thread::spawn(move || {
                    (0..50u16)
                        .map(|i| {
                            let seq = t * 50 + i;
                            relay.push(&inbound(seq, true, &[0x41, seq as u8]))
                        })
                        .map(|r| r.map(|out| out.len()))
                        .collect::<Result<Vec<usize>>>()
                })
            })
            .collect();

        for h in handles {
            let sent = h.join().unwrap().unwrap();
            assert!(sent.iter().all(|&n| n == 1));
        }
        assert_eq!(relay.outbound().counters(), (200, 200));
        assert!(!relay.assembler().is_complete());
    }
}
