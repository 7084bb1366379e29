//! End-to-end: packetize access units, carry them over the RTP wire format,
//! and reassemble them on the receive side.

use std::sync::Arc;
use std::time::{Duration, Instant};

use framing::media::nal::split_nal_units;
use framing::{
    AssemblerConfig, FrameAssembler, FramingError, H264Packetizer, OutboundStream,
    PacketizerConfig, Relay, RtpPacket, SequenceCounter, SessionRegistry, StreamKey,
};

fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    out
}

fn slice(nal_header: u8, len: usize) -> Vec<u8> {
    let mut nal = vec![nal_header];
    nal.extend((1..len).map(|i| (i % 251) as u8));
    nal
}

#[test]
fn sps_and_slice_round_trip() {
    let sps = [0x67, 0x42, 0x00, 0x1e, 0xab, 0xcd];
    let coded = [0x41, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    let frame = annex_b(&[&sps[..], &coded[..]]);

    let packetizer = H264Packetizer::new(PacketizerConfig::new(1000, 96)).unwrap();
    let packets = packetizer.packetize(&frame, 9000, &mut SequenceCounter::new(0));

    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].ssrc, 1000);
    assert_eq!(packets[0].payload_type, 96);
    assert_eq!(packets[0].timestamp, 9000);
    assert!(!packets[0].marker);
    assert_eq!(packets[0].payload, sps);
    assert!(packets[1].marker);
    assert_eq!(packets[1].payload, coded);

    let assembler = FrameAssembler::default();
    for p in &packets {
        assembler.push(p).unwrap();
    }
    let au = assembler.take_frame().unwrap();
    assert_eq!(au.data, frame);
    assert_eq!(au.timestamp, 9000);
}

#[test]
fn fragmented_idr_round_trip_over_the_wire() {
    let sps = [0x67, 0x42, 0x00, 0x1e];
    let pps = [0x68, 0xce, 0x38, 0x80];
    let idr = slice(0x65, 5000);
    let frame = annex_b(&[&sps[..], &pps[..], &idr[..]]);

    let stream = OutboundStream::with_sequence(
        PacketizerConfig::new(0xdead_beef, 96).with_max_payload_size(1200),
        SequenceCounter::new(65_533),
    )
    .unwrap();
    let packets = stream.send_frame(&frame, 180_000);
    // 2 single + ceil(4999 / 1198) fragments
    assert_eq!(packets.len(), 2 + 5);
    assert!(packets.iter().all(|p| p.payload.len() <= 1200));
    assert_eq!(packets.iter().filter(|p| p.marker).count(), 1);
    assert!(packets.last().unwrap().marker);

    let assembler = FrameAssembler::default();
    for wire in packets.iter().map(RtpPacket::serialize) {
        let packet = RtpPacket::parse(&wire).unwrap();
        let ingest = assembler.push(&packet).unwrap();
        assert!(ingest.gap.is_none(), "contiguous across wrap");
    }
    let au = assembler.take_frame().unwrap();
    assert_eq!(split_nal_units(&au.data), vec![&sps[..], &pps[..], &idr[..]]);
    assert_eq!(au.data, frame);
    assert_eq!(au.timestamp, 180_000);
}

#[test]
fn reordered_fragments_inside_a_span() {
    let idr = slice(0x65, 4000);
    let packetizer =
        H264Packetizer::new(PacketizerConfig::new(7, 96).with_max_payload_size(1000)).unwrap();
    let mut packets = packetizer.packetize(&annex_b(&[&idr[..]]), 0, &mut SequenceCounter::new(65_534));
    assert_eq!(packets.len(), 5);
    packets[1..4].reverse();

    let assembler = FrameAssembler::default();
    for p in &packets {
        assembler.push(p).unwrap();
    }
    assert_eq!(assembler.take_frame().unwrap().data, annex_b(&[&idr[..]]));
}

#[test]
fn consecutive_frames_keep_sequence_and_identity() {
    let stream = OutboundStream::with_sequence(
        PacketizerConfig::new(1, 96).with_max_payload_size(500),
        SequenceCounter::new(10),
    )
    .unwrap();
    let assembler = FrameAssembler::default();

    for n in 0..5u32 {
        let frame = annex_b(&[&slice(0x41, 300 + 400 * n as usize)[..]]);
        for p in stream.send_frame(&frame, n * 3000) {
            let ingest = assembler.push(&p).unwrap();
            assert!(ingest.gap.is_none());
        }
        let au = assembler.take_frame().unwrap();
        assert_eq!(au.data, frame);
        assert_eq!(au.timestamp, n * 3000);
    }
    assert_eq!(assembler.identity(), Some(StreamKey::new(1, 96)));
}

#[test]
fn foreign_stream_is_rejected_without_side_effects() {
    let assembler = FrameAssembler::default();
    let first = RtpPacket {
        sequence: 1,
        timestamp: 0,
        ssrc: 1000,
        payload_type: 96,
        marker: false,
        payload: vec![0x67, 0x42],
    };
    assembler.push(&first).unwrap();

    let other = RtpPacket {
        ssrc: 2000,
        marker: true,
        ..first.clone()
    };
    let err = assembler.push(&other).unwrap_err();
    assert_eq!(
        err,
        FramingError::IdentityMismatch {
            expected_ssrc: 1000,
            expected_payload_type: 96,
            ssrc: 2000,
            payload_type: 96,
        }
    );
    assert!(!assembler.is_complete());
    assert_eq!(assembler.pending_units(), 1);
}

#[test]
fn abandoned_span_is_replaced_by_the_next_start() {
    let first = slice(0x65, 3000);
    let second = slice(0x65, 2500);
    let packetizer =
        H264Packetizer::new(PacketizerConfig::new(3, 96).with_max_payload_size(1200)).unwrap();
    let mut seq = SequenceCounter::new(0);

    let mut lost_end = packetizer.packetize(&annex_b(&[&first[..]]), 0, &mut seq);
    lost_end.pop();
    let complete = packetizer.packetize(&annex_b(&[&second[..]]), 3000, &mut seq);

    let assembler = FrameAssembler::default();
    for p in &lost_end {
        assembler.push(p).unwrap();
    }
    let ingest = assembler.push(&complete[0]).unwrap();
    assert_eq!(ingest.fragments_dropped, lost_end.len());
    assert!(ingest.gap.is_some());
    for p in &complete[1..] {
        assembler.push(p).unwrap();
    }

    let au = assembler.take_frame().unwrap();
    assert_eq!(au.data, annex_b(&[&second[..]]));
}

#[test]
fn continuation_without_start_is_rejected() {
    let idr = slice(0x65, 3000);
    let packetizer = H264Packetizer::new(PacketizerConfig::new(3, 96)).unwrap();
    let packets = packetizer.packetize(&annex_b(&[&idr[..]]), 0, &mut SequenceCounter::new(0));

    let assembler = FrameAssembler::default();
    assert_eq!(
        assembler.push(&packets[1]),
        Err(FramingError::NoOpenSpan { sequence: 1 })
    );
    assert_eq!(assembler.identity(), None);
}

#[test]
fn end_of_sequence_completes_without_marker() {
    let assembler = FrameAssembler::default();
    let mut p = RtpPacket {
        sequence: 0,
        timestamp: 0,
        ssrc: 1,
        payload_type: 96,
        marker: false,
        payload: vec![0x41, 1],
    };
    assembler.push(&p).unwrap();
    assert!(!assembler.is_complete());
    p.sequence = 1;
    p.payload = vec![0x0a];
    assembler.push(&p).unwrap();
    assert_eq!(assembler.take_frame().unwrap().data, annex_b(&[&[0x41, 1][..], &[0x0a][..]]));
}

#[test]
fn registry_separates_interleaved_streams() {
    let registry = SessionRegistry::default();
    let a = OutboundStream::new(PacketizerConfig::new(100, 96).with_max_payload_size(600)).unwrap();
    let b = OutboundStream::new(PacketizerConfig::new(200, 96).with_max_payload_size(600)).unwrap();
    let frame_a = annex_b(&[&slice(0x65, 2000)[..]]);
    let frame_b = annex_b(&[&slice(0x41, 1500)[..]]);

    let pa = a.send_frame(&frame_a, 1);
    let pb = b.send_frame(&frame_b, 2);
    let mut interleaved = Vec::new();
    for i in 0..pa.len().max(pb.len()) {
        interleaved.extend(pa.get(i));
        interleaved.extend(pb.get(i));
    }
    for p in interleaved {
        registry.route(p).unwrap();
    }

    let ready = registry.take_ready();
    assert_eq!(ready.len(), 2);
    assert_eq!(ready[0].0, StreamKey::new(100, 96));
    assert_eq!(ready[0].1.data, frame_a);
    assert_eq!(ready[1].0, StreamKey::new(200, 96));
    assert_eq!(ready[1].1.data, frame_b);
}

#[test]
fn idle_stream_completes_on_timeout() {
    let assembler = FrameAssembler::new(
        AssemblerConfig::default().with_frame_timeout(Duration::from_millis(30)),
    );
    let t0 = Instant::now();
    let p = RtpPacket {
        sequence: 5,
        timestamp: 40,
        ssrc: 1,
        payload_type: 96,
        marker: false,
        payload: vec![0x41, 0xaa],
    };
    assembler.push_at(&p, t0).unwrap();
    assert!(!assembler.poll_at(t0 + Duration::from_millis(30)));
    assert!(assembler.poll_at(t0 + Duration::from_millis(31)));
    assert_eq!(assembler.take_frame().unwrap().timestamp, 40);
}

#[test]
fn relay_repacketizes_for_a_smaller_mtu() {
    let source = OutboundStream::with_sequence(
        PacketizerConfig::new(1, 96).with_max_payload_size(1400),
        SequenceCounter::new(0),
    )
    .unwrap();
    let relay = Relay::passthrough(
        Arc::new(FrameAssembler::default()),
        OutboundStream::with_sequence(
            PacketizerConfig::new(2, 98).with_max_payload_size(400),
            SequenceCounter::new(1000),
        )
        .unwrap(),
    );

    let frame = annex_b(&[
        &[0x67, 0x42, 0x00, 0x1f][..],
        &[0x68, 0xce][..],
        &slice(0x65, 1300)[..],
    ]);
    let mut out = Vec::new();
    for p in source.send_frame(&frame, 42_000) {
        out.extend(relay.push(&p).unwrap());
    }

    assert_eq!(out.len(), 2 + 4);
    assert!(out.iter().all(|p| p.ssrc == 2 && p.payload_type == 98 && p.timestamp == 42_000));
    assert_eq!(out.first().unwrap().sequence, 1000);
    assert_eq!(out.last().unwrap().sequence, 1005);

    let sink = FrameAssembler::default();
    for p in &out {
        sink.push(p).unwrap();
    }
    assert_eq!(sink.take_frame().unwrap().data, frame);
    assert!(relay.outbound().sdp_attributes()[1].contains("profile-level-id=42001f"));
}

#[test]
fn late_take_keeps_the_completed_frame_timestamp() {
    let registry = SessionRegistry::default();
    let stream = OutboundStream::with_sequence(
        PacketizerConfig::new(11, 96).with_max_payload_size(1000),
        SequenceCounter::new(0),
    )
    .unwrap();
    let first = annex_b(&[&[0x67, 0x42, 0x00, 0x1e][..], &slice(0x65, 400)[..]]);
    let second = annex_b(&[&slice(0x41, 2500)[..]]);

    for p in stream.send_frame(&first, 3000) {
        registry.route(&p).unwrap();
    }
    let next = stream.send_frame(&second, 6000);
    registry.route(&next[0]).unwrap();

    let ready = registry.take_ready();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].1.data, first);
    assert_eq!(ready[0].1.timestamp, 3000);

    for p in &next[1..] {
        registry.route(p).unwrap();
    }
    let ready = registry.take_ready();
    assert_eq!(ready[0].1.data, second);
    assert_eq!(ready[0].1.timestamp, 6000);
}
