use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use framing::media::h264::{DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_PAYLOAD_TYPE};
use framing::media::nal::{self, NalUnits};
use framing::{FrameAssembler, OutboundStream, PacketizerConfig, RtpPacket, SequenceCounter};

#[derive(Parser)]
#[command(
    name = "h264-rtp",
    about = "Packetize H.264 Annex B streams into RTP and reassemble them"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the RTP packets an Annex B file turns into.
    Packetize(StreamArgs),
    /// Packetize, reassemble, and compare against the input.
    Roundtrip {
        #[command(flatten)]
        stream: StreamArgs,

        /// Write the reassembled Annex B stream here.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct StreamArgs {
    /// Annex B H.264 elementary stream.
    input: PathBuf,

    /// Maximum RTP payload size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_SIZE)]
    mtu: usize,

    /// SSRC to stamp on packets (random if omitted).
    #[arg(long)]
    ssrc: Option<u32>,

    /// RTP payload type.
    #[arg(long, default_value_t = DEFAULT_PAYLOAD_TYPE)]
    pt: u8,

    /// RTP timestamp increment per frame (90 kHz; 3000 = 30 fps).
    #[arg(long, default_value_t = 3000)]
    timestamp_step: u32,
}

impl StreamArgs {
    fn open(&self) -> Result<(Vec<u8>, OutboundStream)> {
        let data = std::fs::read(&self.input)
            .with_context(|| format!("reading {}", self.input.display()))?;
        let config = match self.ssrc {
            Some(ssrc) => PacketizerConfig::new(ssrc, self.pt),
            None => PacketizerConfig::with_random_ssrc(self.pt),
        }
        .with_max_payload_size(self.mtu);
        let stream = OutboundStream::with_sequence(config, SequenceCounter::new(0))?;
        Ok((data, stream))
    }
}

/// Group the NAL units of an elementary stream into access units.
///
/// A frame closes after each coded slice; trailing non-VCL units form a
/// final frame of their own.
fn split_frames(data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut current = Vec::new();
    for unit in NalUnits::new(data) {
        nal::write_annex_b(&mut current, unit);
        if nal::unit_type(unit).is_some_and(nal::is_vcl) {
            frames.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        frames.push(current);
    }
    frames
}

fn packetize(args: &StreamArgs) -> Result<()> {
    let (data, stream) = args.open()?;
    let frames = split_frames(&data);

    let mut ts = 0u32;
    for frame in &frames {
        for p in stream.send_frame(frame, ts) {
            println!(
                "seq={:5} ts={:10} ssrc={:#010X} pt={} marker={} len={:4} {}",
                p.sequence,
                p.timestamp,
                p.ssrc,
                p.payload_type,
                u8::from(p.marker),
                p.payload.len(),
                describe(&p),
            );
        }
        ts = ts.wrapping_add(args.timestamp_step);
    }

    let (frames, packets) = stream.counters();
    println!("{frames} frames, {packets} packets");
    for line in stream.sdp_attributes() {
        println!("{line}");
    }
    Ok(())
}

fn describe(p: &RtpPacket) -> String {
    match p.payload.as_slice() {
        [ind, hdr, ..] if ind & 0x1f == nal::nal_type::FU_A => format!(
            "FU-A type={}{}{}",
            hdr & 0x1f,
            if hdr & 0x80 != 0 { " start" } else { "" },
            if hdr & 0x40 != 0 { " end" } else { "" },
        ),
        [hdr, ..] => format!("NAL type={}", hdr & 0x1f),
        [] => "empty".to_owned(),
    }
}

fn roundtrip(args: &StreamArgs, output: Option<&Path>) -> Result<()> {
    let (data, stream) = args.open()?;
    let frames = split_frames(&data);
    let assembler = FrameAssembler::default();

    let mut rebuilt = Vec::with_capacity(data.len());
    let mut ts = 0u32;
    for (i, frame) in frames.iter().enumerate() {
        for p in stream.send_frame(frame, ts) {
            let p = RtpPacket::parse(&p.serialize())?;
            assembler.push(&p)?;
        }
        let au = assembler
            .take_frame()
            .with_context(|| format!("frame {i} did not complete"))?;
        if au.timestamp != ts {
            bail!("frame {i}: timestamp {} != {ts}", au.timestamp);
        }
        rebuilt.extend_from_slice(&au.data);
        ts = ts.wrapping_add(args.timestamp_step);
    }

    if let Some(path) = output {
        std::fs::write(path, &rebuilt).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = rebuilt.len(), "wrote reassembled stream");
    }

    let (frames, packets) = stream.counters();
    let normalized = split_frames(&data).concat();
    if rebuilt == data {
        println!("{frames} frames, {packets} packets: identical");
    } else if rebuilt == normalized {
        println!("{frames} frames, {packets} packets: identical after start code normalization");
    } else {
        bail!("{frames} frames, {packets} packets: reassembled stream differs");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().cmd {
        Cmd::Packetize(args) => packetize(&args),
        Cmd::Roundtrip { stream, output } => roundtrip(&stream, output.as_deref()),
    }
}
