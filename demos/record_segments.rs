// Example: Record audio in fixed-length segments
//
// Runs a full recording session:
// 1. Open a tone generator or replay a file as live input
// 2. Pause and resume once halfway through
// 3. Write every finalized segment to disk as it completes
// 4. Stop and write the reassembled recording
//
// Usage: cargo run --example record_segments -- --duration 30 --segment-duration 10
//
// This will record for 30 seconds and save segments to ~/.loqa/recordings/test-meeting/

use anyhow::{bail, Result};
use clap::Parser;
use loqa_capture::{
    spawn_segment_forwarder, AudioSource, BackendInput, EncodedFormat, FileSegmentSink,
    RecordingSession, SessionConfig, SessionEvent, StopOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "record_segments")]
#[command(about = "Record audio in segments")]
struct Args {
    /// Duration to record in seconds (pause time not included)
    #[arg(short, long, default_value = "30")]
    duration: u64,

    /// Meeting ID (used for segment filenames)
    #[arg(short, long, default_value = "test-meeting")]
    meeting_id: String,

    /// Output directory
    #[arg(short, long, default_value = "~/.loqa/recordings")]
    output_dir: String,

    /// Segment duration in seconds
    #[arg(short, long, default_value = "10")]
    segment_duration: u64,

    /// Input: `tone`, `tone:<hz>` or a path to an audio file
    #[arg(long, default_value = "tone")]
    source: String,

    /// Seconds to stay paused halfway through (0 = no pause)
    #[arg(long, default_value = "3")]
    pause: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();

    info!("Loqa Capture - Segmented Recording Example");
    info!("Recording for {} seconds", args.duration);
    info!("Meeting ID: {}", args.meeting_id);
    info!("Segment duration: {} seconds", args.segment_duration);

    // Expand home directory
    let output_dir = shellexpand::tilde(&args.output_dir);
    let output_dir = PathBuf::from(output_dir.as_ref()).join(&args.meeting_id);

    info!("Output directory: {}", output_dir.display());

    let input = Arc::new(BackendInput::new(AudioSource::parse(&args.source)));
    let mut levels = input.levels();

    let config = SessionConfig::new(args.meeting_id.clone())
        .with_segment_duration(Duration::from_secs(args.segment_duration));
    let session = RecordingSession::new(config, input);

    let mut events = session.subscribe();
    let segment_events = session.subscribe();

    session.start().await?;
    let format = session.stats().await?.format;
    let sink = Arc::new(FileSegmentSink::new(&output_dir, format)?);
    let forwarder = spawn_segment_forwarder(args.meeting_id.clone(), segment_events, sink);

    // Progress reporting
    let progress = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::DurationChanged(secs) if secs % 5 == 0 => {
                    let level = *levels.borrow_and_update();
                    info!("  {}s recorded (rms {:.3}, peak {:.3})", secs, level.rms, level.peak);
                }
                SessionEvent::SegmentCompleted(segment) => {
                    info!(
                        "Segment {} complete: {}s, {} bytes",
                        segment.sequence_number(),
                        segment.duration_seconds(),
                        segment.byte_size()
                    );
                }
                SessionEvent::StatusChanged(status) => info!("Status: {:?}", status),
                SessionEvent::Fault(fault) => info!("Fault: {}", fault),
                _ => {}
            }
        }
    });

    let first_half = args.duration / 2;
    sleep(Duration::from_secs(first_half)).await;
    if args.pause > 0 && session.pause().await {
        info!("Paused for {} seconds", args.pause);
        sleep(Duration::from_secs(args.pause)).await;
        session.resume().await;
    }
    sleep(Duration::from_secs(args.duration - first_half)).await;

    info!("Stopping recording...");
    let recording = match session.stop().await? {
        StopOutcome::Completed(recording) => recording,
        StopOutcome::Empty { .. } => bail!("Nothing was recorded"),
    };

    let report = forwarder.await?;
    drop(session);
    progress.await?;

    let full_path = output_dir.join(format!("{}.{}", args.meeting_id, format.extension()));
    if matches!(recording.format, EncodedFormat::PcmS16Le { .. }) {
        recording.write_wav(&full_path)?;
        info!("Full recording: {}", full_path.display());
    }

    info!("Recording complete!");
    info!("  Segments written: {}", report.delivered);
    info!("  Total duration: {}s", recording.total_duration_seconds);
    info!("  Total bytes: {}", recording.total_bytes);

    Ok(())
}
