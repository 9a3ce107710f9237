// Integration tests for the recording session state machine
//
// All tests run on tokio's paused clock: sleeps advance virtual time, so
// a 25 minute recording takes milliseconds. Chunks are pushed half a
// second off the tick grid so they never land on a tick or a boundary.

mod common;

use anyhow::Result;
use common::{drain, feed, settle, FakeDevice};
use loqa_capture::{
    CaptureError, FaultKind, RecordingSession, RecoveryPolicy, SessionConfig, SessionEvent,
    SessionStatus, StartError, StopError, StopOutcome,
};
use std::time::Duration;
use tokio::time::sleep;

fn config(segment_secs: u64) -> SessionConfig {
    SessionConfig::new("test-meeting").with_segment_duration(Duration::from_secs(segment_secs))
}

fn position(events: &[SessionEvent], wanted: impl Fn(&SessionEvent) -> bool) -> usize {
    events
        .iter()
        .position(wanted)
        .expect("event should have been emitted")
}

async fn assert_idle(session: &RecordingSession) -> Result<()> {
    let stats = session.stats().await?;
    assert_eq!(stats.status, SessionStatus::Idle);
    assert_eq!(stats.elapsed_seconds, 0);
    assert_eq!(stats.segments_count, 0);
    assert_eq!(stats.open_segment_chunks, 0);
    assert_eq!(stats.total_bytes, 0);
    assert!(stats.fault.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_twenty_five_minutes_produce_three_segments() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(SessionConfig::new("standup"), input);
    let mut events = session.subscribe();

    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 1500, 10).await;

    let recording = session
        .stop()
        .await?
        .into_recording()
        .expect("recording should not be empty");

    assert_eq!(recording.sequence_numbers(), vec![1, 2, 3]);
    let durations: Vec<u64> = recording
        .segments
        .iter()
        .map(|s| s.duration_seconds())
        .collect();
    assert_eq!(durations, vec![600, 600, 300]);
    let sizes: Vec<usize> = recording.segments.iter().map(|s| s.byte_size()).collect();
    assert_eq!(sizes, vec![6000, 6000, 3000]);
    assert_eq!(recording.total_duration_seconds, 1500);
    assert_eq!(recording.total_bytes, 15000);
    assert_eq!(recording.concat().len(), 15000);

    assert_eq!(device.opens(), 1);
    assert_eq!(device.releases(), 1);

    let events = drain(&mut events);
    let ticks: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::DurationChanged(secs) => Some(*secs),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, (1..=1500).collect::<Vec<u64>>());

    let completed: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::SegmentCompleted(segment) => Some(segment.sequence_number()),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![1, 2, 3]);

    // The 600th second is counted before the boundary closes segment 1
    let tick_600 = position(&events, |e| *e == SessionEvent::DurationChanged(600));
    let tick_601 = position(&events, |e| *e == SessionEvent::DurationChanged(601));
    let first = position(&events, |e| {
        matches!(e, SessionEvent::SegmentCompleted(s) if s.sequence_number() == 1)
    });
    assert!(tick_600 < first && first < tick_601);

    assert_eq!(
        events.last(),
        Some(&SessionEvent::StatusChanged(SessionStatus::Completed))
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_paused_time_is_not_recorded() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(SessionConfig::new("test-meeting"), input);

    session.start().await?;
    device.push(vec![1; 64]);
    sleep(Duration::from_millis(5250)).await;

    assert!(session.pause().await);
    sleep(Duration::from_secs(50)).await;

    let stats = session.stats().await?;
    assert_eq!(stats.status, SessionStatus::Paused);
    assert_eq!(stats.elapsed_seconds, 5);

    sleep(Duration::from_secs(50)).await;
    assert!(session.resume().await);
    sleep(Duration::from_secs(5)).await;

    let recording = session
        .stop()
        .await?
        .into_recording()
        .expect("recording should not be empty");

    assert_eq!(recording.total_duration_seconds, 10);
    assert_eq!(recording.segments.len(), 1);
    assert_eq!(recording.segments[0].duration_seconds(), 10);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pause_cycles_keep_boundary_at_segment_duration() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);
    let mut events = session.subscribe();

    session.start().await?;
    device.push(vec![1; 16]);

    sleep(Duration::from_millis(3250)).await;
    assert!(session.pause().await);
    sleep(Duration::from_secs(50)).await;
    assert!(session.resume().await);

    sleep(Duration::from_secs(3)).await;
    assert!(session.pause().await);
    sleep(Duration::from_secs(20)).await;
    assert!(session.resume().await);

    // 9.9s of active recording
    sleep(Duration::from_millis(3650)).await;
    let stats = session.stats().await?;
    assert_eq!(stats.segments_count, 0);
    assert_eq!(stats.elapsed_seconds, 9);

    sleep(Duration::from_millis(200)).await;
    let stats = session.stats().await?;
    assert_eq!(stats.segments_count, 1);
    assert_eq!(stats.elapsed_seconds, 10);
    assert_eq!(stats.status, SessionStatus::Recording);

    let events = drain(&mut events);
    let segment = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::SegmentCompleted(segment) => Some(segment.clone()),
            _ => None,
        })
        .expect("segment 1 should be complete");
    assert_eq!(segment.sequence_number(), 1);
    assert_eq!(segment.duration_seconds(), 10);
    assert_eq!(segment.payload(), &[1; 16]);

    session.discard().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_boundary_runs_through_switching_segment() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(5), input);
    let mut events = session.subscribe();

    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 5, 4).await;

    let statuses: Vec<SessionStatus> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StatusChanged(status) => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Initializing,
            SessionStatus::Recording,
            SessionStatus::SwitchingSegment,
            SessionStatus::Recording,
        ]
    );
    assert_eq!(*device.rotations.lock().unwrap(), vec![2]);

    session.discard().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_right_after_boundary() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);

    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 10, 8).await;

    let recording = session
        .stop()
        .await?
        .into_recording()
        .expect("recording should not be empty");

    assert_eq!(recording.sequence_numbers(), vec![1, 2]);
    assert_eq!(recording.segments[0].byte_size(), 80);
    assert_eq!(recording.segments[1].byte_size(), 0);
    assert_eq!(recording.segments[1].duration_seconds(), 0);
    assert_eq!(recording.total_duration_seconds, 10);
    assert_eq!(device.releases(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_no_chunks_is_empty_outcome() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);
    let mut events = session.subscribe();

    session.start().await?;
    sleep(Duration::from_millis(3500)).await;

    let outcome = session.stop().await?;
    assert_eq!(
        outcome,
        StopOutcome::Empty {
            session_id: "test-meeting".to_string(),
            duration_seconds: 3,
        }
    );
    assert!(outcome.is_empty());
    assert_eq!(session.stats().await?.status, SessionStatus::Empty);
    assert_eq!(device.releases(), 1);

    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::SegmentCompleted(_))));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::StatusChanged(SessionStatus::Empty))
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_trailing_flush_lands_in_last_segment() -> Result<()> {
    let (device, input) = FakeDevice::new()
        .with_trailing(vec![vec![7; 5]])
        .into_input();
    let session = RecordingSession::new(config(10), input);

    session.start().await?;
    device.push(vec![1; 3]);
    settle().await;

    let recording = session
        .stop()
        .await?
        .into_recording()
        .expect("recording should not be empty");

    assert_eq!(recording.segments.len(), 1);
    assert_eq!(recording.segments[0].payload(), &[1, 1, 1, 7, 7, 7, 7, 7]);
    assert_eq!(recording.segments[0].chunk_count(), 2);
    assert_eq!(recording.total_bytes, 8);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_metadata_only_session_keeps_no_audio() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(5).with_retain_payloads(false), input);
    let mut events = session.subscribe();

    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 12, 10).await;

    let recording = session
        .stop()
        .await?
        .into_recording()
        .expect("recording should not be empty");

    assert!(!recording.payloads_retained);
    assert_eq!(recording.sequence_numbers(), vec![1, 2, 3]);
    let sizes: Vec<usize> = recording.segments.iter().map(|s| s.byte_size()).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
    assert_eq!(recording.total_bytes, 120);
    assert_eq!(recording.total_duration_seconds, 12);
    assert!(recording.segments.iter().all(|s| !s.has_payload()));
    assert!(recording.concat().is_empty());
    assert!(recording.write_wav("unused.wav").is_err());

    // Subscribers still get the audio as each segment completes
    let delivered: Vec<usize> = drain(&mut events)
        .iter()
        .filter_map(|e| match e {
            SessionEvent::SegmentCompleted(segment) => Some(segment.payload().len()),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, vec![50, 50, 20]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_encoder_fault_keeps_finalized_segments() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);
    let mut events = session.subscribe();

    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 10, 10).await;
    // Three chunks into segment 2, the fourth one fails
    feed(&device, 3, 10).await;
    device.fail(CaptureError::EncoderFault("codec crashed".to_string()));
    settle().await;

    let stats = session.stats().await?;
    assert_eq!(stats.status, SessionStatus::Error);
    assert_eq!(stats.segments_count, 1);
    let fault = stats.fault.expect("fault should be recorded");
    assert_eq!(fault.segment, 2);
    assert_eq!(fault.chunk, 3);
    assert_eq!(fault.error.kind(), FaultKind::EncoderFault);
    assert!(!fault.error.is_retryable());
    assert_eq!(device.releases(), 1);

    let emitted = drain(&mut events);
    let fault_at = position(&emitted, |e| matches!(e, SessionEvent::Fault(_)));
    let error_at = position(&emitted, |e| {
        *e == SessionEvent::StatusChanged(SessionStatus::Error)
    });
    assert!(fault_at < error_at);

    assert_eq!(
        session.stop().await,
        Err(StopError::InvalidState(SessionStatus::Error))
    );

    // The partial segment is not promoted unless asked for
    let finalized = session
        .recover(RecoveryPolicy::FinalizedOnly)
        .await
        .expect("segment 1 should be retrievable");
    assert_eq!(finalized.sequence_numbers(), vec![1]);
    assert_eq!(finalized.total_bytes, 100);

    let recovered = session
        .recover(RecoveryPolicy::FinalizeOpenSegment)
        .await
        .expect("segments should be retrievable");
    assert_eq!(recovered.sequence_numbers(), vec![1, 2]);
    assert_eq!(recovered.segments[1].chunk_count(), 3);
    assert_eq!(recovered.total_bytes, 130);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_finalize_on_error_promotes_open_segment() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let mut config = config(10);
    config.finalize_on_error = true;
    let session = RecordingSession::new(config, input);

    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 2, 10).await;
    device.fail(CaptureError::EncoderFault("codec crashed".to_string()));
    settle().await;

    let stats = session.stats().await?;
    assert_eq!(stats.status, SessionStatus::Error);
    assert_eq!(stats.segments_count, 1);
    assert_eq!(stats.open_segment_chunks, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lost_input_stream_is_device_unavailable() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);

    session.start().await?;
    sleep(Duration::from_millis(1500)).await;
    device.hang_up();
    settle().await;

    let stats = session.stats().await?;
    assert_eq!(stats.status, SessionStatus::Error);
    let fault = stats.fault.expect("fault should be recorded");
    assert_eq!(fault.error.kind(), FaultKind::DeviceUnavailable);
    assert_eq!(device.releases(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rotate_failure_keeps_finalized_segment() -> Result<()> {
    let (device, input) = FakeDevice::new().with_rotate_error_at(2).into_input();
    let session = RecordingSession::new(config(10), input);

    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 10, 10).await;

    let stats = session.stats().await?;
    assert_eq!(stats.status, SessionStatus::Error);
    assert_eq!(stats.segments_count, 1);
    let fault = stats.fault.expect("fault should be recorded");
    assert_eq!(fault.segment, 2);
    assert_eq!(fault.chunk, 0);
    assert_eq!(device.releases(), 1);

    let recording = session
        .recover(RecoveryPolicy::FinalizedOnly)
        .await
        .expect("segment 1 should be retrievable");
    assert_eq!(recording.sequence_numbers(), vec![1]);
    assert_eq!(recording.total_bytes, 100);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_segment_duration_fails_to_schedule() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(0), input);

    let result = session.start().await;
    assert!(matches!(
        result,
        Err(StartError::Capture(CaptureError::TimerSchedulingFailure(_)))
    ));

    let stats = session.stats().await?;
    assert_eq!(stats.status, SessionStatus::Error);
    assert_eq!(stats.elapsed_seconds, 0);
    assert_eq!(device.opens(), 1);
    assert_eq!(device.releases(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_reported_to_start() -> Result<()> {
    let (device, input) = FakeDevice::new()
        .with_open_error(CaptureError::PermissionDenied("microphone".to_string()))
        .into_input();
    let session = RecordingSession::new(config(10), input);

    match session.start().await {
        Err(StartError::Capture(error)) => {
            assert_eq!(error.kind(), FaultKind::PermissionDenied);
            assert!(error.is_retryable());
        }
        other => panic!("expected permission failure, got {:?}", other),
    }

    assert_eq!(session.stats().await?.status, SessionStatus::Error);
    assert_eq!(device.opens(), 0);

    // No automatic retry: the caller discards and starts again
    session.discard().await;
    assert_idle(&session).await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_start_timeout_is_device_unavailable() -> Result<()> {
    let (device, input) = FakeDevice::new()
        .with_open_delay(Duration::from_secs(30))
        .into_input();
    let mut config = config(10);
    config.start_timeout = Duration::from_secs(10);
    let session = RecordingSession::new(config, input);

    let result = session.start().await;
    assert!(matches!(
        result,
        Err(StartError::Capture(CaptureError::DeviceUnavailable(_)))
    ));
    assert_eq!(session.stats().await?.status, SessionStatus::Error);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(device.opens(), 0);
    assert_eq!(device.releases(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_discard_during_pending_start() -> Result<()> {
    let (device, input) = FakeDevice::new()
        .with_open_delay(Duration::from_secs(2))
        .into_input();
    let session = RecordingSession::new(config(10), input);

    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };

    sleep(Duration::from_millis(500)).await;
    assert_eq!(session.stats().await?.status, SessionStatus::Initializing);

    session.discard().await;
    assert_eq!(starter.await?, Err(StartError::Discarded));

    // The device opens after the discard and is closed straight away
    sleep(Duration::from_secs(3)).await;
    assert_eq!(device.opens(), 1);
    assert_eq!(device.releases(), 1);
    assert_idle(&session).await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_discard_from_every_state() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);

    // Idle
    session.discard().await;
    assert_idle(&session).await?;

    // Recording, with one finalized segment
    session.start().await?;
    sleep(Duration::from_millis(500)).await;
    feed(&device, 12, 10).await;
    assert_eq!(session.stats().await?.segments_count, 1);
    session.discard().await;
    assert_idle(&session).await?;
    assert_eq!(device.releases(), 1);

    // Paused
    session.start().await?;
    device.push(vec![1; 10]);
    settle().await;
    assert!(session.pause().await);
    session.discard().await;
    assert_idle(&session).await?;
    assert_eq!(device.releases(), 2);

    // Completed
    session.start().await?;
    device.push(vec![1; 10]);
    settle().await;
    assert!(!session.stop().await?.is_empty());
    session.discard().await;
    assert_idle(&session).await?;

    // Empty
    session.start().await?;
    assert!(session.stop().await?.is_empty());
    session.discard().await;
    assert_idle(&session).await?;

    // Error
    session.start().await?;
    device.fail(CaptureError::EncoderFault("codec crashed".to_string()));
    settle().await;
    assert_eq!(session.stats().await?.status, SessionStatus::Error);
    session.discard().await;
    assert_idle(&session).await?;

    assert_eq!(device.opens(), 5);
    assert_eq!(device.releases(), 5);

    // A discarded session starts over at sequence 1
    session.start().await?;
    device.push(vec![2; 4]);
    settle().await;
    let recording = session
        .stop()
        .await?
        .into_recording()
        .expect("recording should not be empty");
    assert_eq!(recording.sequence_numbers(), vec![1]);
    assert_eq!(recording.total_bytes, 4);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_commands_in_wrong_state_are_rejected() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);

    assert!(!session.pause().await);
    assert!(!session.resume().await);
    assert_eq!(
        session.stop().await,
        Err(StopError::InvalidState(SessionStatus::Idle))
    );

    session.start().await?;
    assert_eq!(
        session.start().await,
        Err(StartError::InvalidState(SessionStatus::Recording))
    );
    assert!(!session.resume().await);

    device.push(vec![1; 10]);
    settle().await;
    assert!(session.pause().await);
    assert!(!session.pause().await);

    // Stopping from Paused is allowed
    let outcome = session.stop().await?;
    assert!(!outcome.is_empty());
    assert_eq!(
        session.stop().await,
        Err(StopError::InvalidState(SessionStatus::Completed))
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_releases_device() -> Result<()> {
    let (device, input) = FakeDevice::new().into_input();
    let session = RecordingSession::new(config(10), input);
    let mut events = session.subscribe();

    session.start().await?;
    assert!(device.is_streaming());
    drop(session);
    settle().await;

    assert_eq!(device.releases(), 1);

    // The event stream ends with the actor
    drain(&mut events);
    assert!(events.recv().await.is_none());

    Ok(())
}
