// Tests for synchronized playback: frame/time mapping across mixed-rate
// streams, lockstep vs independent scrubbing, event lookup, and thumbnail
// planning.

use std::time::Duration;
use typetrace::keystroke::{InputKeystroke, KeyRef};
use typetrace::playback::{
    plan_thumbnails, PlaybackSynchronizer, StreamId, StreamTimeline,
};

fn event_at(timestamp: f64, text: &str) -> InputKeystroke {
    InputKeystroke {
        key: KeyRef::Code(65),
        text: text.to_string(),
        timestamp,
        absolute_timestamp: 1_700_000_000.0 + timestamp,
        input_content: text.to_string(),
    }
}

#[test]
fn test_timeline_frame_time_conversion() {
    let timeline = StreamTimeline::new(15.0, 150);

    assert_eq!(timeline.frame_to_time(0), 0.0);
    assert!((timeline.frame_to_time(150) - 10.0).abs() < 1e-9);
    assert_eq!(timeline.time_to_frame(10.0), 149, "clamped to last frame");
    assert_eq!(timeline.time_to_frame(-5.0), 0);
    assert!((timeline.duration_secs() - 10.0).abs() < 1e-9);
}

#[test]
fn test_timeline_rounds_to_nearest_frame() {
    let timeline = StreamTimeline::new(30.0, 300);
    // 0.034s at 30fps is 1.02 frames; nearest is frame 1.
    assert_eq!(timeline.time_to_frame(0.034), 1);
    assert_eq!(timeline.time_to_frame(0.051), 2);
}

#[test]
fn test_synced_seek_converts_via_elapsed_time() {
    // 10 seconds of each stream at different rates.
    let screen = StreamTimeline::new(15.0, 150);
    let webcam = StreamTimeline::new(30.0, 300);
    let mut sync = PlaybackSynchronizer::new(screen, Some(webcam), vec![]);

    sync.seek_frame(StreamId::Screen, 75);
    assert_eq!(sync.screen_frame(), 75);
    assert_eq!(sync.webcam_frame(), 150, "5s into a 30fps stream");

    sync.seek_frame(StreamId::Webcam, 60);
    assert_eq!(sync.webcam_frame(), 60);
    assert_eq!(sync.screen_frame(), 30, "2s into a 15fps stream");
}

#[test]
fn test_unsynced_streams_scrub_independently() {
    let screen = StreamTimeline::new(15.0, 150);
    let webcam = StreamTimeline::new(30.0, 300);
    let mut sync = PlaybackSynchronizer::new(screen, Some(webcam), vec![]);

    sync.set_sync_enabled(false);
    sync.seek_frame(StreamId::Screen, 75);
    assert_eq!(sync.webcam_frame(), 0, "webcam must not move");

    sync.seek_frame(StreamId::Webcam, 90);
    assert_eq!(sync.screen_frame(), 75, "screen must not move");
}

#[test]
fn test_seek_clamps_to_stream_range() {
    let screen = StreamTimeline::new(15.0, 150);
    let mut sync = PlaybackSynchronizer::new(screen, None, vec![]);

    sync.seek_frame(StreamId::Screen, 10_000);
    assert_eq!(sync.screen_frame(), 149);

    // Webcam seeks are ignored when there is no webcam stream.
    sync.seek_frame(StreamId::Webcam, 42);
    assert_eq!(sync.screen_frame(), 149);
    assert_eq!(sync.webcam_frame(), 0);
}

#[test]
fn test_active_event_intervals() {
    let screen = StreamTimeline::new(15.0, 150);
    let events = vec![event_at(1.0, "a"), event_at(3.0, "b"), event_at(5.0, "c")];
    let mut sync = PlaybackSynchronizer::new(screen, None, events);

    sync.seek_time(0.5);
    assert!(sync.active_event().is_none(), "before the first event");

    sync.seek_time(1.0);
    assert_eq!(sync.active_event().unwrap().text, "a");

    sync.seek_time(2.9);
    assert_eq!(sync.active_event().unwrap().text, "a");

    sync.seek_time(4.0);
    assert_eq!(sync.active_event().unwrap().text, "b");

    // The last event's interval extends to the end of playback.
    sync.seek_time(9.9);
    assert_eq!(sync.active_event().unwrap().text, "c");
    assert_eq!(sync.events_elapsed(), 3);
}

#[test]
fn test_events_sorted_on_construction() {
    let screen = StreamTimeline::new(15.0, 150);
    let events = vec![event_at(5.0, "late"), event_at(1.0, "early")];
    let sync = PlaybackSynchronizer::new(screen, None, events);

    assert_eq!(sync.events()[0].text, "early");
    assert_eq!(sync.events()[1].text, "late");
}

#[test]
fn test_speed_scales_frame_delay_only() {
    let screen = StreamTimeline::new(15.0, 150);
    let webcam = StreamTimeline::new(30.0, 300);
    let mut sync = PlaybackSynchronizer::new(screen, Some(webcam), vec![]);

    let base = sync.frame_delay(StreamId::Screen);
    assert_eq!(base, Duration::from_secs_f64(1.0 / 15.0));

    sync.set_speed(2.0);
    assert_eq!(
        sync.frame_delay(StreamId::Screen),
        Duration::from_secs_f64(1.0 / 15.0 / 2.0)
    );
    assert_eq!(
        sync.frame_delay(StreamId::Webcam),
        Duration::from_secs_f64(1.0 / 30.0 / 2.0)
    );

    // Speed never touches the frame/time mapping.
    sync.seek_frame(StreamId::Screen, 75);
    assert_eq!(sync.webcam_frame(), 150);

    sync.set_speed(0.0);
    assert!((sync.speed() - 2.0).abs() < 1e-9, "non-positive speed ignored");
}

#[test]
fn test_cursor_snapshot_reflects_state() {
    let screen = StreamTimeline::new(15.0, 150);
    let webcam = StreamTimeline::new(30.0, 300);
    let mut sync = PlaybackSynchronizer::new(screen, Some(webcam), vec![]);

    sync.set_speed(1.5);
    sync.seek_frame(StreamId::Screen, 30);

    let cursor = sync.cursor();
    assert_eq!(cursor.screen_frame, 30);
    assert_eq!(cursor.webcam_frame, 60);
    assert!((cursor.time_secs - 2.0).abs() < 1e-9);
    assert!((cursor.speed - 1.5).abs() < 1e-9);
    assert!(cursor.sync_enabled);
}

#[test]
fn test_duration_follows_screen_stream() {
    // Webcam stream ran 2 seconds longer; the screen stream is
    // authoritative.
    let screen = StreamTimeline::new(15.0, 150);
    let webcam = StreamTimeline::new(30.0, 360);
    let sync = PlaybackSynchronizer::new(screen, Some(webcam), vec![]);

    assert!((sync.duration_secs() - 10.0).abs() < 1e-9);
}

#[test]
fn test_step_advances_in_lockstep_until_end() {
    let screen = StreamTimeline::new(15.0, 3);
    let webcam = StreamTimeline::new(30.0, 6);
    let mut sync = PlaybackSynchronizer::new(screen, Some(webcam), vec![]);

    assert!(sync.step());
    assert_eq!(sync.screen_frame(), 1);
    assert_eq!(sync.webcam_frame(), 2);

    assert!(sync.step());
    assert!(!sync.step(), "no stepping past the last screen frame");
    assert_eq!(sync.screen_frame(), 2);
}

#[test]
fn test_thumbnail_plan_spacing_and_clamping() {
    let timeline = StreamTimeline::new(15.0, 150); // 10 seconds
    let points = plan_thumbnails(&timeline, 2.0);

    assert_eq!(points.len(), 5, "every 2s over 10s: t=0,2,4,6,8");
    assert_eq!(points[0].time_secs, 0.0);
    assert_eq!(points[0].frame, 0);
    assert_eq!(points[4].time_secs, 8.0);
    assert_eq!(points[4].frame, 120);
    for point in &points {
        assert!(point.frame < 150);
    }
}

#[test]
fn test_thumbnail_plan_for_tiny_stream() {
    let timeline = StreamTimeline::new(15.0, 1);
    let points = plan_thumbnails(&timeline, 2.0);
    assert_eq!(points.len(), 1, "always at least the first frame");
    assert_eq!(points[0].frame, 0);

    // Bad interval falls back to the default rather than looping forever.
    let timeline = StreamTimeline::new(15.0, 150);
    let points = plan_thumbnails(&timeline, 0.0);
    assert_eq!(points.len(), 5);
}
