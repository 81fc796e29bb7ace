// Tests for webcam discovery and the webcam manager's state machine, run
// against scripted camera devices.

mod common;

use common::{Counters, FakeCameraBackend, FakeCameraScript, FakeSink};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use typetrace::capture::webcam::discover_devices;
use typetrace::capture::{WebcamManager, WebcamState};
use typetrace::clock::ClockSource;
use typetrace::error::CaptureError;

fn works(width: u32, height: u32, fps: u32) -> FakeCameraScript {
    FakeCameraScript::Works { width, height, fps }
}

fn bound_clock() -> Arc<ClockSource> {
    let clock = Arc::new(ClockSource::new());
    clock.bind_origin().unwrap();
    clock
}

fn sink(counters: &Arc<Counters>) -> Box<FakeSink> {
    Box::new(FakeSink {
        counters: Arc::clone(counters),
        fail_writes: false,
    })
}

#[test]
fn test_discovery_reports_only_workable_devices() {
    let backend = FakeCameraBackend::new(vec![
        works(1280, 720, 30),
        FakeCameraScript::Missing,
        FakeCameraScript::OpensButBlind,
        works(640, 480, 15),
    ]);

    let devices = discover_devices(&backend, 10).unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].index, 0);
    assert_eq!(devices[0].width, 1280);
    assert_eq!(devices[1].index, 3);
    assert_eq!(devices[1].fps, 15);
}

#[test]
fn test_discovery_with_no_devices_is_empty() {
    let backend = FakeCameraBackend::new(vec![]);
    let devices = discover_devices(&backend, 10).unwrap();
    assert!(devices.is_empty());
}

#[test]
fn test_discovery_aborts_on_permission_denial() {
    let backend = FakeCameraBackend::new(vec![works(640, 480, 30), FakeCameraScript::Denied]);
    let err = discover_devices(&backend, 10).unwrap_err();
    assert!(matches!(err, CaptureError::PermissionDenied));
}

#[tokio::test]
async fn test_connect_lifecycle() {
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        640, 480, 30,
    )])));
    assert_eq!(manager.state(), WebcamState::Disconnected);

    let info = manager.connect(0).await.unwrap();
    assert_eq!(manager.state(), WebcamState::Connected);
    assert_eq!(info.width, 640);
    assert_eq!(manager.device_info().unwrap().index, 0);

    manager.disconnect().await;
    assert_eq!(manager.state(), WebcamState::Disconnected);
    assert!(manager.device_info().is_none());
}

#[tokio::test]
async fn test_connect_rejects_blind_camera() {
    let mut manager =
        WebcamManager::new(Box::new(FakeCameraBackend::new(vec![
            FakeCameraScript::OpensButBlind,
        ])));
    let err = manager.connect(0).await.unwrap_err();
    assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    assert_eq!(manager.state(), WebcamState::Disconnected);
}

#[tokio::test]
async fn test_preview_streams_frames() {
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        320, 240, 30,
    )])));
    manager.connect(0).await.unwrap();

    let mut frames = manager.start_preview().await.unwrap();
    assert_eq!(manager.state(), WebcamState::Previewing);

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("preview frame within deadline")
        .expect("channel open while previewing");
    assert_eq!(frame.width, 320);
    assert_eq!(frame.height, 240);

    manager.stop_preview().await;
    assert_eq!(manager.state(), WebcamState::Connected);
}

#[tokio::test]
async fn test_capture_requires_connection() {
    let counters = Arc::new(Counters::default());
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![])));

    let err = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out.mp4"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
}

#[tokio::test]
async fn test_capture_writes_frames_and_reports() {
    let counters = Arc::new(Counters::default());
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        640, 480, 30,
    )])));
    manager.connect(0).await.unwrap();

    let _events = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out.mp4"),
        )
        .await
        .unwrap();
    assert_eq!(manager.state(), WebcamState::Capturing);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = manager.stop_capture().await.expect("capture ran");

    assert!(report.error.is_none());
    assert!(report.frame_count > 0);
    assert_eq!(report.frame_count, counters.frames_written.load(Ordering::SeqCst));
    assert_eq!(counters.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), WebcamState::Connected);
}

#[tokio::test]
async fn test_capture_cannot_restart_within_session() {
    let counters = Arc::new(Counters::default());
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        640, 480, 30,
    )])));
    manager.connect(0).await.unwrap();

    let _events = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out.mp4"),
        )
        .await
        .unwrap();

    let err = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out2.mp4"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::CaptureFailure(_)));

    manager.stop_capture().await;
    let err = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out3.mp4"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::CaptureFailure(_)));
}

#[tokio::test]
async fn test_capture_alongside_preview() {
    let counters = Arc::new(Counters::default());
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        320, 240, 30,
    )])));
    manager.connect(0).await.unwrap();

    let mut preview = manager.start_preview().await.unwrap();
    let _events = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out.mp4"),
        )
        .await
        .unwrap();
    assert_eq!(manager.state(), WebcamState::Capturing);

    // Preview keeps flowing while capturing.
    let frame = tokio::time::timeout(Duration::from_secs(2), preview.recv())
        .await
        .expect("preview frame while capturing");
    assert!(frame.is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let report = manager.stop_capture().await.unwrap();
    assert!(report.frame_count > 0);
    assert_eq!(manager.state(), WebcamState::Previewing);
}

#[tokio::test]
async fn test_sustained_device_failure_halts_capture() {
    let counters = Arc::new(Counters::default());
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![
        FakeCameraScript::DiesAfter { good_frames: 3 },
    ])));
    manager.connect(0).await.unwrap();

    let _events = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out.mp4"),
        )
        .await
        .unwrap();

    // Connect consumed one good read; the loop gets two more, then the
    // device fails until the threshold trips.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_ne!(manager.state(), WebcamState::Capturing, "loop must halt itself");
    assert!(manager.last_error().is_some());

    let report = manager.stop_capture().await.unwrap();
    assert!(report.error.is_some());
    assert!(!report.is_valid_artifact());
    assert_eq!(counters.finishes.load(Ordering::SeqCst), 1, "sink still finalized");
}

#[tokio::test]
async fn test_sustained_write_failure_halts_capture() {
    // The device keeps delivering frames; only the encoder is broken. The
    // failure counter must still reach the threshold and halt the loop.
    let counters = Arc::new(Counters::default());
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        640, 480, 30,
    )])));
    manager.connect(0).await.unwrap();

    let broken_sink = Box::new(FakeSink {
        counters: Arc::clone(&counters),
        fail_writes: true,
    });
    let _events = manager
        .start_capture(
            broken_sink,
            bound_clock(),
            std::path::PathBuf::from("out.mp4"),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_ne!(
        manager.state(),
        WebcamState::Capturing,
        "sustained write failure must halt the loop"
    );
    assert!(manager.last_error().is_some());

    let report = manager.stop_capture().await.unwrap();
    assert!(report.error.is_some());
    assert_eq!(report.frame_count, 0);
    assert!(!report.is_valid_artifact());
}

#[tokio::test]
async fn test_set_resolution_rejected_while_capturing() {
    let counters = Arc::new(Counters::default());
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        640, 480, 30,
    )])));
    manager.connect(0).await.unwrap();

    manager.set_resolution(1280, 720).unwrap();
    assert_eq!(manager.device_info().unwrap().width, 1280);

    let _events = manager
        .start_capture(
            sink(&counters),
            bound_clock(),
            std::path::PathBuf::from("out.mp4"),
        )
        .await
        .unwrap();

    let err = manager.set_resolution(640, 480).unwrap_err();
    assert!(matches!(err, CaptureError::CaptureFailure(_)));
    manager.stop_capture().await;
}

#[tokio::test]
async fn test_snapshot_outside_capture() {
    let mut manager = WebcamManager::new(Box::new(FakeCameraBackend::new(vec![works(
        800, 600, 30,
    )])));

    assert!(manager.snapshot().is_err(), "no device, no snapshot");

    manager.connect(0).await.unwrap();
    let frame = manager.snapshot().unwrap();
    assert_eq!(frame.width, 800);
    assert_eq!(frame.height, 600);
}
