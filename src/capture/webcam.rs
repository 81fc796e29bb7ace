use crate::capture::encoder::FrameSink;
use crate::capture::frame::VideoFrame;
use crate::capture::unit::{CaptureEvent, CaptureReport, DEFAULT_MAX_CONSECUTIVE_FAILURES};
use crate::clock::ClockSource;
use crate::error::CaptureError;
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How many device indices discovery probes by default.
pub const DEFAULT_PROBE_LIMIT: u32 = 10;

/// A workable camera device found during discovery.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// An open camera handle. Owned by exactly one `WebcamManager` at a time.
pub trait CameraDevice: Send {
    fn read_frame(&mut self) -> Result<VideoFrame>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn fps(&self) -> u32;
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<()>;
}

/// Opens camera devices by index. The seam that lets tests run the webcam
/// state machine with scripted cameras.
pub trait CameraBackend: Send {
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError>;
}

/// Probe a bounded range of device indices and report every device that can
/// actually deliver a frame (an "open" that cannot read is not workable).
///
/// Permission denial aborts the probe with a distinguishable error; a device
/// that merely fails to open is skipped.
pub fn discover_devices(
    backend: &dyn CameraBackend,
    probe_limit: u32,
) -> Result<Vec<DeviceInfo>, CaptureError> {
    let mut devices = Vec::new();
    for index in 0..probe_limit {
        match backend.open(index) {
            Ok(mut device) => {
                if device.read_frame().is_ok() {
                    devices.push(DeviceInfo {
                        index,
                        width: device.width(),
                        height: device.height(),
                        fps: device.fps(),
                    });
                } else {
                    debug!("Camera {index} opened but cannot read frames, skipping");
                }
            }
            Err(CaptureError::PermissionDenied) => return Err(CaptureError::PermissionDenied),
            Err(e) => {
                debug!("Camera {index} not available: {e}");
            }
        }
    }
    info!("Webcam discovery found {} device(s)", devices.len());
    Ok(devices)
}

/// Connection states of the webcam stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebcamState {
    Disconnected,
    Connected,
    Previewing,
    Capturing,
}

#[derive(Default)]
struct SharedSlots {
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    clock: Mutex<Option<Arc<ClockSource>>>,
    preview_tx: Mutex<Option<mpsc::Sender<VideoFrame>>>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>,
    error: Mutex<Option<String>>,
}

/// Owns the camera device and runs its frame loop.
///
/// State machine: `Disconnected → Connected → Previewing → Capturing`.
/// Previewing and capturing share one loop; preview frames go to a bounded
/// channel (dropped when the consumer lags), captured frames to the encoder.
/// Sustained read failures halt the loop and surface as the capture report's
/// error, never as a panic or a crashed session.
pub struct WebcamManager {
    backend: Box<dyn CameraBackend>,
    device: Option<Arc<Mutex<Box<dyn CameraDevice>>>>,
    device_info: Option<DeviceInfo>,
    previewing: Arc<AtomicBool>,
    capturing: Arc<AtomicBool>,
    slots: Arc<SharedSlots>,
    capture_frames: Arc<AtomicUsize>,
    capture_started: Option<Instant>,
    capture_output: Option<PathBuf>,
    max_consecutive_failures: u32,
    loop_handle: Option<JoinHandle<()>>,
}

impl WebcamManager {
    pub fn new(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            backend,
            device: None,
            device_info: None,
            previewing: Arc::new(AtomicBool::new(false)),
            capturing: Arc::new(AtomicBool::new(false)),
            slots: Arc::new(SharedSlots::default()),
            capture_frames: Arc::new(AtomicUsize::new(0)),
            capture_started: None,
            capture_output: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            loop_handle: None,
        }
    }

    pub fn state(&self) -> WebcamState {
        if self.device.is_none() {
            WebcamState::Disconnected
        } else if self.capturing.load(Ordering::SeqCst) {
            WebcamState::Capturing
        } else if self.previewing.load(Ordering::SeqCst) {
            WebcamState::Previewing
        } else {
            WebcamState::Connected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Last frame-loop error, if the loop halted on sustained failure.
    pub fn last_error(&self) -> Option<String> {
        self.slots.error.lock().unwrap().clone()
    }

    /// Open a device by index. A successful open must be able to read an
    /// actual frame; reconnecting implies disconnecting the old device first.
    pub async fn connect(&mut self, index: u32) -> Result<DeviceInfo, CaptureError> {
        if self.device.is_some() {
            self.disconnect().await;
        }

        let mut device = self.backend.open(index)?;
        device.read_frame().map_err(|e| {
            CaptureError::DeviceUnavailable(format!("camera {index} cannot read frames: {e}"))
        })?;

        let info = DeviceInfo {
            index,
            width: device.width(),
            height: device.height(),
            fps: device.fps(),
        };
        info!(
            "Camera {} connected: {}x{} @ {}fps",
            index, info.width, info.height, info.fps
        );

        self.device = Some(Arc::new(Mutex::new(device)));
        self.device_info = Some(info.clone());
        *self.slots.error.lock().unwrap() = None;
        Ok(info)
    }

    /// Release the device, stopping capture and preview first.
    pub async fn disconnect(&mut self) {
        self.stop_capture().await;
        self.stop_preview().await;
        if self.device.take().is_some() {
            info!("Camera disconnected");
        }
        self.device_info = None;
    }

    /// Begin the background preview loop, returning the live-frame channel.
    pub async fn start_preview(&mut self) -> Result<mpsc::Receiver<VideoFrame>, CaptureError> {
        match self.state() {
            WebcamState::Disconnected => {
                return Err(CaptureError::DeviceUnavailable("no camera connected".into()))
            }
            WebcamState::Previewing | WebcamState::Capturing if self.previewing.load(Ordering::SeqCst) => {
                return Err(CaptureError::CaptureFailure("preview already running".into()))
            }
            _ => {}
        }

        let (tx, rx) = mpsc::channel(4);
        *self.slots.preview_tx.lock().unwrap() = Some(tx);
        self.previewing.store(true, Ordering::SeqCst);
        self.ensure_loop();
        Ok(rx)
    }

    pub async fn stop_preview(&mut self) {
        self.previewing.store(false, Ordering::SeqCst);
        *self.slots.preview_tx.lock().unwrap() = None;
        self.join_loop_if_idle().await;
    }

    /// Start writing frames to an encoder (direct recording mode).
    ///
    /// Legal only from `Connected` or `Previewing`; a unit that already
    /// captured cannot be restarted within the session.
    pub async fn start_capture(
        &mut self,
        sink: Box<dyn FrameSink>,
        clock: Arc<ClockSource>,
        output_path: PathBuf,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError> {
        match self.state() {
            WebcamState::Disconnected => {
                return Err(CaptureError::DeviceUnavailable("no camera connected".into()))
            }
            WebcamState::Capturing => {
                return Err(CaptureError::CaptureFailure("capture already running".into()))
            }
            _ => {}
        }
        if self.capture_output.is_some() {
            return Err(CaptureError::CaptureFailure(
                "webcam capture cannot be restarted within a session".into(),
            ));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(CaptureEvent::Started);

        *self.slots.sink.lock().unwrap() = Some(sink);
        *self.slots.clock.lock().unwrap() = Some(clock);
        *self.slots.events_tx.lock().unwrap() = Some(events_tx);
        self.capture_frames.store(0, Ordering::SeqCst);
        self.capture_started = Some(Instant::now());
        self.capture_output = Some(output_path);
        self.capturing.store(true, Ordering::SeqCst);
        self.ensure_loop();

        info!("Webcam capture started: {}", self.capture_output.as_ref().unwrap().display());
        Ok(events_rx)
    }

    /// Stop capturing and finalize the encoder. `None` if no capture was
    /// ever started this session; idempotent otherwise is handled by the
    /// orchestrator caching the report.
    pub async fn stop_capture(&mut self) -> Option<CaptureReport> {
        let output_path = self.capture_output.clone()?;
        self.capturing.store(false, Ordering::SeqCst);
        self.join_loop_if_idle().await;

        let mut error = self.slots.error.lock().unwrap().clone();
        if let Some(mut sink) = self.slots.sink.lock().unwrap().take() {
            if let Err(e) = sink.finish() {
                warn!("Webcam encoder finalization failed: {e}");
                error.get_or_insert_with(|| format!("encoder finalization failed: {e}"));
            }
        }
        *self.slots.clock.lock().unwrap() = None;

        let report = CaptureReport {
            frame_count: self.capture_frames.load(Ordering::SeqCst),
            duration_secs: self
                .capture_started
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            fps: self.device_info.as_ref().map(|d| d.fps).unwrap_or(0),
            output_path,
            error,
        };

        if let Some(tx) = self.slots.events_tx.lock().unwrap().take() {
            let _ = tx.send(CaptureEvent::Stopped(report.clone()));
        }

        info!(
            "Webcam capture stopped: {} frames, error={:?}",
            report.frame_count, report.error
        );
        Some(report)
    }

    /// Grab a single still frame outside the capture path.
    pub fn snapshot(&self) -> Result<VideoFrame, CaptureError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no camera connected".into()))?;
        device
            .lock()
            .unwrap()
            .read_frame()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("snapshot failed: {e}")))
    }

    /// Reconfiguring the sensor mid-capture would change frame geometry
    /// under the encoder; rejected outright.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(CaptureError::CaptureFailure(
                "cannot change resolution while capturing".into(),
            ));
        }
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no camera connected".into()))?;
        let mut guard = device.lock().unwrap();
        guard
            .set_resolution(width, height)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("set_resolution failed: {e}")))?;
        if let Some(info) = self.device_info.as_mut() {
            info.width = guard.width();
            info.height = guard.height();
        }
        Ok(())
    }

    fn ensure_loop(&mut self) {
        let already_running = self
            .loop_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        if already_running {
            return;
        }

        let device = match &self.device {
            Some(d) => Arc::clone(d),
            None => return,
        };
        let previewing = Arc::clone(&self.previewing);
        let capturing = Arc::clone(&self.capturing);
        let slots = Arc::clone(&self.slots);
        let capture_frames = Arc::clone(&self.capture_frames);
        let fps = self.device_info.as_ref().map(|d| d.fps.max(1)).unwrap_or(30);
        let max_failures = self.max_consecutive_failures;

        self.loop_handle = Some(tokio::task::spawn_blocking(move || {
            frame_loop(device, previewing, capturing, slots, capture_frames, fps, max_failures)
        }));
    }

    async fn join_loop_if_idle(&mut self) {
        let idle = !self.previewing.load(Ordering::SeqCst) && !self.capturing.load(Ordering::SeqCst);
        if idle {
            if let Some(handle) = self.loop_handle.take() {
                if let Err(e) = handle.await {
                    warn!("Webcam frame loop panicked: {e}");
                }
            }
        }
    }
}

fn frame_loop(
    device: Arc<Mutex<Box<dyn CameraDevice>>>,
    previewing: Arc<AtomicBool>,
    capturing: Arc<AtomicBool>,
    slots: Arc<SharedSlots>,
    capture_frames: Arc<AtomicUsize>,
    fps: u32,
    max_failures: u32,
) {
    let frame_interval = Duration::from_secs_f64(1.0 / fps as f64);
    let mut consecutive_failures: u32 = 0;

    while previewing.load(Ordering::SeqCst) || capturing.load(Ordering::SeqCst) {
        let iter_start = Instant::now();

        let grabbed = device.lock().unwrap().read_frame();
        match grabbed {
            Ok(mut frame) => {
                if let Some(clock) = slots.clock.lock().unwrap().as_ref() {
                    frame.timestamp_ms = clock
                        .elapsed_since_origin()
                        .map(|s| (s.max(0.0) * 1000.0) as u64)
                        .unwrap_or(0);
                }

                if previewing.load(Ordering::SeqCst) {
                    if let Some(tx) = slots.preview_tx.lock().unwrap().as_ref() {
                        // Preview is best-effort display: drop frames when
                        // the consumer lags rather than block the loop.
                        let _ = tx.try_send(frame.clone());
                    }
                }

                if capturing.load(Ordering::SeqCst) {
                    // While capturing, only a successful write counts as
                    // success; a readable device feeding a dead encoder is
                    // still a failing stream.
                    let mut sink_guard = slots.sink.lock().unwrap();
                    if let Some(sink) = sink_guard.as_mut() {
                        match sink.write_frame(&frame) {
                            Ok(()) => {
                                consecutive_failures = 0;
                                capture_frames.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => {
                                consecutive_failures += 1;
                                warn!("Webcam frame write failed ({consecutive_failures} consecutive): {e}");
                            }
                        }
                    }
                } else {
                    consecutive_failures = 0;
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!("Webcam frame read failed ({consecutive_failures} consecutive): {e}");
            }
        }

        if consecutive_failures >= max_failures {
            let msg = format!("sustained webcam failure after {consecutive_failures} attempts");
            tracing::error!("{msg}");
            *slots.error.lock().unwrap() = Some(msg.clone());
            if let Some(tx) = slots.events_tx.lock().unwrap().as_ref() {
                let _ = tx.send(CaptureEvent::Error(msg));
            }
            // Halt the device loop entirely; the session continues on the
            // other streams.
            previewing.store(false, Ordering::SeqCst);
            capturing.store(false, Ordering::SeqCst);
            break;
        }

        let elapsed = iter_start.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }
}

// ---- nokhwa-backed implementation ----

/// Production camera backend over the platform capture API.
pub struct NokhwaBackend;

impl CameraBackend for NokhwaBackend {
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| classify_nokhwa_error(index, &e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| classify_nokhwa_error(index, &e.to_string()))?;
        Ok(Box::new(NokhwaDevice { camera }))
    }
}

fn classify_nokhwa_error(index: u32, message: &str) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(format!("camera {index}: {message}"))
    }
}

struct NokhwaDevice {
    camera: Camera,
}

impl CameraDevice for NokhwaDevice {
    fn read_frame(&mut self) -> Result<VideoFrame> {
        let buffer = self.camera.frame().context("camera frame read failed")?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("camera frame decode failed")?;
        let (width, height) = (decoded.width(), decoded.height());
        Ok(VideoFrame::new(decoded.into_raw(), width, height, 0))
    }

    fn width(&self) -> u32 {
        self.camera.resolution().width()
    }

    fn height(&self) -> u32 {
        self.camera.resolution().height()
    }

    fn fps(&self) -> u32 {
        self.camera.frame_rate()
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        self.camera
            .set_resolution(Resolution::new(width, height))
            .context("camera resolution change failed")
    }
}
