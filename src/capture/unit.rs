use crate::capture::encoder::FrameSink;
use crate::capture::frame::Region;
use crate::capture::grabber::FrameGrabber;
use crate::capture::pipeline::CapturePipeline;
use crate::clock::ClockSource;
use crate::error::CaptureError;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default consecutive-failure threshold before a unit gives up.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Configuration for one region-capture unit.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub region: Region,
    pub fps: u32,
    pub output_path: PathBuf,
    pub max_consecutive_failures: u32,
}

impl CaptureConfig {
    pub fn new(region: Region, fps: u32, output_path: impl Into<PathBuf>) -> Self {
        Self {
            region,
            fps,
            output_path: output_path.into(),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// Lifecycle notifications emitted by a capture unit. `Stopped` is terminal
/// and emitted at most once; an `Error` always precedes its `Stopped`.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Started,
    Error(String),
    Stopped(CaptureReport),
}

/// Final status of one capture unit, reported to the orchestrator after the
/// loop has exited and the encoder is finalized.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub frame_count: usize,
    pub duration_secs: f64,
    pub fps: u32,
    pub output_path: PathBuf,
    pub error: Option<String>,
}

impl CaptureReport {
    /// Whether the output file can be treated as a valid session artifact.
    pub fn is_valid_artifact(&self) -> bool {
        self.error.is_none() && self.frame_count > 0
    }
}

/// One independent frame-producing loop: grab, defensively resize, encode,
/// pace to the target fps.
///
/// The loop runs as its own blocking task so a slow grab can never stall
/// another stream or the keystroke logger. Stopping is cooperative: the
/// running flag is cleared and the loop observes it at the top of the next
/// iteration, then finalizes the encoder before the report is returned.
pub struct RegionCapture {
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicUsize>,
    handle: Option<JoinHandle<CaptureReport>>,
    report: Option<CaptureReport>,
}

impl RegionCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicUsize::new(0)),
            handle: None,
            report: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count.load(Ordering::SeqCst)
    }

    /// Validate the region, open the pipeline, and launch the capture loop.
    ///
    /// Validation happens before the pipeline is asked for anything, so a
    /// bad rectangle never opens an encoder. A unit that has already run
    /// cannot be restarted within the session.
    pub fn start(
        &mut self,
        clock: Arc<ClockSource>,
        pipeline: &mut dyn CapturePipeline,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError> {
        self.config.region.validate()?;

        if self.handle.is_some() || self.report.is_some() {
            return Err(CaptureError::CaptureFailure(
                "capture unit cannot be restarted within a session".into(),
            ));
        }

        let (grabber, sink) = pipeline.open_region(&self.config)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.running.store(true, Ordering::SeqCst);
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let frame_count = Arc::clone(&self.frame_count);

        info!(
            "Starting region capture: region={}, fps={}, output={}",
            config.region,
            config.fps,
            config.output_path.display()
        );

        self.handle = Some(tokio::task::spawn_blocking(move || {
            capture_loop(config, clock, running, frame_count, events_tx, grabber, sink)
        }));

        Ok(events_rx)
    }

    /// Stop the loop and wait for the encoder to be finalized.
    ///
    /// Idempotent: stopping an already-stopped unit returns the cached
    /// report without touching the encoder again.
    pub async fn stop(&mut self) -> CaptureReport {
        if let Some(report) = &self.report {
            debug!("Capture unit already stopped: {}", self.config.output_path.display());
            return report.clone();
        }

        self.running.store(false, Ordering::SeqCst);

        let report = match self.handle.take() {
            Some(handle) => match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!("Capture loop panicked: {e}");
                    CaptureReport {
                        frame_count: self.frame_count(),
                        duration_secs: 0.0,
                        fps: self.config.fps,
                        output_path: self.config.output_path.clone(),
                        error: Some(format!("capture loop panicked: {e}")),
                    }
                }
            },
            // Never started: an empty report, not an error.
            None => CaptureReport {
                frame_count: 0,
                duration_secs: 0.0,
                fps: self.config.fps,
                output_path: self.config.output_path.clone(),
                error: None,
            },
        };

        self.report = Some(report.clone());
        report
    }
}

fn capture_loop(
    config: CaptureConfig,
    clock: Arc<ClockSource>,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicUsize>,
    events: mpsc::UnboundedSender<CaptureEvent>,
    mut grabber: Box<dyn FrameGrabber>,
    mut sink: Box<dyn FrameSink>,
) -> CaptureReport {
    let started = Instant::now();
    let frame_interval = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
    let mut consecutive_failures: u32 = 0;
    let mut loop_error: Option<String> = None;

    let _ = events.send(CaptureEvent::Started);

    while running.load(Ordering::SeqCst) {
        let iter_start = Instant::now();

        match grabber.grab(&config.region) {
            Ok(mut frame) => {
                if frame.width != config.region.width || frame.height != config.region.height {
                    debug!(
                        "Resizing frame from {}x{} to {}x{}",
                        frame.width, frame.height, config.region.width, config.region.height
                    );
                    frame = frame.resized_to(config.region.width, config.region.height);
                }
                frame.timestamp_ms = clock
                    .elapsed_since_origin()
                    .map(|s| (s.max(0.0) * 1000.0) as u64)
                    .unwrap_or(0);

                match sink.write_frame(&frame) {
                    Ok(()) => {
                        consecutive_failures = 0;
                        let n = frame_count.fetch_add(1, Ordering::SeqCst) + 1;
                        if n % 100 == 0 {
                            debug!("Captured {n} frames: {}", config.output_path.display());
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!(
                            "Frame write failed ({consecutive_failures} consecutive): {e}"
                        );
                        if consecutive_failures >= config.max_consecutive_failures {
                            loop_error = Some(format!("sustained write failure: {e}"));
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!("Frame grab failed ({consecutive_failures} consecutive): {e}");
                if consecutive_failures >= config.max_consecutive_failures {
                    loop_error = Some(format!("sustained grab failure: {e}"));
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
        }

        let elapsed = iter_start.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }

    running.store(false, Ordering::SeqCst);

    if let Err(e) = sink.finish() {
        warn!("Encoder finalization failed: {e}");
        loop_error.get_or_insert_with(|| format!("encoder finalization failed: {e}"));
    }

    let report = CaptureReport {
        frame_count: frame_count.load(Ordering::SeqCst),
        duration_secs: started.elapsed().as_secs_f64(),
        fps: config.fps,
        output_path: config.output_path.clone(),
        error: loop_error,
    };

    match &report.error {
        Some(msg) => {
            error!("Region capture ended with error: {msg}");
            let _ = events.send(CaptureEvent::Error(msg.clone()));
        }
        None => info!(
            "Region capture complete: {} frames, {:.1}s",
            report.frame_count, report.duration_secs
        ),
    }
    let _ = events.send(CaptureEvent::Stopped(report.clone()));

    report
}
