use super::artifact::SessionRecord;
use super::config::{SessionConfig, WebcamMode};
use super::question::Question;
use crate::capture::pipeline::CapturePipeline;
use crate::capture::unit::{CaptureConfig, CaptureEvent, CaptureReport, RegionCapture};
use crate::capture::webcam::{WebcamManager, WebcamState};
use crate::capture::Region;
use crate::clock::ClockSource;
use crate::error::CaptureError;
use crate::keystroke::{FocusHandle, FocusSource, KeystrokeLog, KeystrokeSource};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Lifecycle of one recording session.
///
/// `Stopping` exists so that a submit in flight is observable: the streams
/// are winding down and no new events are accepted, but the artifact has
/// not been written yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Collecting,
    Stopping,
}

/// Supplies the screen rectangles the orchestrator records, in virtual
/// desktop coordinates. Backed by the embedding UI in production; tests
/// supply fixed rectangles.
pub trait RegionProvider: Send {
    /// The rectangle around the focused input surface.
    fn input_box_region(&self) -> Result<Region, CaptureError>;

    /// The on-screen rectangle of the webcam preview surface, for
    /// mirror-mode recording.
    fn webcam_display_region(&self) -> Result<Region, CaptureError>;
}

/// Output file locations for one session, allocated together so the video
/// and record files share a timestamp stem.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub screen_video: PathBuf,
    pub webcam_video: PathBuf,
    pub record: PathBuf,
}

impl SessionPaths {
    /// Allocate a path set under `dir` keyed by epoch seconds. If a session
    /// already used this second, disambiguate with a short random suffix
    /// rather than overwriting it.
    pub fn allocate(dir: &std::path::Path, epoch_secs: i64) -> Self {
        let mut stem = format!("{epoch_secs}");
        if dir.join(format!("sample_{stem}.json")).exists() {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            stem = format!("{epoch_secs}_{}", &suffix[..8]);
        }
        Self {
            screen_video: dir.join(format!("sample_{stem}.mp4")),
            webcam_video: dir.join(format!("webcam_{stem}.mp4")),
            record: dir.join(format!("sample_{stem}.json")),
        }
    }
}

/// Live event receivers handed back when collection starts. The caller may
/// consume them for progress display or drop them; the streams do not block
/// on the channel.
#[derive(Debug)]
pub struct StreamEvents {
    pub screen: mpsc::UnboundedReceiver<CaptureEvent>,
    pub webcam: Option<mpsc::UnboundedReceiver<CaptureEvent>>,
}

/// Everything produced by a completed session.
#[derive(Debug)]
pub struct SessionOutcome {
    pub record_path: PathBuf,
    pub record: SessionRecord,
    pub screen_report: CaptureReport,
    pub webcam_report: Option<CaptureReport>,
    /// Non-fatal problems observed during the session (webcam stream lost,
    /// mirror region unavailable), in occurrence order.
    pub diagnostics: Vec<String>,
}

/// Drives one session end to end: arms with a question, fans capture out
/// across the screen unit, the webcam, and the keystroke log against one
/// shared clock, then collapses everything into a single saved artifact.
///
/// The screen stream is the authoritative one. Losing the webcam degrades
/// the session; losing the screen stream aborts collection back to `Armed`.
pub struct SessionOrchestrator {
    config: SessionConfig,
    state: SessionState,
    clock: Arc<ClockSource>,
    log: Arc<KeystrokeLog>,
    source: Box<dyn KeystrokeSource>,
    focus_handle: FocusHandle,
    pipeline: Box<dyn CapturePipeline>,
    regions: Box<dyn RegionProvider>,
    webcam: Option<WebcamManager>,
    screen_unit: Option<RegionCapture>,
    mirror_unit: Option<RegionCapture>,
    question: Option<Question>,
    paths: Option<SessionPaths>,
    collect_requested_at: Option<f64>,
    diagnostics: Vec<String>,
}

impl SessionOrchestrator {
    pub fn new(
        config: SessionConfig,
        pipeline: Box<dyn CapturePipeline>,
        regions: Box<dyn RegionProvider>,
    ) -> Self {
        let clock = Arc::new(ClockSource::new());
        let log = Arc::new(KeystrokeLog::new(Arc::clone(&clock)));
        let focus = FocusSource::new(Arc::clone(&log));
        let focus_handle = focus.handle();
        Self {
            config,
            state: SessionState::Idle,
            clock,
            log,
            source: Box::new(focus),
            focus_handle,
            pipeline,
            regions,
            webcam: None,
            screen_unit: None,
            mirror_unit: None,
            question: None,
            paths: None,
            collect_requested_at: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn log(&self) -> Arc<KeystrokeLog> {
        Arc::clone(&self.log)
    }

    pub fn clock(&self) -> Arc<ClockSource> {
        Arc::clone(&self.clock)
    }

    /// Handle the embedding UI forwards key/IME events through.
    pub fn focus_handle(&self) -> FocusHandle {
        self.focus_handle.clone()
    }

    /// Swap in a different keystroke backend (e.g. the global hook).
    /// Permitted between sessions or mid-session; a mid-session switch
    /// leaves a small, logged coverage gap.
    pub async fn switch_keystroke_source(&mut self, next: Box<dyn KeystrokeSource>) -> Result<()> {
        crate::keystroke::switch_backend(&mut self.source, next).await
    }

    pub fn attach_webcam(&mut self, manager: WebcamManager) {
        self.webcam = Some(manager);
    }

    pub fn webcam(&self) -> Option<&WebcamManager> {
        self.webcam.as_ref()
    }

    pub fn webcam_mut(&mut self) -> Option<&mut WebcamManager> {
        self.webcam.as_mut()
    }

    /// Bind a question and a fresh clock. Legal only from `Idle`.
    pub fn arm(&mut self, question: Question) -> Result<()> {
        if self.state != SessionState::Idle {
            bail!("cannot arm session from {:?}", self.state);
        }
        let clock = Arc::new(ClockSource::new());
        self.log.rebind_clock(Arc::clone(&clock));
        self.clock = clock;
        self.question = Some(question);
        self.screen_unit = None;
        self.mirror_unit = None;
        self.paths = None;
        self.collect_requested_at = None;
        self.diagnostics.clear();
        self.state = SessionState::Armed;
        info!("Session armed");
        Ok(())
    }

    /// Return to `Idle` without recording anything.
    pub fn disarm(&mut self) -> Result<()> {
        if self.state != SessionState::Armed {
            bail!("cannot disarm session from {:?}", self.state);
        }
        self.question = None;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Begin collecting. Ordering matters and is fixed:
    ///
    /// 1. open the keystroke gate and start the listener, so typing during
    ///    stream spin-up is never lost;
    /// 2. if a webcam preview is live, wait the pre-roll for it to settle;
    /// 3. bind the shared-clock origin;
    /// 4. start the screen unit; failure here aborts back to `Armed`;
    /// 5. start the webcam stream per the configured mode; failure here
    ///    degrades the session and is recorded as a diagnostic.
    pub async fn start_collecting(&mut self) -> Result<StreamEvents> {
        if self.state != SessionState::Armed {
            bail!("cannot start collecting from {:?}", self.state);
        }

        self.collect_requested_at = Some(self.clock.now_epoch());
        self.log.begin_collecting();
        self.source
            .start_listening()
            .await
            .context("starting keystroke source")?;

        let previewing = self
            .webcam
            .as_ref()
            .map(|w| w.state() == WebcamState::Previewing)
            .unwrap_or(false);
        if previewing && !self.config.preroll.is_zero() {
            tokio::time::sleep(self.config.preroll).await;
        }

        let origin = self.clock.bind_origin().context("binding clock origin")?;
        let paths = SessionPaths::allocate(&self.config.output_dir, origin as i64);

        let screen_events = match self.start_screen_unit(&paths) {
            Ok(rx) => rx,
            Err(e) => {
                error!("Screen capture failed to start: {e}");
                let _ = self.source.stop_listening().await;
                self.log.end_collecting();
                self.screen_unit = None;
                // The origin binds once per clock, so a retry of this armed
                // session needs a fresh one.
                let clock = Arc::new(ClockSource::new());
                self.log.rebind_clock(Arc::clone(&clock));
                self.clock = clock;
                self.collect_requested_at = None;
                self.state = SessionState::Armed;
                return Err(e).context("starting screen capture");
            }
        };

        let webcam_events = match self.start_webcam_stream(&paths).await {
            Ok(rx) => rx,
            Err(e) => {
                // The session stands on the screen stream; a webcam that
                // cannot start is noted and skipped.
                warn!("Webcam stream failed to start: {e}");
                self.diagnostics.push(format!("webcam stream unavailable: {e}"));
                None
            }
        };

        self.paths = Some(paths);
        self.state = SessionState::Collecting;
        info!("Session collecting (origin={origin:.3})");
        Ok(StreamEvents {
            screen: screen_events,
            webcam: webcam_events,
        })
    }

    fn start_screen_unit(
        &mut self,
        paths: &SessionPaths,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>, CaptureError> {
        let region = self.regions.input_box_region()?;
        let mut unit = RegionCapture::new(CaptureConfig {
            region,
            fps: self.config.screen_fps,
            output_path: paths.screen_video.clone(),
            max_consecutive_failures: self.config.max_consecutive_failures,
        });
        let rx = unit.start(Arc::clone(&self.clock), self.pipeline.as_mut())?;
        self.screen_unit = Some(unit);
        Ok(rx)
    }

    async fn start_webcam_stream(
        &mut self,
        paths: &SessionPaths,
    ) -> Result<Option<mpsc::UnboundedReceiver<CaptureEvent>>, CaptureError> {
        match self.config.webcam_mode {
            WebcamMode::Direct => {
                let Some(webcam) = self.webcam.as_mut() else {
                    return Ok(None);
                };
                if !webcam.is_connected() {
                    return Ok(None);
                }
                let info = webcam
                    .device_info()
                    .cloned()
                    .ok_or_else(|| CaptureError::DeviceUnavailable("no device info".into()))?;
                let sink = self.pipeline.open_webcam_sink(
                    &paths.webcam_video,
                    info.width,
                    info.height,
                    info.fps.max(1),
                )?;
                let rx = webcam
                    .start_capture(sink, Arc::clone(&self.clock), paths.webcam_video.clone())
                    .await?;
                Ok(Some(rx))
            }
            WebcamMode::RegionMirror => {
                let region = self.regions.webcam_display_region()?;
                let mut unit = RegionCapture::new(CaptureConfig {
                    region,
                    fps: self.config.webcam_fps,
                    output_path: paths.webcam_video.clone(),
                    max_consecutive_failures: self.config.max_consecutive_failures,
                });
                let rx = unit.start(Arc::clone(&self.clock), self.pipeline.as_mut())?;
                self.mirror_unit = Some(unit);
                Ok(Some(rx))
            }
        }
    }

    /// Finalize the session with the submitted text: stop event intake
    /// first, wind the streams down, then write the artifact.
    pub async fn submit(&mut self, final_text: &str) -> Result<SessionOutcome> {
        if self.state != SessionState::Collecting {
            bail!("cannot submit from {:?}", self.state);
        }
        self.state = SessionState::Stopping;

        // Intake closes before the streams so nothing trickles in while
        // encoders finalize.
        if let Err(e) = self.source.stop_listening().await {
            warn!("Keystroke source stop failed: {e}");
        }
        self.log.end_collecting();

        let screen_report = match self.screen_unit.as_mut() {
            Some(unit) => unit.stop().await,
            None => bail!("collecting session has no screen unit"),
        };

        let webcam_report = self.stop_webcam_stream().await;

        let (keystrokes, raw_keystrokes) = self.log.drain();
        let paths = self
            .paths
            .clone()
            .context("collecting session has no output paths")?;
        let question = self
            .question
            .clone()
            .context("collecting session has no question")?;

        if let Some(msg) = &screen_report.error {
            self.diagnostics.push(format!("screen stream error: {msg}"));
        }
        let webcam_video_path = match &webcam_report {
            Some(report) if report.is_valid_artifact() => {
                Some(report.output_path.to_string_lossy().into_owned())
            }
            Some(report) => {
                if let Some(msg) = &report.error {
                    self.diagnostics.push(format!("webcam stream error: {msg}"));
                }
                None
            }
            None => None,
        };

        let recording_start_time = self
            .clock
            .origin()
            .or(self.collect_requested_at)
            .unwrap_or_else(|| self.clock.now_epoch());

        let record = SessionRecord {
            question,
            user_input: final_text.to_string(),
            keystrokes,
            raw_keystrokes,
            recording_start_time,
            timestamp: self.clock.now_epoch(),
            screen_video_path: paths.screen_video.to_string_lossy().into_owned(),
            webcam_video_path,
        };
        record.save(&paths.record)?;

        self.question = None;
        self.paths = None;
        self.state = SessionState::Idle;
        info!(
            "Session complete: {} input events, {} raw events, screen frames={}",
            record.keystrokes.len(),
            record.raw_keystrokes.len(),
            screen_report.frame_count
        );

        Ok(SessionOutcome {
            record_path: paths.record,
            record,
            screen_report,
            webcam_report,
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }

    /// Tear the session down without writing an artifact. Stream output
    /// files already on disk are left in place.
    pub async fn abort(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => return Ok(()),
            SessionState::Armed => return self.disarm(),
            SessionState::Collecting | SessionState::Stopping => {}
        }
        self.state = SessionState::Stopping;

        let _ = self.source.stop_listening().await;
        self.log.end_collecting();
        if let Some(unit) = self.screen_unit.as_mut() {
            unit.stop().await;
        }
        self.stop_webcam_stream().await;
        self.log.drain();

        self.question = None;
        self.paths = None;
        self.diagnostics.clear();
        self.state = SessionState::Idle;
        info!("Session aborted");
        Ok(())
    }

    async fn stop_webcam_stream(&mut self) -> Option<CaptureReport> {
        match self.config.webcam_mode {
            WebcamMode::Direct => match self.webcam.as_mut() {
                Some(webcam) => webcam.stop_capture().await,
                None => None,
            },
            WebcamMode::RegionMirror => match self.mirror_unit.as_mut() {
                Some(unit) => Some(unit.stop().await),
                None => None,
            },
        }
    }
}
