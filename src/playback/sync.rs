use crate::keystroke::InputKeystroke;
use std::time::Duration;
use tracing::debug;

/// One recorded video stream's timeline: a frame count at a nominal rate.
///
/// Frame/time conversion always goes through seconds, never through frame
/// indices, so two streams at different rates stay aligned (frame 150 of a
/// 15 fps stream is the same instant as frame 300 of a 30 fps one).
#[derive(Debug, Clone, Copy)]
pub struct StreamTimeline {
    fps: f64,
    total_frames: u64,
}

impl StreamTimeline {
    pub fn new(fps: f64, total_frames: u64) -> Self {
        Self {
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 1.0 },
            total_frames,
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn frame_to_time(&self, frame: u64) -> f64 {
        frame as f64 / self.fps
    }

    /// Nearest frame for a media time, clamped to the stream's range.
    pub fn time_to_frame(&self, time_secs: f64) -> u64 {
        if self.total_frames == 0 {
            return 0;
        }
        let frame = (time_secs.max(0.0) * self.fps).round() as u64;
        frame.min(self.total_frames - 1)
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / self.fps
    }

    pub fn last_frame(&self) -> u64 {
        self.total_frames.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    Screen,
    Webcam,
}

/// Snapshot of the playback position, for display surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    pub screen_frame: u64,
    pub webcam_frame: u64,
    pub time_secs: f64,
    pub speed: f64,
    pub sync_enabled: bool,
}

/// Replays a session's streams in lockstep.
///
/// The screen stream is authoritative for total duration. Seeking either
/// stream converts through elapsed media time and, when sync is enabled,
/// repositions the other stream to the same instant. The speed multiplier
/// scales only the inter-frame delay; frame-to-time mapping is unaffected,
/// so event lookup stays correct at any speed.
pub struct PlaybackSynchronizer {
    screen: StreamTimeline,
    webcam: Option<StreamTimeline>,
    /// Replay events sorted by origin-relative timestamp.
    events: Vec<InputKeystroke>,
    screen_frame: u64,
    webcam_frame: u64,
    speed: f64,
    sync_enabled: bool,
}

impl PlaybackSynchronizer {
    pub fn new(
        screen: StreamTimeline,
        webcam: Option<StreamTimeline>,
        mut events: Vec<InputKeystroke>,
    ) -> Self {
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self {
            screen,
            webcam,
            events,
            screen_frame: 0,
            webcam_frame: 0,
            speed: 1.0,
            sync_enabled: true,
        }
    }

    pub fn screen_frame(&self) -> u64 {
        self.screen_frame
    }

    pub fn webcam_frame(&self) -> u64 {
        self.webcam_frame
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        } else {
            debug!("Ignoring non-positive playback speed {speed}");
        }
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    pub fn set_sync_enabled(&mut self, enabled: bool) {
        self.sync_enabled = enabled;
    }

    /// Total playback duration, taken from the screen stream.
    pub fn duration_secs(&self) -> f64 {
        self.screen.duration_secs()
    }

    /// Current media time, from the screen cursor.
    pub fn current_time(&self) -> f64 {
        self.screen.frame_to_time(self.screen_frame)
    }

    pub fn cursor(&self) -> PlaybackCursor {
        PlaybackCursor {
            screen_frame: self.screen_frame,
            webcam_frame: self.webcam_frame,
            time_secs: self.current_time(),
            speed: self.speed,
            sync_enabled: self.sync_enabled,
        }
    }

    /// Position one stream at a frame. With sync enabled the other stream
    /// follows to the equivalent media time; with it disabled the streams
    /// scrub independently.
    pub fn seek_frame(&mut self, stream: StreamId, frame: u64) {
        match stream {
            StreamId::Screen => {
                self.screen_frame = frame.min(self.screen.last_frame());
                if self.sync_enabled {
                    if let Some(webcam) = &self.webcam {
                        let t = self.screen.frame_to_time(self.screen_frame);
                        self.webcam_frame = webcam.time_to_frame(t);
                    }
                }
            }
            StreamId::Webcam => {
                let Some(webcam) = &self.webcam else { return };
                self.webcam_frame = frame.min(webcam.last_frame());
                if self.sync_enabled {
                    let t = webcam.frame_to_time(self.webcam_frame);
                    self.screen_frame = self.screen.time_to_frame(t);
                }
            }
        }
    }

    /// Seek both streams to a media time.
    pub fn seek_time(&mut self, time_secs: f64) {
        self.screen_frame = self.screen.time_to_frame(time_secs);
        if let Some(webcam) = &self.webcam {
            self.webcam_frame = webcam.time_to_frame(time_secs);
        }
    }

    /// Move playback forward by a span of media time.
    pub fn advance(&mut self, dt_secs: f64) {
        self.seek_time(self.current_time() + dt_secs.max(0.0));
    }

    /// Advance the screen cursor by one frame, dragging the webcam along.
    /// Returns false once the end of the screen stream is reached.
    pub fn step(&mut self) -> bool {
        if self.screen_frame >= self.screen.last_frame() {
            return false;
        }
        self.seek_frame(StreamId::Screen, self.screen_frame + 1);
        true
    }

    /// How long to show the current frame of a stream before advancing,
    /// scaled by the speed multiplier.
    pub fn frame_delay(&self, stream: StreamId) -> Duration {
        let fps = match stream {
            StreamId::Screen => self.screen.fps(),
            StreamId::Webcam => self.webcam.map(|w| w.fps()).unwrap_or(self.screen.fps()),
        };
        Duration::from_secs_f64(1.0 / fps / self.speed)
    }

    /// The event whose interval covers the current media time: the last
    /// event at or before the cursor. The final event's interval extends to
    /// the end of playback.
    pub fn active_event(&self) -> Option<&InputKeystroke> {
        let t = self.current_time();
        let idx = self.events.partition_point(|e| e.timestamp <= t);
        if idx == 0 {
            None
        } else {
            self.events.get(idx - 1)
        }
    }

    /// Number of events at or before the current media time, i.e. how much
    /// of the transcript has "happened" at the cursor.
    pub fn events_elapsed(&self) -> usize {
        let t = self.current_time();
        self.events.partition_point(|e| e.timestamp <= t)
    }

    pub fn events(&self) -> &[InputKeystroke] {
        &self.events
    }
}
