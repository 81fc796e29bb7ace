use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the webcam stream is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebcamMode {
    /// Camera frames are written straight to an encoder.
    Direct,
    /// The live preview surface's screen rectangle is captured by a second
    /// region unit, so both streams use the identical capture mechanism and
    /// drift identically.
    RegionMirror,
}

/// Per-session recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory session artifacts are written into.
    pub output_dir: PathBuf,

    /// Target frame rate of the screen-region stream.
    pub screen_fps: u32,

    /// Target frame rate of the direct webcam stream.
    pub webcam_fps: u32,

    pub webcam_mode: WebcamMode,

    /// Wait for the webcam preview to visually stabilize before binding the
    /// clock origin, when a preview is live.
    #[serde(with = "duration_ms")]
    pub preroll: Duration,

    /// Consecutive grab/write failures before a capture unit gives up.
    pub max_consecutive_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            screen_fps: 15,
            webcam_fps: 30,
            webcam_mode: WebcamMode::Direct,
            preroll: Duration::from_millis(500),
            max_consecutive_failures: 10,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
