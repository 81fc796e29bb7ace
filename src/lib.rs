pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod keystroke;
pub mod playback;
pub mod session;

pub use capture::{
    CaptureConfig, CaptureEvent, CaptureReport, FfmpegPipeline, Region, RegionCapture, VideoFrame,
    WebcamManager, WebcamState,
};
pub use clock::ClockSource;
pub use config::Config;
pub use error::CaptureError;
pub use keystroke::{GlobalHookSource, KeystrokeLog, KeystrokeSource};
pub use playback::{PlaybackSynchronizer, StreamTimeline};
pub use session::{
    Question, SessionConfig, SessionOrchestrator, SessionRecord, SessionState, WebcamMode,
};
