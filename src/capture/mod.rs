//! Multi-stream frame capture.
//!
//! A capture unit is one independent grab/encode loop: the screen-region
//! recorder over the input box, or the webcam stream (either written
//! directly to an encoder, or mirrored through a second region unit over
//! the preview surface so both streams drift identically).

pub mod encoder;
pub mod frame;
pub mod grabber;
pub mod pipeline;
pub mod unit;
pub mod webcam;

pub use encoder::{find_ffmpeg, FfmpegEncoder, FrameSink};
pub use frame::{Region, VideoFrame, MAX_REGION_DIMENSION};
pub use grabber::{FrameGrabber, ScreenGrabber};
pub use pipeline::{CapturePipeline, FfmpegPipeline};
pub use unit::{
    CaptureConfig, CaptureEvent, CaptureReport, RegionCapture, DEFAULT_MAX_CONSECUTIVE_FAILURES,
};
pub use webcam::{
    discover_devices, CameraBackend, CameraDevice, DeviceInfo, NokhwaBackend, WebcamManager,
    WebcamState, DEFAULT_PROBE_LIMIT,
};
