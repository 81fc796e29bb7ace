use crate::capture::encoder::{FfmpegEncoder, FrameSink};
use crate::capture::grabber::{FrameGrabber, ScreenGrabber};
use crate::capture::unit::CaptureConfig;
use crate::error::CaptureError;
use std::path::Path;

/// Builds the grabber/encoder pair for a capture unit.
///
/// The unit validates its region before asking the pipeline for anything,
/// so an invalid rectangle never opens an encoder. Swapping the pipeline
/// is how tests run capture loops without a display or ffmpeg.
pub trait CapturePipeline: Send {
    /// Open the grab side and encode side for a screen-region unit.
    fn open_region(
        &mut self,
        config: &CaptureConfig,
    ) -> Result<(Box<dyn FrameGrabber>, Box<dyn FrameSink>), CaptureError>;

    /// Open an encode-only sink for direct webcam frames.
    fn open_webcam_sink(
        &mut self,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameSink>, CaptureError>;
}

/// Production pipeline: platform screenshot grabs piped into ffmpeg.
pub struct FfmpegPipeline;

impl CapturePipeline for FfmpegPipeline {
    fn open_region(
        &mut self,
        config: &CaptureConfig,
    ) -> Result<(Box<dyn FrameGrabber>, Box<dyn FrameSink>), CaptureError> {
        let grabber = ScreenGrabber::new()
            .map_err(|e| CaptureError::RegionUnavailable(e.to_string()))?;
        let sink = FfmpegEncoder::open(
            &config.output_path,
            config.region.width,
            config.region.height,
            config.fps,
        )?;
        Ok((Box::new(grabber), Box::new(sink)))
    }

    fn open_webcam_sink(
        &mut self,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn FrameSink>, CaptureError> {
        let sink = FfmpegEncoder::open(output_path, width, height, fps)?;
        Ok(Box::new(sink))
    }
}
