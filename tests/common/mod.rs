// Shared test doubles: scripted grabbers, sinks, pipelines, and cameras so
// capture and session tests run without a display, ffmpeg, or a camera.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use typetrace::capture::encoder::FrameSink;
use typetrace::capture::grabber::FrameGrabber;
use typetrace::capture::pipeline::CapturePipeline;
use typetrace::capture::unit::CaptureConfig;
use typetrace::capture::webcam::{CameraBackend, CameraDevice};
use typetrace::capture::{Region, VideoFrame};
use typetrace::error::CaptureError;

/// Counters shared between a test and the doubles it injects.
#[derive(Default)]
pub struct Counters {
    pub grabs: AtomicUsize,
    pub frames_written: AtomicUsize,
    pub finishes: AtomicUsize,
    pub pipeline_opens: AtomicUsize,
}

/// Grabber that produces blank frames, optionally failing the first
/// `fail_first` grabs or failing forever.
pub struct FakeGrabber {
    pub counters: Arc<Counters>,
    pub fail_first: usize,
    pub fail_always: bool,
}

impl FrameGrabber for FakeGrabber {
    fn grab(&mut self, region: &Region) -> Result<VideoFrame> {
        let n = self.counters.grabs.fetch_add(1, Ordering::SeqCst);
        if self.fail_always || n < self.fail_first {
            return Err(anyhow!("scripted grab failure"));
        }
        Ok(VideoFrame::blank(region.width, region.height))
    }
}

/// Sink that counts writes and finishes. `fail_writes` makes every write
/// fail.
pub struct FakeSink {
    pub counters: Arc<Counters>,
    pub fail_writes: bool,
}

impl FrameSink for FakeSink {
    fn write_frame(&mut self, _frame: &VideoFrame) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("scripted write failure"));
        }
        self.counters.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.counters.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Pipeline handing out fake grabber/sink pairs.
pub struct FakePipeline {
    pub counters: Arc<Counters>,
    pub grab_fail_first: usize,
    pub grab_fail_always: bool,
    pub write_fail_always: bool,
    /// When set, every open fails with this error message.
    pub open_error: Option<String>,
}

impl FakePipeline {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            grab_fail_first: 0,
            grab_fail_always: false,
            write_fail_always: false,
            open_error: None,
        }
    }
}

impl CapturePipeline for FakePipeline {
    fn open_region(
        &mut self,
        _config: &CaptureConfig,
    ) -> Result<(Box<dyn FrameGrabber>, Box<dyn FrameSink>), CaptureError> {
        self.counters.pipeline_opens.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.open_error {
            return Err(CaptureError::EncoderUnavailable(msg.clone()));
        }
        Ok((
            Box::new(FakeGrabber {
                counters: Arc::clone(&self.counters),
                fail_first: self.grab_fail_first,
                fail_always: self.grab_fail_always,
            }),
            Box::new(FakeSink {
                counters: Arc::clone(&self.counters),
                fail_writes: self.write_fail_always,
            }),
        ))
    }

    fn open_webcam_sink(
        &mut self,
        _output_path: &std::path::Path,
        _width: u32,
        _height: u32,
        _fps: u32,
    ) -> Result<Box<dyn FrameSink>, CaptureError> {
        self.counters.pipeline_opens.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.open_error {
            return Err(CaptureError::EncoderUnavailable(msg.clone()));
        }
        Ok(Box::new(FakeSink {
            counters: Arc::clone(&self.counters),
            fail_writes: self.write_fail_always,
        }))
    }
}

/// How a scripted camera behaves on each index.
#[derive(Clone)]
pub enum FakeCameraScript {
    /// Opens and reads frames normally.
    Works { width: u32, height: u32, fps: u32 },
    /// Open succeeds but every frame read fails.
    OpensButBlind,
    /// Open fails as if the device were missing.
    Missing,
    /// Open fails as if the OS denied camera access.
    Denied,
    /// Works for `good_frames` reads, then every read fails.
    DiesAfter { good_frames: usize },
}

pub struct FakeCameraBackend {
    pub scripts: Mutex<Vec<FakeCameraScript>>,
}

impl FakeCameraBackend {
    pub fn new(scripts: Vec<FakeCameraScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
        }
    }
}

impl CameraBackend for FakeCameraBackend {
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(index as usize)
            .cloned()
            .unwrap_or(FakeCameraScript::Missing);
        match script {
            FakeCameraScript::Works { width, height, fps } => Ok(Box::new(FakeCamera {
                width,
                height,
                fps,
                reads: 0,
                blind: false,
                dies_after: None,
            })),
            FakeCameraScript::OpensButBlind => Ok(Box::new(FakeCamera {
                width: 640,
                height: 480,
                fps: 30,
                reads: 0,
                blind: true,
                dies_after: None,
            })),
            FakeCameraScript::DiesAfter { good_frames } => Ok(Box::new(FakeCamera {
                width: 640,
                height: 480,
                fps: 30,
                reads: 0,
                blind: false,
                dies_after: Some(good_frames),
            })),
            FakeCameraScript::Missing => Err(CaptureError::DeviceUnavailable(format!(
                "no camera at index {index}"
            ))),
            FakeCameraScript::Denied => Err(CaptureError::PermissionDenied),
        }
    }
}

pub struct FakeCamera {
    width: u32,
    height: u32,
    fps: u32,
    reads: usize,
    blind: bool,
    dies_after: Option<usize>,
}

impl CameraDevice for FakeCamera {
    fn read_frame(&mut self) -> Result<VideoFrame> {
        let n = self.reads;
        self.reads += 1;
        if self.blind {
            return Err(anyhow!("scripted blind camera"));
        }
        if let Some(limit) = self.dies_after {
            if n >= limit {
                return Err(anyhow!("scripted camera death"));
            }
        }
        Ok(VideoFrame::blank(self.width, self.height))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> u32 {
        self.fps
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }
}
