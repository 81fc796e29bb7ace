use crate::capture::frame::{Region, VideoFrame};
use anyhow::{anyhow, Context, Result};
use image::imageops;
use xcap::Monitor;

/// Source of pixel data for a capture region.
///
/// The capture loop drives this once per frame; implementations are expected
/// to return promptly. Sustained failure is handled by the loop's
/// consecutive-failure counter, not here.
pub trait FrameGrabber: Send {
    fn grab(&mut self, region: &Region) -> Result<VideoFrame>;
}

/// Grabs a screen rectangle via the platform screenshot API.
///
/// Each grab captures the monitor containing the region's origin and crops
/// out the requested rectangle. The monitor list is resolved once at
/// construction; displays are not expected to change mid-session.
pub struct ScreenGrabber {
    monitors: Vec<Monitor>,
}

impl ScreenGrabber {
    pub fn new() -> Result<Self> {
        let monitors = Monitor::all().context("failed to enumerate monitors")?;
        if monitors.is_empty() {
            return Err(anyhow!("no monitors available for screen capture"));
        }
        Ok(Self { monitors })
    }

    fn monitor_for(&self, region: &Region) -> &Monitor {
        self.monitors
            .iter()
            .find(|m| {
                region.left >= m.x()
                    && region.left < m.x() + m.width() as i32
                    && region.top >= m.y()
                    && region.top < m.y() + m.height() as i32
            })
            .unwrap_or(&self.monitors[0])
    }
}

impl FrameGrabber for ScreenGrabber {
    fn grab(&mut self, region: &Region) -> Result<VideoFrame> {
        let monitor = self.monitor_for(region);
        let image = monitor
            .capture_image()
            .context("monitor capture failed")?;

        // Region is in global coordinates; the captured image is
        // monitor-local.
        let local_x = (region.left - monitor.x()).max(0) as u32;
        let local_y = (region.top - monitor.y()).max(0) as u32;
        let crop_w = region.width.min(image.width().saturating_sub(local_x));
        let crop_h = region.height.min(image.height().saturating_sub(local_y));
        if crop_w == 0 || crop_h == 0 {
            return Err(anyhow!(
                "region {} lies outside monitor bounds {}x{}",
                region,
                image.width(),
                image.height()
            ));
        }

        let cropped = imageops::crop_imm(&image, local_x, local_y, crop_w, crop_h).to_image();
        let mut rgb = Vec::with_capacity((crop_w * crop_h * 3) as usize);
        for pixel in cropped.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
        }

        Ok(VideoFrame::new(rgb, crop_w, crop_h, 0))
    }
}
