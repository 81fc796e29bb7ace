use super::sync::StreamTimeline;
use crate::capture::encoder::find_ffmpeg;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Default spacing between scrubber thumbnails.
pub const DEFAULT_THUMBNAIL_INTERVAL_SECS: f64 = 2.0;

/// One planned thumbnail: a frame index and its media time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailPoint {
    pub frame: u64,
    pub time_secs: f64,
}

/// Evenly spaced sample points along a stream for scrubber previews.
/// Always includes time zero; every point's frame index is clamped to the
/// stream's range.
pub fn plan_thumbnails(timeline: &StreamTimeline, interval_secs: f64) -> Vec<ThumbnailPoint> {
    let interval = if interval_secs.is_finite() && interval_secs > 0.0 {
        interval_secs
    } else {
        DEFAULT_THUMBNAIL_INTERVAL_SECS
    };
    let duration = timeline.duration_secs();
    let mut points = Vec::new();
    let mut t = 0.0;
    while t < duration || points.is_empty() {
        points.push(ThumbnailPoint {
            frame: timeline.time_to_frame(t),
            time_secs: t,
        });
        t += interval;
    }
    points
}

/// Extract a single still from a recorded video at a media time, scaled to
/// `width` pixels wide (height follows the aspect ratio).
pub fn extract_thumbnail(
    video: &Path,
    time_secs: f64,
    output: &Path,
    width: u32,
) -> Result<()> {
    let ffmpeg = find_ffmpeg()?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating thumbnail directory {}", parent.display()))?;
    }

    let result = Command::new(&ffmpeg)
        .args([
            "-ss",
            &format!("{time_secs:.3}"),
            "-i",
            &video.to_string_lossy(),
            "-frames:v",
            "1",
            "-vf",
            &format!("scale={width}:-2"),
            "-y",
            &output.to_string_lossy(),
        ])
        .output()
        .with_context(|| format!("running ffmpeg for thumbnail of {}", video.display()))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        bail!(
            "ffmpeg thumbnail extraction failed for {} at {:.3}s: {}",
            video.display(),
            time_secs,
            stderr.trim()
        );
    }
    debug!(video = %video.display(), time_secs, "extracted thumbnail");
    Ok(())
}
