use crate::capture::frame::VideoFrame;
use crate::error::CaptureError;
use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered codec preference for the session videos. The first codec whose
/// encoder process opens for writing wins; H.264 gives the best seek
/// behavior during playback, the others are fallbacks for builds of ffmpeg
/// without libx264.
const CODEC_CANDIDATES: &[&str] = &["libx264", "mpeg4", "libxvid"];

/// Destination for encoded frames. One sink has exactly one writer; frame
/// order on the wire is the call order.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Flush and finalize the container. Must be safe to call once; the
    /// owning capture unit guarantees it is not called twice.
    fn finish(&mut self) -> Result<()>;
}

/// Locates the ffmpeg binary.
///
/// Checks standard installation locations first, then falls back to a PATH
/// search, so capture works in environments with a limited PATH.
pub fn find_ffmpeg() -> Result<PathBuf> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/snap/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    } else {
        vec![]
    };

    for path in candidates {
        if path.exists() {
            debug!("Found ffmpeg at: {}", path.display());
            return Ok(path);
        }
    }

    let search_cmd = if cfg!(target_os = "windows") { "where" } else { "which" };
    let output = Command::new(search_cmd)
        .arg("ffmpeg")
        .output()
        .map_err(|e| anyhow!("failed to search PATH for ffmpeg: {e}"))?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        let path = PathBuf::from(path_str.trim());
        if !path.as_os_str().is_empty() {
            debug!("Found ffmpeg in PATH at: {}", path.display());
            return Ok(path);
        }
    }

    Err(anyhow!("ffmpeg not found; install it and ensure it is on PATH"))
}

/// Video encoder backed by an ffmpeg subprocess fed raw RGB24 frames over
/// stdin. One encoder per output file; the capture loop is the single
/// writer.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    output_path: PathBuf,
    width: u32,
    height: u32,
}

impl FfmpegEncoder {
    /// Tries each candidate codec in order; the first whose ffmpeg process
    /// starts and stays alive is used. All failing means the unit cannot
    /// start at all.
    pub fn open(output_path: &Path, width: u32, height: u32, fps: u32) -> Result<Self, CaptureError> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CaptureError::EncoderUnavailable(format!(
                    "cannot create output directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let ffmpeg = find_ffmpeg()
            .map_err(|e| CaptureError::EncoderUnavailable(e.to_string()))?;

        let mut last_error = String::new();
        for codec in CODEC_CANDIDATES {
            match Self::spawn(&ffmpeg, output_path, width, height, fps, codec) {
                Ok(encoder) => {
                    info!("Video encoder opened with codec {codec}: {}", output_path.display());
                    return Ok(encoder);
                }
                Err(e) => {
                    warn!("Codec {codec} failed to open: {e}");
                    last_error = e.to_string();
                }
            }
        }

        Err(CaptureError::EncoderUnavailable(format!(
            "all codecs failed, last error: {last_error}"
        )))
    }

    fn spawn(
        ffmpeg: &Path,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: &str,
    ) -> Result<Self> {
        let mut child = Command::new(ffmpeg)
            .args([
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &format!("{width}x{height}"),
                "-r", &fps.to_string(),
                "-i", "-",
                "-c:v", codec,
                "-pix_fmt", "yuv420p",
                "-y",
            ])
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn ffmpeg with codec {codec}"))?;

        // A codec ffmpeg does not know makes the process exit almost
        // immediately; give it a moment and check.
        std::thread::sleep(Duration::from_millis(150));
        if let Some(status) = child.try_wait().context("ffmpeg status check failed")? {
            return Err(anyhow!("ffmpeg exited at startup with {status}"));
        }

        let stdin = child.stdin.take().context("ffmpeg stdin unavailable")?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            output_path: output_path.to_path_buf(),
            width,
            height,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match encoder {}x{}",
                frame.width, frame.height, self.width, self.height
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("encoder already finalized"))?;
        stdin
            .write_all(&frame.data)
            .context("failed to pipe frame to ffmpeg")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // Closing stdin signals end-of-stream; ffmpeg then writes the
        // container trailer and exits.
        drop(self.stdin.take());
        let status = self.child.wait().context("failed to wait for ffmpeg")?;
        if !status.success() {
            return Err(anyhow!(
                "ffmpeg exited with {status} while finalizing {}",
                self.output_path.display()
            ));
        }
        info!("Video finalized: {}", self.output_path.display());
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            // finish() was never called; reap the process rather than leak it.
            if let Err(e) = self.child.wait() {
                warn!("Failed to reap ffmpeg on drop: {e}");
            }
        }
    }
}
