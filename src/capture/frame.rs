use crate::error::CaptureError;
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest plausible capture dimension. Anything beyond this is almost
/// certainly a geometry computation bug, not a real screen rectangle.
pub const MAX_REGION_DIMENSION: u32 = 10_000;

/// A screen rectangle in logical pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    /// Reject degenerate or absurdly large rectangles before any capture
    /// resource is opened.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::InvalidRegion(format!(
                "degenerate size {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_REGION_DIMENSION || self.height > MAX_REGION_DIMENSION {
            return Err(CaptureError::InvalidRegion(format!(
                "implausible size {}x{} (max {})",
                self.width, self.height, MAX_REGION_DIMENSION
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.width, self.height)
    }
}

impl FromStr for Region {
    type Err = CaptureError;

    /// Parses `"left,top,width,height"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(CaptureError::InvalidRegion(format!(
                "expected left,top,width,height, got {s:?}"
            )));
        }
        let parse_i32 = |v: &str| {
            v.parse::<i32>()
                .map_err(|_| CaptureError::InvalidRegion(format!("bad coordinate {v:?}")))
        };
        let parse_u32 = |v: &str| {
            v.parse::<u32>()
                .map_err(|_| CaptureError::InvalidRegion(format!("bad dimension {v:?}")))
        };
        Ok(Region {
            left: parse_i32(parts[0])?,
            top: parse_i32(parts[1])?,
            width: parse_u32(parts[2])?,
            height: parse_u32(parts[3])?,
        })
    }
}

/// One captured video frame, RGB24 interleaved.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw pixel data, 3 bytes per pixel, row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Milliseconds since the session clock origin (0 if not yet bound).
    pub timestamp_ms: u64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ms: u64) -> Self {
        Self { data, width, height, timestamp_ms }
    }

    /// A black frame, useful as an encoder warm-up or test fixture.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; (width * height * 3) as usize],
            width,
            height,
            timestamp_ms: 0,
        }
    }

    pub fn byte_len(&self) -> usize {
        (self.width * self.height * 3) as usize
    }

    /// Rescale to the target dimensions. Used defensively when a grab comes
    /// back off-by-one from the requested rectangle (DPI rounding).
    pub fn resized_to(&self, width: u32, height: u32) -> VideoFrame {
        if self.width == width && self.height == height {
            return self.clone();
        }
        let img = match RgbImage::from_raw(self.width, self.height, self.data.clone()) {
            Some(img) => img,
            // Truncated buffer: substitute a blank frame of the right size
            // rather than poisoning the encoder with garbage.
            None => return VideoFrame { timestamp_ms: self.timestamp_ms, ..VideoFrame::blank(width, height) },
        };
        let resized = imageops::resize(&img, width, height, imageops::FilterType::Triangle);
        VideoFrame {
            data: resized.into_raw(),
            width,
            height,
            timestamp_ms: self.timestamp_ms,
        }
    }
}
