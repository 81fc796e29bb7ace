use anyhow::{anyhow, Result};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic wall-clock reference shared by every producer in a session.
///
/// All relative timestamps in a session (video frames, keystroke events) are
/// anchored to one origin instant. The origin is bound exactly once, at the
/// moment actual capture begins rather than when the user requested it, so
/// the keystroke log and the frame timeline stay comparable.
pub struct ClockSource {
    started: Instant,
    epoch_base: f64,
    origin: OnceLock<f64>,
}

impl ClockSource {
    pub fn new() -> Self {
        let epoch_base = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            started: Instant::now(),
            epoch_base,
            origin: OnceLock::new(),
        }
    }

    /// Current time as epoch seconds, derived from the monotonic clock so
    /// successive reads never go backwards even if the system clock steps.
    pub fn now_epoch(&self) -> f64 {
        self.epoch_base + self.started.elapsed().as_secs_f64()
    }

    /// Bind the session origin. May be called exactly once per session.
    pub fn bind_origin(&self) -> Result<f64> {
        let origin = self.now_epoch();
        self.origin
            .set(origin)
            .map_err(|_| anyhow!("clock origin already bound for this session"))?;
        Ok(origin)
    }

    pub fn origin(&self) -> Option<f64> {
        self.origin.get().copied()
    }

    /// Convert an epoch timestamp into origin-relative seconds.
    pub fn relative(&self, epoch_ts: f64) -> Option<f64> {
        self.origin().map(|origin| epoch_ts - origin)
    }

    /// Origin-relative seconds for the current instant, or `None` before the
    /// origin is bound.
    pub fn elapsed_since_origin(&self) -> Option<f64> {
        self.relative(self.now_epoch())
    }
}

impl Default for ClockSource {
    fn default() -> Self {
        Self::new()
    }
}
