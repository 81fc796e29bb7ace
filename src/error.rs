use thiserror::Error;

/// Errors raised at capture-unit boundaries.
///
/// These are absorbed at the unit that produced them and surfaced as status;
/// only the session orchestrator decides whether one is session-fatal
/// (primary screen stream) or tolerable (webcam, logger backend switch).
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture rectangle is degenerate or absurdly large.
    #[error("invalid capture region: {0}")]
    InvalidRegion(String),

    /// No video codec could be opened for writing.
    #[error("no video encoder available: {0}")]
    EncoderUnavailable(String),

    /// Camera device cannot be opened or read.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Platform denied camera access.
    #[error("camera permission denied")]
    PermissionDenied,

    /// Sustained (not transient) frame grab/write failure.
    #[error("sustained capture failure: {0}")]
    CaptureFailure(String),

    /// A UI element's screen rectangle could not be computed.
    #[error("cannot resolve screen region: {0}")]
    RegionUnavailable(String),
}
