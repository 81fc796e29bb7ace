//! Session replay
//!
//! This module provides synchronized playback over a saved session:
//! - Frame/time mapping across streams recorded at different rates
//! - Lockstep or independent scrubbing of the screen and webcam streams
//! - Event lookup against the shared-clock timeline
//! - Scrubber thumbnail planning and extraction

mod sync;
mod thumbnails;

pub use sync::{PlaybackCursor, PlaybackSynchronizer, StreamId, StreamTimeline};
pub use thumbnails::{
    extract_thumbnail, plan_thumbnails, ThumbnailPoint, DEFAULT_THUMBNAIL_INTERVAL_SECS,
};
