//! Keystroke and IME event logging.
//!
//! Events flow from one of two interchangeable sources into a single
//! append-point log gated on the session's collecting state.

pub mod event;
pub mod log;
pub mod source;

pub use event::{InputKeystroke, KeyRef, KeystrokeEventType, Modifiers, RawKeystroke};
pub use log::KeystrokeLog;
pub use source::{
    switch_backend, ContentProbe, FocusHandle, FocusSource, GlobalHookSource, KeystrokeSource,
};
