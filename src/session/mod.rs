//! Session orchestration
//!
//! This module provides the `SessionOrchestrator` abstraction that manages:
//! - The session lifecycle state machine (Idle / Armed / Collecting / Stopping)
//! - Fan-out across the screen, webcam, and keystroke streams on one clock
//! - Question selection for each session
//! - Artifact assembly and persistence

mod artifact;
mod config;
mod question;
mod session;

pub use artifact::{list_records, SessionRecord};
pub use config::{SessionConfig, WebcamMode};
pub use question::{JsonQuestionBank, Question, QuestionFilter, QuestionSource};
pub use session::{
    RegionProvider, SessionOrchestrator, SessionOutcome, SessionPaths, SessionState, StreamEvents,
};
