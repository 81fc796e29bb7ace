//! Session artifact serialization.
//!
//! One completed session is persisted as a JSON document next to its video
//! files. The document carries the prompt, the submitted text, both the
//! replay-ready and the raw keystroke lists, and the shared-clock origin so
//! that any consumer can reconstruct inter-stream timing offline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::keystroke::{InputKeystroke, RawKeystroke};
use crate::session::question::Question;

/// The on-disk record of one completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub question: Question,

    /// Final text content as submitted.
    pub user_input: String,

    /// Replay-ready keystrokes, timestamps relative to the clock origin.
    pub keystrokes: Vec<InputKeystroke>,

    /// Every low-level event observed while collecting, including releases
    /// and IME intermediates.
    pub raw_keystrokes: Vec<RawKeystroke>,

    /// Shared-clock origin as a Unix epoch timestamp in seconds.
    pub recording_start_time: f64,

    /// Wall-clock time the record was written, Unix epoch seconds.
    pub timestamp: f64,

    pub screen_video_path: String,

    /// Absent when the webcam stream was disabled or its capture errored.
    pub webcam_video_path: Option<String>,
}

impl SessionRecord {
    /// Writes the record as pretty-printed JSON, creating parent directories
    /// as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating artifact directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing session record")?;
        fs::write(path, json)
            .with_context(|| format!("writing session record to {}", path.display()))?;
        debug!(path = %path.display(), keystrokes = self.keystrokes.len(), "saved session record");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading session record from {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("parsing session record {}", path.display()))
    }
}

/// Lists session record files under `dir`, oldest first by file name.
///
/// Files that are not `.json` are skipped; unreadable directory entries are
/// logged and skipped rather than failing the whole listing.
pub fn list_records(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading record dir {}", dir.display()))?;
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
