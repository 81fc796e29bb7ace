use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kind of a low-level input event.
///
/// `ContentChanged` is the implicit event recorded when the input field's
/// content changes without an explaining keypress, so consumers never see
/// the field's value drift silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeystrokeEventType {
    Press,
    Release,
    ImeCompose,
    ImeCommit,
    ContentChanged,
}

/// Modifier keys held during an event. Serialized in the artifact as the
/// joined string form, e.g. `"SHIFT+CTRL"` (empty string for none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !(self.shift || self.ctrl || self.alt || self.meta)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.shift {
            parts.push("SHIFT");
        }
        if self.ctrl {
            parts.push("CTRL");
        }
        if self.alt {
            parts.push("ALT");
        }
        if self.meta {
            parts.push("META");
        }
        write!(f, "{}", parts.join("+"))
    }
}

impl FromStr for Modifiers {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modifiers = Modifiers::empty();
        if s.is_empty() {
            return Ok(modifiers);
        }
        for part in s.split('+') {
            match part {
                "SHIFT" => modifiers.shift = true,
                "CTRL" => modifiers.ctrl = true,
                "ALT" => modifiers.alt = true,
                "META" => modifiers.meta = true,
                other => return Err(format!("unknown modifier {other:?}")),
            }
        }
        Ok(modifiers)
    }
}

impl Serialize for Modifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Modifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Key identity in the high-level keystroke list: a numeric code for
/// physical keys, a label for synthetic events (`"COMMIT_你"`, `"IME_CHANGE"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyRef {
    Code(i32),
    Label(String),
}

/// One low-level input event, stamped against the session clock and carrying
/// a snapshot of the input field at the instant it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawKeystroke {
    #[serde(rename = "type")]
    pub event_type: KeystrokeEventType,
    pub key_code: Option<i32>,
    pub key_text: String,
    pub modifiers: Modifiers,
    /// Seconds relative to the session clock origin.
    pub timestamp: f64,
    /// Epoch seconds, for diagnostics.
    pub absolute_timestamp: f64,
    pub input_content: String,
}

/// One high-level keystroke as the input tool saw it (physical key or IME
/// composition/commit label).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputKeystroke {
    pub key: KeyRef,
    pub text: String,
    pub timestamp: f64,
    pub absolute_timestamp: f64,
    pub input_content: String,
}
