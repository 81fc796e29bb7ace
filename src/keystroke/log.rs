use crate::clock::ClockSource;
use crate::keystroke::event::{
    InputKeystroke, KeyRef, KeystrokeEventType, Modifiers, RawKeystroke,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

struct LogInner {
    raw: Vec<RawKeystroke>,
    input: Vec<InputKeystroke>,
    /// When collection was requested; the re-stamp fallback if the session
    /// clock origin is never bound.
    capture_requested_at: Option<f64>,
}

/// The session's keystroke buffer: one logical append stream shared by every
/// producer (focused-widget filter, global hook, IME handler).
///
/// The single gating invariant of the component: appends are ignored unless
/// the session is collecting. Events are stamped with the monotonic epoch
/// clock at append time; origin-relative timestamps are computed at drain,
/// so events observed during the pre-roll (before the origin is bound) are
/// re-stamped once it is.
pub struct KeystrokeLog {
    inner: Mutex<LogInner>,
    collecting: AtomicBool,
    clock: RwLock<Arc<ClockSource>>,
}

impl KeystrokeLog {
    pub fn new(clock: Arc<ClockSource>) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                raw: Vec::new(),
                input: Vec::new(),
                capture_requested_at: None,
            }),
            collecting: AtomicBool::new(false),
            clock: RwLock::new(clock),
        }
    }

    /// Point the log at a fresh session clock. Called by the orchestrator
    /// when a new session is armed.
    pub fn rebind_clock(&self, clock: Arc<ClockSource>) {
        *self.clock.write().unwrap() = clock;
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::SeqCst)
    }

    /// Open the gate and clear any residue from a previous session.
    ///
    /// Lock order everywhere in this type is buffer then clock.
    pub fn begin_collecting(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.read().unwrap().now_epoch();
        inner.raw.clear();
        inner.input.clear();
        inner.capture_requested_at = Some(now);
        drop(inner);
        self.collecting.store(true, Ordering::SeqCst);
    }

    pub fn end_collecting(&self) {
        self.collecting.store(false, Ordering::SeqCst);
    }

    pub fn record_raw(
        &self,
        event_type: KeystrokeEventType,
        key_code: Option<i32>,
        key_text: impl Into<String>,
        modifiers: Modifiers,
        input_content: impl Into<String>,
    ) {
        if !self.is_collecting() {
            debug!("Raw keystroke ignored: not collecting");
            return;
        }
        // Stamp under the buffer lock so append order and timestamp order
        // cannot diverge across producer threads.
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.read().unwrap().now_epoch();
        let event = RawKeystroke {
            event_type,
            key_code,
            key_text: key_text.into(),
            modifiers,
            // Placeholder until drain re-stamps against the bound origin.
            timestamp: now,
            absolute_timestamp: now,
            input_content: input_content.into(),
        };
        inner.raw.push(event);
    }

    pub fn record_input(
        &self,
        key: KeyRef,
        text: impl Into<String>,
        input_content: impl Into<String>,
    ) {
        if !self.is_collecting() {
            debug!("Input keystroke ignored: not collecting");
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.read().unwrap().now_epoch();
        let event = InputKeystroke {
            key,
            text: text.into(),
            timestamp: now,
            absolute_timestamp: now,
            input_content: input_content.into(),
        };
        inner.input.push(event);
    }

    pub fn raw_len(&self) -> usize {
        self.inner.lock().unwrap().raw.len()
    }

    pub fn input_len(&self) -> usize {
        self.inner.lock().unwrap().input.len()
    }

    /// Take the full ordered event sequence, re-stamping every event
    /// relative to the session origin (falling back to the collect-request
    /// time if no origin was ever bound). Pre-roll events come out with
    /// small negative timestamps rather than being dropped.
    pub fn drain(&self) -> (Vec<InputKeystroke>, Vec<RawKeystroke>) {
        let mut inner = self.inner.lock().unwrap();
        let base = self
            .clock
            .read()
            .unwrap()
            .origin()
            .or(inner.capture_requested_at);

        let mut input = std::mem::take(&mut inner.input);
        let mut raw = std::mem::take(&mut inner.raw);
        if let Some(base) = base {
            for event in &mut input {
                event.timestamp = event.absolute_timestamp - base;
            }
            for event in &mut raw {
                event.timestamp = event.absolute_timestamp - base;
            }
        }
        (input, raw)
    }
}
