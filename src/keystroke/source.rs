use crate::keystroke::event::{KeyRef, KeystrokeEventType, Modifiers};
use crate::keystroke::log::KeystrokeLog;
use anyhow::Result;
use rdev::{Event, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// A producer of keystroke events behind one contract.
///
/// Two interchangeable backends exist: the foreground-scope source fed by
/// the embedding UI's event filter, and the background global hook. Only
/// one is active at a time; switching mid-session stops the old backend
/// first and leaves an accepted, logged gap in coverage.
#[async_trait::async_trait]
pub trait KeystrokeSource: Send {
    async fn start_listening(&mut self) -> Result<()>;
    async fn stop_listening(&mut self) -> Result<()>;
    fn is_listening(&self) -> bool;
    fn name(&self) -> &str;
}

/// Foreground-scope backend: observes only events targeted at the focused
/// input widget. The embedding UI forwards its key/IME events through a
/// cloned [`FocusHandle`]; nothing reaches the log while the source is
/// stopped.
pub struct FocusSource {
    log: Arc<KeystrokeLog>,
    listening: Arc<AtomicBool>,
    last_content: Arc<Mutex<String>>,
}

impl FocusSource {
    pub fn new(log: Arc<KeystrokeLog>) -> Self {
        Self {
            log,
            listening: Arc::new(AtomicBool::new(false)),
            last_content: Arc::new(Mutex::new(String::new())),
        }
    }

    /// A cloneable handle the UI layer pushes events through.
    pub fn handle(&self) -> FocusHandle {
        FocusHandle {
            log: Arc::clone(&self.log),
            listening: Arc::clone(&self.listening),
            last_content: Arc::clone(&self.last_content),
        }
    }
}

#[async_trait::async_trait]
impl KeystrokeSource for FocusSource {
    async fn start_listening(&mut self) -> Result<()> {
        self.last_content.lock().unwrap().clear();
        self.listening.store(true, Ordering::SeqCst);
        debug!("Focus keystroke source started");
        Ok(())
    }

    async fn stop_listening(&mut self) -> Result<()> {
        self.listening.store(false, Ordering::SeqCst);
        debug!("Focus keystroke source stopped");
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "focus"
    }
}

/// Entry point for the embedding UI to report input events.
#[derive(Clone)]
pub struct FocusHandle {
    log: Arc<KeystrokeLog>,
    listening: Arc<AtomicBool>,
    last_content: Arc<Mutex<String>>,
}

impl FocusHandle {
    fn active(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn key_press(
        &self,
        key_code: i32,
        text: &str,
        modifiers: Modifiers,
        input_content: &str,
    ) {
        if !self.active() {
            return;
        }
        self.log.record_raw(
            KeystrokeEventType::Press,
            Some(key_code),
            text,
            modifiers,
            input_content,
        );
        self.log
            .record_input(KeyRef::Code(key_code), text, input_content);
        self.remember_content(input_content);
    }

    pub fn key_release(
        &self,
        key_code: i32,
        text: &str,
        modifiers: Modifiers,
        input_content: &str,
    ) {
        if !self.active() {
            return;
        }
        self.log.record_raw(
            KeystrokeEventType::Release,
            Some(key_code),
            text,
            modifiers,
            input_content,
        );
    }

    /// IME pre-edit changed (e.g. pinyin being typed, not yet committed).
    pub fn ime_compose(&self, preedit: &str, input_content: &str) {
        if !self.active() {
            return;
        }
        self.log.record_raw(
            KeystrokeEventType::ImeCompose,
            None,
            preedit,
            Modifiers::empty(),
            input_content,
        );
        self.log.record_input(
            KeyRef::Label(format!("COMPOSITION_{preedit}")),
            preedit,
            input_content,
        );
    }

    /// IME candidate selected by digit key during composition.
    pub fn ime_candidate(&self, digit: char, input_content: &str) {
        if !self.active() {
            return;
        }
        self.log.record_input(
            KeyRef::Label(format!("CANDIDATE_{digit}")),
            digit.to_string(),
            input_content,
        );
    }

    /// IME committed text into the field.
    pub fn ime_commit(&self, committed: &str, input_content: &str) {
        if !self.active() {
            return;
        }
        self.log.record_raw(
            KeystrokeEventType::ImeCommit,
            None,
            committed,
            Modifiers::empty(),
            input_content,
        );
        self.log.record_input(
            KeyRef::Label(format!("COMMIT_{committed}")),
            committed,
            input_content,
        );
        self.remember_content(input_content);
    }

    /// Report the field's current content. A change not explained by a
    /// preceding keypress or commit is recorded as an implicit
    /// content-changed event.
    pub fn sync_content(&self, input_content: &str) {
        if !self.active() {
            return;
        }
        let changed = {
            let last = self.last_content.lock().unwrap();
            *last != input_content
        };
        if changed {
            self.log.record_raw(
                KeystrokeEventType::ContentChanged,
                None,
                "",
                Modifiers::empty(),
                input_content,
            );
            self.log
                .record_input(KeyRef::Label("IME_CHANGE".into()), "", input_content);
            self.remember_content(input_content);
        }
    }

    fn remember_content(&self, content: &str) {
        let mut last = self.last_content.lock().unwrap();
        if *last != content {
            *last = content.to_string();
        }
    }
}

/// Provides the current input-field content to the global hook, which has
/// no widget access of its own.
pub type ContentProbe = Arc<dyn Fn() -> String + Send + Sync>;

/// Background-scope backend: observes all system-wide key activity via an
/// OS-level hook on a dedicated thread. Useful when the input widget may
/// lose focus unexpectedly.
///
/// The hook library offers no unhook call, so the listener thread lives for
/// the process; stopping this source makes the callback drop events instead.
pub struct GlobalHookSource {
    log: Arc<KeystrokeLog>,
    listening: Arc<AtomicBool>,
    content_probe: ContentProbe,
    hook_spawned: bool,
}

impl GlobalHookSource {
    pub fn new(log: Arc<KeystrokeLog>, content_probe: ContentProbe) -> Self {
        Self {
            log,
            listening: Arc::new(AtomicBool::new(false)),
            content_probe,
            hook_spawned: false,
        }
    }

    fn spawn_hook(&mut self) {
        if self.hook_spawned {
            return;
        }
        self.hook_spawned = true;

        let log = Arc::clone(&self.log);
        let listening = Arc::clone(&self.listening);
        let content_probe = Arc::clone(&self.content_probe);
        let modifiers = Arc::new(Mutex::new(Modifiers::empty()));

        std::thread::spawn(move || {
            info!("Global keyboard hook thread started");
            let callback = move |event: Event| {
                let (event_type, key) = match event.event_type {
                    EventType::KeyPress(key) => (KeystrokeEventType::Press, key),
                    EventType::KeyRelease(key) => (KeystrokeEventType::Release, key),
                    _ => return,
                };

                {
                    let mut mods = modifiers.lock().unwrap();
                    let pressed = event_type == KeystrokeEventType::Press;
                    match key {
                        Key::ShiftLeft | Key::ShiftRight => mods.shift = pressed,
                        Key::ControlLeft | Key::ControlRight => mods.ctrl = pressed,
                        Key::Alt | Key::AltGr => mods.alt = pressed,
                        Key::MetaLeft | Key::MetaRight => mods.meta = pressed,
                        _ => {}
                    }
                }

                if !listening.load(Ordering::SeqCst) {
                    return;
                }

                let key_text = event
                    .name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| format!("{key:?}"));
                let mods = *modifiers.lock().unwrap();
                let content = content_probe();
                log.record_raw(event_type, None, key_text, mods, content);
            };
            if let Err(e) = rdev::listen(callback) {
                error!("Global keyboard hook failed: {e:?}");
            }
        });
    }
}

#[async_trait::async_trait]
impl KeystrokeSource for GlobalHookSource {
    async fn start_listening(&mut self) -> Result<()> {
        self.spawn_hook();
        self.listening.store(true, Ordering::SeqCst);
        debug!("Global hook keystroke source started");
        Ok(())
    }

    async fn stop_listening(&mut self) -> Result<()> {
        self.listening.store(false, Ordering::SeqCst);
        // Give an in-flight callback a beat to observe the flag before the
        // caller treats the log as closed.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        debug!("Global hook keystroke source stopped");
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "global-hook"
    }
}

/// Swap the active backend. Expected to produce a small, logged gap in
/// coverage between the old backend stopping and the new one starting.
pub async fn switch_backend(
    current: &mut Box<dyn KeystrokeSource>,
    mut next: Box<dyn KeystrokeSource>,
) -> Result<()> {
    let was_listening = current.is_listening();
    current.stop_listening().await?;
    if was_listening {
        warn!(
            "Keystroke backend switched from {} to {} mid-session; coverage gap expected",
            current.name(),
            next.name()
        );
        next.start_listening().await?;
    }
    *current = next;
    Ok(())
}
