use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Tuning for the composer idle timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerConfig {
    /// Quiet period after the last keystroke before composing clears.
    pub idle_timeout: Duration,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(2),
        }
    }
}

/// Debounced "user is composing" state for the active conversation.
///
/// Derived purely from local input timing: non-empty text sets the flag, a
/// quiet period clears it, clearing the input clears it immediately. At most
/// one idle timer is pending; every keystroke re-arms it, and a conversation
/// switch cancels it so no timer leaks across conversations.
pub struct Composer {
    config: ComposerConfig,
    composing: Arc<watch::Sender<bool>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Composer {
    pub fn new(config: ComposerConfig) -> Self {
        let (composing, _) = watch::channel(false);
        Self {
            config,
            composing: Arc::new(composing),
            timer: Mutex::new(None),
        }
    }

    /// Feeds the composer the current input text; call on every keystroke.
    pub fn set_text(&self, text: &str) {
        if text.is_empty() {
            self.cancel();
            return;
        }

        self.composing.send_replace(true);

        let composing = Arc::clone(&self.composing);
        let idle = self.config.idle_timeout;
        let mut timer = self.timer.lock().expect("composer timer lock");
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            composing.send_replace(false);
        }));
    }

    /// Clears composing immediately and drops any pending idle timer. Called
    /// on empty input, conversation switch, unmount, and logout.
    pub fn cancel(&self) {
        if let Some(timer) = self.timer.lock().expect("composer timer lock").take() {
            timer.abort();
        }
        self.composing.send_replace(false);
    }

    pub fn is_composing(&self) -> bool {
        *self.composing.borrow()
    }

    /// Stream of composing transitions for the presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.composing.subscribe()
    }
}
