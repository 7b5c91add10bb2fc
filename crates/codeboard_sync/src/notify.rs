//! Status notifications surfaced to the UI layer.
//!
//! Every synchronizer operation ends in a short human-readable status event,
//! success or failure. The UI registers a callback (its toast machinery);
//! headless callers just leave the notifier disabled.

use std::sync::Arc;

/// Severity of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Operation completed.
    Success,
    /// Operation failed; `message` carries the reason.
    Error,
}

/// A short human-readable status notification.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// Severity.
    pub level: StatusLevel,
    /// One-line message for the user.
    pub message: String,
}

type StatusCallback = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

/// Dispatches status events to an optional registered callback.
#[derive(Clone, Default)]
pub struct Notifier {
    callback: Option<StatusCallback>,
}

impl Notifier {
    /// A notifier delivering events to `callback`.
    pub fn new(callback: impl Fn(&StatusEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// A notifier that drops all events.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Emit a success event.
    pub fn success(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Success, message.into());
    }

    /// Emit an error event.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(StatusLevel::Error, message.into());
    }

    fn emit(&self, level: StatusLevel, message: String) {
        if let Some(callback) = &self.callback {
            callback(&StatusEvent { level, message });
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("registered", &self.callback.is_some())
            .finish()
    }
}
