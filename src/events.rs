//! Status and error tracking with change notifications.
//!
//! The transport and session layers both report through a [`Notifier`]: it
//! owns the current status text and last error, and pushes every change to
//! the subscriber channel handed out at session creation.

use crate::config::Target;
use serde_json::Value;
use tokio::sync::mpsc;

/// Domain events emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The byte stream is established.
    Connected,
    /// The byte stream is gone.
    Disconnected,
    /// Human-readable status text changed.
    StatusChanged(String),
    /// An error was recorded.
    Error(String),
    /// Login/authorization accepted; the pool is usable.
    Online,
    /// The pool pushed a new difficulty.
    DifficultyChanged(f64),
    /// A job payload arrived (opaque to this layer).
    JobReceived(Value),
    /// The pool asked us to reconnect elsewhere, once.
    RedirectRequested(Target),
    /// Share with the given id was accepted.
    ShareAccepted(u64),
    /// Share with the given id was rejected.
    ShareRejected(u64),
}

/// Owns status/last-error strings and emits change events.
#[derive(Debug)]
pub struct Notifier {
    status: String,
    last_error: String,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Notifier {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            status: "Offline".to_string(),
            last_error: String::new(),
            tx,
        }
    }

    /// Convenience constructor returning the paired receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Record a new status and notify subscribers.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        if !self.status.is_empty() {
            self.emit(SessionEvent::StatusChanged(self.status.clone()));
        }
    }

    /// Record an error and notify subscribers.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = error.into();
        if !self.last_error.is_empty() {
            tracing::error!(error = %self.last_error);
            self.emit(SessionEvent::Error(self.last_error.clone()));
        }
    }

    pub fn clear_error(&mut self) {
        self.last_error.clear();
    }

    /// Deliver a domain event. Delivery failures mean the subscriber is gone
    /// and are ignored.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}
