//! Autosave status reporting
//!
//! The autosave component publishes every state transition on a
//! `tokio::sync::watch` channel. UIs render [`AutosaveState::message`] in an
//! accessible status region; tests await specific states.

use std::fmt;
use tokio::sync::watch;

/// Where the autosave cycle currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AutosaveState {
    /// Nothing pending
    #[default]
    Idle,
    /// An edit was seen; a save will fire when the throttle window elapses
    Scheduled,
    /// A save request is in flight
    Saving,
    /// The last save succeeded
    Saved,
    /// The last save failed; the edit is kept and retried on the next cycle
    Error(String),
}

impl AutosaveState {
    /// Human-readable status text.
    pub fn message(&self) -> &'static str {
        match self {
            AutosaveState::Idle => "",
            AutosaveState::Scheduled => "Autosave scheduled.",
            AutosaveState::Saving => "Saving draft…",
            AutosaveState::Saved => "Draft saved",
            AutosaveState::Error(_) => "Draft not saved — will retry",
        }
    }

    /// True for `Saved` and `Error`.
    pub fn is_settled(&self) -> bool {
        matches!(self, AutosaveState::Saved | AutosaveState::Error(_))
    }
}

impl fmt::Display for AutosaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Publishing half, owned by the scheduler task.
#[derive(Debug)]
pub(crate) struct StatusPublisher {
    tx: watch::Sender<AutosaveState>,
}

impl StatusPublisher {
    pub(crate) fn new() -> (Self, watch::Receiver<AutosaveState>) {
        let (tx, rx) = watch::channel(AutosaveState::Idle);
        (Self { tx }, rx)
    }

    pub(crate) fn set(&self, state: AutosaveState) {
        tracing::trace!(status = ?state, "Autosave status");
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(state);
    }

    pub(crate) fn current(&self) -> AutosaveState {
        self.tx.borrow().clone()
    }
}
