//! Autosave scheduling
//!
//! [`Autosave`] shadows a form into the draft store. Edits reset a trailing
//! throttle timer; when it elapses the latest snapshot is saved. The
//! component runs as a single task that owns all state, so there is never
//! more than one transport call outstanding:
//!
//! ```text
//!   edit ──► Scheduled ──(throttle elapses)──► Saving ──► Saved
//!                ▲                               │  └───► Error (edit kept)
//!                └──── edit during save: one follow-up save on completion
//! ```
//!
//! Failed saves are not retried in the background. The edit stays pending
//! and goes out with the next natural cycle, so retry frequency is bounded by
//! user activity.
//!
//! The component starts gated: nothing is saved until the returned
//! [`AutosaveGate`] is released, which the restore prompt does once the user
//! has decided whether to apply a stored draft.

use crate::client::id_store::DraftIdStore;
use crate::client::snapshot::Snapshotter;
use crate::client::status::{AutosaveState, StatusPublisher};
use crate::client::transport::{DraftTransport, TransportError};
use crate::payload::Document;
use crate::store::DraftId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

enum Command {
    Edit,
    Release,
    Flush(oneshot::Sender<AutosaveState>),
    Discard(oneshot::Sender<Result<(), TransportError>>),
    Shutdown(oneshot::Sender<()>),
}

enum Outcome {
    Saved(Result<DraftId, TransportError>),
    Discarded(Result<(), TransportError>),
}

enum Wake {
    Command(Option<Command>),
    Timer,
    Settled(Result<Outcome, JoinError>),
}

/// Handle to a running autosave component.
///
/// Each instance owns its own task and state; any number can run side by
/// side.
#[derive(Debug)]
pub struct Autosave {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<AutosaveState>,
    task: JoinHandle<()>,
}

/// Releases the autosave component for saving.
///
/// Dropping the gate releases it as well, so a caller that bails out early
/// can never leave autosave disabled for the rest of the session.
#[derive(Debug)]
pub struct AutosaveGate {
    commands: mpsc::UnboundedSender<Command>,
    released: bool,
}

impl AutosaveGate {
    /// Allow saves. Edits observed while gated are scheduled now.
    pub fn release(mut self) {
        self.send_release();
    }

    fn send_release(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.commands.send(Command::Release);
        }
    }
}

impl Drop for AutosaveGate {
    fn drop(&mut self) {
        self.send_release();
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Edit => "Edit",
            Command::Release => "Release",
            Command::Flush(_) => "Flush",
            Command::Discard(_) => "Discard",
            Command::Shutdown(_) => "Shutdown",
        };
        f.write_str(name)
    }
}

impl Autosave {
    /// Start an autosave component on the current tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `snapshotter` - Source of form snapshots
    /// * `transport` - Draft service client
    /// * `ids` - Durable memory of the draft being shadowed
    /// * `throttle` - Quiet period after the last edit before saving
    ///
    /// # Returns
    ///
    /// The component handle and the gate that must be released (directly or
    /// by the restore prompt) before any save is issued.
    pub fn spawn(
        snapshotter: Arc<dyn Snapshotter>,
        transport: Arc<dyn DraftTransport>,
        ids: Arc<dyn DraftIdStore>,
        throttle: Duration,
    ) -> (Self, AutosaveGate) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status, status_rx) = StatusPublisher::new();

        let worker = Worker {
            snapshotter,
            transport,
            ids,
            throttle,
            status,
            gate_open: false,
            dirty: false,
            follow_up: false,
            closing: false,
            deadline: None,
            in_flight: None,
            flush_waiters: Vec::new(),
            discard_waiters: Vec::new(),
            discarding: Vec::new(),
            shutdown_waiters: Vec::new(),
        };
        let task = tokio::spawn(worker.run(rx));

        let gate = AutosaveGate {
            commands: tx.clone(),
            released: false,
        };
        (
            Self {
                commands: tx,
                status: status_rx,
                task,
            },
            gate,
        )
    }

    /// Report that the form changed.
    pub fn notify_edit(&self) {
        let _ = self.commands.send(Command::Edit);
    }

    /// Save pending edits now instead of waiting for the throttle window.
    ///
    /// Waits for any in-flight save and the flush save itself, then returns
    /// the resulting state. Returns immediately while still gated.
    pub async fn flush(&self) -> AutosaveState {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_err() {
            return self.state();
        }
        rx.await.unwrap_or_else(|_| self.state())
    }

    /// Delete the shadowed draft (e.g. after the form was submitted) and
    /// forget its id. Pending edits are dropped.
    pub async fn discard(&self) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        let stopped = || TransportError::Network("autosave stopped".to_string());
        self.commands
            .send(Command::Discard(tx))
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Current state.
    pub fn state(&self) -> AutosaveState {
        self.status.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AutosaveState> {
        self.status.clone()
    }

    /// Stop the component after any in-flight call settles.
    ///
    /// Edits that have not been saved yet are not sent; call
    /// [`Autosave::flush`] first to keep them.
    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Autosave task ended abnormally");
        }
    }
}

struct Worker {
    snapshotter: Arc<dyn Snapshotter>,
    transport: Arc<dyn DraftTransport>,
    ids: Arc<dyn DraftIdStore>,
    throttle: Duration,
    status: StatusPublisher,
    gate_open: bool,
    dirty: bool,
    follow_up: bool,
    closing: bool,
    deadline: Option<Instant>,
    in_flight: Option<JoinHandle<Outcome>>,
    flush_waiters: Vec<oneshot::Sender<AutosaveState>>,
    discard_waiters: Vec<oneshot::Sender<Result<(), TransportError>>>,
    discarding: Vec<oneshot::Sender<Result<(), TransportError>>>,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn join_opt(slot: &mut Option<JoinHandle<Outcome>>) -> Result<Outcome, JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            if self.closing && self.in_flight.is_none() {
                break;
            }

            let accepting = !self.closing;
            let fire_at = if self.gate_open && self.in_flight.is_none() {
                self.deadline
            } else {
                None
            };

            let wake = tokio::select! {
                command = commands.recv(), if accepting => Wake::Command(command),
                _ = sleep_until_opt(fire_at) => Wake::Timer,
                joined = join_opt(&mut self.in_flight) => Wake::Settled(joined),
            };

            match wake {
                Wake::Command(Some(command)) => self.on_command(command),
                Wake::Command(None) => self.closing = true,
                Wake::Timer => self.on_timer(),
                Wake::Settled(joined) => self.on_settled(joined),
            }
        }

        let state = self.status.current();
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(state.clone());
        }
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::debug!("Autosave stopped");
    }

    fn on_command(&mut self, command: Command) {
        tracing::trace!(?command, "Autosave command");
        match command {
            Command::Edit => self.on_edit(),
            Command::Release => self.on_release(),
            Command::Flush(waiter) => self.on_flush(waiter),
            Command::Discard(waiter) => self.on_discard(waiter),
            Command::Shutdown(waiter) => {
                self.shutdown_waiters.push(waiter);
                self.closing = true;
            }
        }
    }

    fn on_edit(&mut self) {
        self.dirty = true;
        if !self.gate_open {
            return;
        }
        if self.in_flight.is_some() {
            self.follow_up = true;
        } else {
            self.schedule();
        }
    }

    fn on_release(&mut self) {
        if self.gate_open {
            return;
        }
        self.gate_open = true;
        tracing::debug!(pending = self.dirty, "Autosave released");
        if self.dirty {
            if self.in_flight.is_some() {
                self.follow_up = true;
            } else {
                self.schedule();
            }
        }
    }

    fn on_timer(&mut self) {
        self.deadline = None;
        if self.dirty {
            self.start_save();
        }
    }

    fn on_flush(&mut self, waiter: oneshot::Sender<AutosaveState>) {
        if !self.gate_open || (!self.dirty && self.in_flight.is_none()) {
            let _ = waiter.send(self.status.current());
            return;
        }
        self.flush_waiters.push(waiter);
        if self.in_flight.is_some() {
            if self.dirty {
                self.follow_up = true;
            }
        } else {
            self.start_save();
        }
    }

    fn on_discard(&mut self, waiter: oneshot::Sender<Result<(), TransportError>>) {
        self.dirty = false;
        self.follow_up = false;
        self.deadline = None;
        self.discard_waiters.push(waiter);
        if self.in_flight.is_none() {
            self.start_discard();
        }
    }

    fn on_settled(&mut self, joined: Result<Outcome, JoinError>) {
        self.in_flight = None;
        // `discarding` is only populated while a discard task runs.
        let outcome = joined.unwrap_or_else(|e| {
            let error = TransportError::Network(format!("autosave task failed: {}", e));
            if self.discarding.is_empty() {
                Outcome::Saved(Err(error))
            } else {
                Outcome::Discarded(Err(error))
            }
        });

        match outcome {
            Outcome::Saved(Ok(id)) => {
                tracing::debug!(draft_id = %id, "Autosave succeeded");
                self.status.set(AutosaveState::Saved);
            }
            Outcome::Saved(Err(e)) => {
                tracing::warn!(error = %e, "Autosave failed; edit kept for the next cycle");
                self.dirty = true;
                self.status.set(AutosaveState::Error(e.to_string()));
            }
            Outcome::Discarded(result) => {
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Failed to discard draft");
                }
                self.status.set(AutosaveState::Idle);
                for waiter in self.discarding.drain(..) {
                    let _ = waiter.send(result.clone());
                }
            }
        }

        if self.closing {
            return;
        }
        if !self.discard_waiters.is_empty() {
            self.start_discard();
        } else if self.follow_up {
            self.start_save();
        } else {
            let state = self.status.current();
            for waiter in self.flush_waiters.drain(..) {
                let _ = waiter.send(state.clone());
            }
        }
    }

    fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.throttle);
        self.status.set(AutosaveState::Scheduled);
    }

    fn start_save(&mut self) {
        let payload = self.snapshotter.snapshot();
        self.dirty = false;
        self.follow_up = false;
        self.deadline = None;
        self.status.set(AutosaveState::Saving);

        let transport = self.transport.clone();
        let ids = self.ids.clone();
        self.in_flight = Some(tokio::spawn(async move {
            Outcome::Saved(save(transport.as_ref(), ids.as_ref(), payload).await)
        }));
    }

    fn start_discard(&mut self) {
        self.discarding = std::mem::take(&mut self.discard_waiters);
        let transport = self.transport.clone();
        let ids = self.ids.clone();
        self.in_flight = Some(tokio::spawn(async move {
            Outcome::Discarded(discard(transport.as_ref(), ids.as_ref()).await)
        }));
    }
}

fn forget(ids: &dyn DraftIdStore) {
    if let Err(e) = ids.clear() {
        tracing::warn!(error = %e, "Failed to forget draft id");
    }
}

/// One save cycle: update the remembered draft, or create a new one.
///
/// A remembered draft that no longer exists is replaced by a fresh one in the
/// same cycle. A remembered draft owned by another session is forgotten and
/// the cycle fails, so the next cycle creates.
async fn save(
    transport: &dyn DraftTransport,
    ids: &dyn DraftIdStore,
    payload: Document,
) -> Result<DraftId, TransportError> {
    let remembered = ids.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to read remembered draft id");
        None
    });

    if let Some(id) = remembered {
        match transport.update(&id, &payload).await {
            Ok(updated) => {
                tracing::debug!(draft_id = %id, checksum = %updated.checksum, "Draft updated");
                return Ok(id);
            }
            Err(TransportError::NotFound) => {
                tracing::info!(draft_id = %id, "Remembered draft is gone; creating a new one");
                forget(ids);
            }
            Err(TransportError::Ownership) => {
                tracing::warn!(draft_id = %id, "Remembered draft belongs to another session; forgetting it");
                forget(ids);
                return Err(TransportError::Ownership);
            }
            Err(e) => return Err(e),
        }
    }

    let created = transport.create(&payload).await?;
    if let Err(e) = ids.save(&created.id) {
        tracing::warn!(draft_id = %created.id, error = %e, "Failed to remember draft id");
    }
    tracing::info!(draft_id = %created.id, "Draft created");
    Ok(created.id)
}

async fn discard(transport: &dyn DraftTransport, ids: &dyn DraftIdStore) -> Result<(), TransportError> {
    let remembered = ids.load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to read remembered draft id");
        None
    });
    let Some(id) = remembered else {
        return Ok(());
    };
    match transport.delete(&id).await {
        Ok(()) | Err(TransportError::NotFound) => {
            forget(ids);
            tracing::info!(draft_id = %id, "Draft discarded");
            Ok(())
        }
        Err(TransportError::Ownership) => {
            forget(ids);
            Err(TransportError::Ownership)
        }
        Err(e) => Err(e),
    }
}
