//! Restore prompt
//!
//! Before the user edits anything, look up the session's latest draft and
//! offer to apply it. Autosave stays gated until the choice is made so that a
//! draft is never overwritten by a form state the user did not confirm.

use crate::client::id_store::DraftIdStore;
use crate::client::scheduler::AutosaveGate;
use crate::client::snapshot::{FormState, SharedForm};
use crate::client::transport::DraftTransport;
use crate::payload::Document;
use crate::store::{DraftId, DraftView};
use std::sync::Arc;

/// The user's answer to a restore offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreChoice {
    /// Load the stored draft into the form
    Apply,
    /// Keep the empty form
    Dismiss,
}

/// Asks the user whether to restore a draft.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RestoreDecider: Send + Sync {
    /// Present `draft` and wait for the user's choice.
    async fn decide(&self, draft: &DraftView) -> RestoreChoice;
}

/// Loads a stored payload into the form.
pub trait FormPopulator: Send + Sync {
    /// Replace the form contents with `payload`.
    fn populate(&self, payload: &Document);
}

impl FormPopulator for SharedForm {
    fn populate(&self, payload: &Document) {
        self.replace(FormState::from_document(payload));
    }
}

/// What the prompt ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The session has no draft, or the lookup failed
    NothingToRestore,
    /// The user applied this draft; autosave now updates it
    Applied(DraftId),
    /// The user dismissed this draft; autosave will create a new one
    Dismissed(DraftId),
}

/// One-shot restore prompt.
///
/// [`RestorePrompt::run`] consumes the prompt, so it runs at most once per
/// form instance, and releases the autosave gate whatever the outcome.
#[derive(Debug)]
pub struct RestorePrompt {
    transport: Arc<dyn DraftTransport>,
    ids: Arc<dyn DraftIdStore>,
    gate: AutosaveGate,
}

impl RestorePrompt {
    /// Create a prompt holding the autosave gate.
    pub fn new(
        transport: Arc<dyn DraftTransport>,
        ids: Arc<dyn DraftIdStore>,
        gate: AutosaveGate,
    ) -> Self {
        Self {
            transport,
            ids,
            gate,
        }
    }

    /// Look up the latest draft, ask `decider`, and apply the choice.
    pub async fn run(self, decider: &dyn RestoreDecider, form: &dyn FormPopulator) -> RestoreOutcome {
        let Self {
            transport,
            ids,
            gate,
        } = self;

        let outcome = match transport.latest().await {
            Ok(Some(draft)) => match decider.decide(&draft).await {
                RestoreChoice::Apply => {
                    form.populate(&draft.payload);
                    if let Err(e) = ids.save(&draft.id) {
                        tracing::warn!(draft_id = %draft.id, error = %e, "Failed to remember restored draft");
                    }
                    tracing::info!(draft_id = %draft.id, updated_at = %draft.updated_at, "Draft restored");
                    RestoreOutcome::Applied(draft.id)
                }
                RestoreChoice::Dismiss => {
                    clear(ids.as_ref());
                    tracing::info!(draft_id = %draft.id, "Draft restore dismissed");
                    RestoreOutcome::Dismissed(draft.id)
                }
            },
            Ok(None) => {
                clear(ids.as_ref());
                RestoreOutcome::NothingToRestore
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not look up a draft to restore");
                RestoreOutcome::NothingToRestore
            }
        };

        gate.release();
        outcome
    }
}

fn clear(ids: &dyn DraftIdStore) {
    if let Err(e) = ids.clear() {
        tracing::warn!(error = %e, "Failed to forget draft id");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::id_store::MemoryIdStore;
    use crate::client::scheduler::Autosave;
    use crate::client::snapshot::Snapshotter;
    use crate::client::transport::{MockDraftTransport, TransportError};
    use crate::store::Timestamp;
    use serde_json::json;
    use std::time::Duration;

    fn stored_draft() -> DraftView {
        let mut payload = Document::new();
        payload.insert("title", json!("Stored"));
        DraftView {
            id: DraftId::generate(),
            checksum: payload.checksum(),
            payload,
            updated_at: Timestamp::from_datetime(chrono::Utc::now()),
        }
    }

    fn gate() -> (Autosave, AutosaveGate) {
        Autosave::spawn(
            Arc::new(SharedForm::default()),
            Arc::new(MockDraftTransport::new()),
            Arc::new(MemoryIdStore::new()),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_apply_populates_form_and_remembers_id() {
        let draft = stored_draft();
        let expected = draft.clone();
        let mut transport = MockDraftTransport::new();
        transport
            .expect_latest()
            .times(1)
            .returning(move || Ok(Some(expected.clone())));
        let mut decider = MockRestoreDecider::new();
        decider
            .expect_decide()
            .times(1)
            .returning(|_| RestoreChoice::Apply);

        let ids = Arc::new(MemoryIdStore::new());
        let form = SharedForm::default();
        let (_autosave, gate) = gate();

        let outcome = RestorePrompt::new(Arc::new(transport), ids.clone(), gate)
            .run(&decider, &form)
            .await;

        assert_eq!(outcome, RestoreOutcome::Applied(draft.id));
        assert_eq!(ids.current(), Some(draft.id));
        assert_eq!(form.snapshot(), draft.payload);
    }

    #[tokio::test]
    async fn test_dismiss_forgets_id_and_leaves_form() {
        let draft = stored_draft();
        let expected = draft.clone();
        let mut transport = MockDraftTransport::new();
        transport
            .expect_latest()
            .returning(move || Ok(Some(expected.clone())));
        let mut decider = MockRestoreDecider::new();
        decider.expect_decide().returning(|_| RestoreChoice::Dismiss);

        let ids = Arc::new(MemoryIdStore::with_id(draft.id));
        let form = SharedForm::default();
        let (_autosave, gate) = gate();

        let outcome = RestorePrompt::new(Arc::new(transport), ids.clone(), gate)
            .run(&decider, &form)
            .await;

        assert_eq!(outcome, RestoreOutcome::Dismissed(draft.id));
        assert!(ids.current().is_none());
        assert!(form.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_no_draft_skips_decider() {
        let mut transport = MockDraftTransport::new();
        transport.expect_latest().returning(|| Ok(None));
        let mut decider = MockRestoreDecider::new();
        decider.expect_decide().never();
        let (_autosave, gate) = gate();

        let outcome = RestorePrompt::new(Arc::new(transport), Arc::new(MemoryIdStore::new()), gate)
            .run(&decider, &SharedForm::default())
            .await;
        assert_eq!(outcome, RestoreOutcome::NothingToRestore);
    }

    #[tokio::test]
    async fn test_lookup_failure_keeps_remembered_id() {
        let id = DraftId::generate();
        let mut transport = MockDraftTransport::new();
        transport
            .expect_latest()
            .returning(|| Err(TransportError::Network("offline".into())));
        let mut decider = MockRestoreDecider::new();
        decider.expect_decide().never();
        let ids = Arc::new(MemoryIdStore::with_id(id));
        let (_autosave, gate) = gate();

        let outcome = RestorePrompt::new(Arc::new(transport), ids.clone(), gate)
            .run(&decider, &SharedForm::default())
            .await;
        assert_eq!(outcome, RestoreOutcome::NothingToRestore);
        assert_eq!(ids.current(), Some(id));
    }
}
