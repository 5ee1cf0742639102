//! Client-side autosave
//!
//! The pieces a form embeds to shadow its contents into the draft service:
//!
//! - [`snapshot`]: turn the form into a [`crate::payload::Document`]
//! - [`transport`]: talk to the draft service
//! - [`id_store`]: remember which draft the form is shadowing
//! - [`status`]: human-readable autosave state
//! - [`scheduler`]: the [`Autosave`] component (throttling, single in-flight save)
//! - [`restore`]: the one-shot [`RestorePrompt`] run before autosave starts
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use metadraft::client::{
//!     Autosave, FileIdStore, FormState, HttpDraftTransport, RestoreChoice, RestoreDecider,
//!     RestorePrompt, SharedForm,
//! };
//! use metadraft::store::DraftView;
//!
//! struct AlwaysApply;
//!
//! #[async_trait::async_trait]
//! impl RestoreDecider for AlwaysApply {
//!     async fn decide(&self, _draft: &DraftView) -> RestoreChoice {
//!         RestoreChoice::Apply
//!     }
//! }
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = metadraft::Config::from_yaml(&std::fs::read_to_string("config/config.yaml")?)?;
//! let form = SharedForm::new(FormState::new());
//! let transport = Arc::new(HttpDraftTransport::from_config(&config, "session-credential")?);
//! let ids = Arc::new(FileIdStore::new(&config.autosave.id_file));
//!
//! let (autosave, gate) = Autosave::spawn(
//!     Arc::new(form.clone()),
//!     transport.clone(),
//!     ids.clone(),
//!     config.autosave.throttle(),
//! );
//! RestorePrompt::new(transport, ids, gate).run(&AlwaysApply, &form).await;
//!
//! form.edit(|f| f.set("title", serde_json::json!("Sea ice extent")));
//! autosave.notify_edit();
//! autosave.flush().await;
//! autosave.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod id_store;
pub mod restore;
pub mod scheduler;
pub mod snapshot;
pub mod status;
pub mod transport;

pub use id_store::{DraftIdStore, FileIdStore, MemoryIdStore};
pub use restore::{FormPopulator, RestoreChoice, RestoreDecider, RestoreOutcome, RestorePrompt};
pub use scheduler::{Autosave, AutosaveGate};
pub use snapshot::{FormField, FormState, SharedForm, Snapshotter};
pub use status::AutosaveState;
pub use transport::{DraftTransport, HttpDraftTransport, TransportError};
