//! Metadraft - autosave drafts for long-form metadata editing
//!
//! This library provides both halves of the autosave subsystem: the
//! session-scoped draft store with its HTTP interface, and the client-side
//! component that snapshots a form and shadows it into the store.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `store`: Draft store, record types, and pluggable record backends
//! - `server`: HTTP interface to the draft store
//! - `client`: Snapshotter, transport, autosave scheduler, and restore prompt
//! - `payload`: Opaque, order-preserving payload documents and checksums
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use metadraft::{Config, DraftStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_yaml("store:\n  root: ./var/drafts\n")?;
//!     config.validate()?;
//!
//!     let store = DraftStore::open(&config.store)?;
//!     let report = store.sweep()?;
//!     println!("removed {} expired drafts", report.removed);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod payload;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use client::{Autosave, AutosaveState, RestorePrompt};
pub use config::Config;
pub use error::{MetadraftError, Result};
pub use payload::Document;
pub use store::{DraftId, DraftStore, OwnerKey};
