//! # codeboard sync engine
//!
//! Client-side synchronization layer for codeboard. All board state lives as
//! JSON documents in a git-hosting provider's repository, reached through its
//! REST contents API; this crate is the read/verify/repair/write protocol
//! around those documents.
//!
//! This crate provides:
//! - **Store client**: [`store::DocumentStore`], the contents API as an
//!   opaque revision-guarded key-value store, plus an in-memory double
//! - **Config synchronizer**: the shared categories+repositories document
//! - **Snippet synchronizer**: one append-only snippet list per repository
//! - **Presence synchronizer**: the shared online roster with per-entry TTL
//!
//! There is no server of our own and no push channel: freshness comes from
//! polling, and the only defense against concurrent editors is the store's
//! revision token, re-fetched immediately before every write.

pub mod config;
pub mod config_sync;
pub mod error;
pub mod notify;
pub mod presence;
pub mod snippets;
pub mod store;

pub use config::StoreConfig;
pub use config_sync::{ConfigLoadOutcome, ConfigState, ConfigSynchronizer};
pub use error::SyncError;
pub use notify::{Notifier, StatusEvent, StatusLevel};
pub use presence::PresenceSynchronizer;
pub use snippets::{SnippetLoad, SnippetSynchronizer};
pub use store::{ContentsApiStore, Document, DocumentStore, InMemoryStore};
