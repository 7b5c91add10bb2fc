//! # `codeboard_core`
//!
//! Core library for codeboard, a snippet-sharing board that keeps all of its
//! state as JSON documents inside a git-hosting provider's repository.
//!
//! This crate holds the pure, I/O-free pieces shared by every client:
//! the board entity types, the repair pass that keeps the shared config
//! document internally consistent, the JSON integrity guard used before any
//! remote document is trusted, and the session context threaded through every
//! synchronizer call.

#![warn(missing_docs)]

/// JSON integrity guard: validation and structural repair of document bodies.
pub mod integrity;

/// Session context for the active user.
pub mod session;

/// Board entity types and the config-document repair pass.
pub mod types;
