//! Session context for the active user.
//!
//! The board has no server-side accounts; the UI shell resolves whoever is
//! signed in (or a generated guest identity) into a `SessionContext` and
//! passes it explicitly into every synchronizer call. There is no ambient
//! "current user" global anywhere in this workspace.

use serde::{Deserialize, Serialize};

/// The authenticated (or guest) identity performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Username as shown on snippets and in the online roster.
    pub username: String,
    /// Whether this is the single privileged account allowed to manage
    /// categories, repositories, and default configuration.
    pub is_elevated: bool,
}

impl SessionContext {
    /// Create a session for a regular user.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_elevated: false,
        }
    }

    /// Create a session for the privileged administrator account.
    pub fn elevated(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_elevated: true,
        }
    }

    /// One-character avatar derived from the username, uppercased.
    pub fn avatar(&self) -> String {
        avatar_for(&self.username)
    }
}

/// Derive the one-character roster avatar for a username.
pub fn avatar_for(username: &str) -> String {
    username
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_default()
}
