//! Board entity types and the config-document repair pass.
//!
//! These are the wire shapes of the three document families the board keeps
//! in its backing git repository: the single config document (categories +
//! repositories), one snippet list per repository, and the shared online
//! roster. Field names follow the documents' camelCase JSON.

use chrono::{Local, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::session::{SessionContext, avatar_for};

/// Reserved category id meaning "no filter". Synthesized locally whenever it
/// is missing; always first in the saved category list.
pub const ALL_CATEGORY_ID: &str = "all";

/// Display name of the synthesized "all" category.
pub const ALL_CATEGORY_NAME: &str = "All";

/// Current epoch time in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Human-readable local timestamp used in `time` / `createdAt` / `lastActive`
/// fields.
pub fn now_display() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Allocate a timestamp-derived id with the given prefix, e.g. `repo_17…`.
pub fn timestamp_id(prefix: &str) -> String {
    format!("{}_{}", prefix, now_millis())
}

/// A snippet category. `id == "all"` is the reserved sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Stable id, `category_<epoch-ms>` for user-created categories.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Category {
    /// The reserved "all" sentinel category.
    pub fn all() -> Self {
        Self {
            id: ALL_CATEGORY_ID.to_string(),
            name: ALL_CATEGORY_NAME.to_string(),
        }
    }

    /// A new user-created category with a timestamp-derived id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: timestamp_id("category"),
            name: name.into(),
        }
    }

    /// Whether this is the reserved sentinel.
    pub fn is_all(&self) -> bool {
        self.id == ALL_CATEGORY_ID
    }
}

/// A board repository: a named collection of snippets backed by one document
/// in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Stable id, `repo_<epoch-ms>`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Path of the backing snippet document, derived from `id` at creation
    /// (`<id>.json`) and never changed.
    pub file_path: String,
    /// Owner of the backing git repository.
    pub owner: String,
    /// Name of the backing git repository.
    pub repo_name: String,
    /// Category this repository belongs to. Must reference an existing
    /// category; repaired on load when it does not.
    pub category_id: String,
    /// Usernames with membership. Always contains `created_by` once known.
    #[serde(default)]
    pub members: Vec<String>,
    /// Username of the creator, when known.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Human-readable creation time.
    #[serde(default)]
    pub created_at: String,
}

impl Repository {
    /// Document path derived from a repository id.
    pub fn file_path_for(id: &str) -> String {
        format!("{id}.json")
    }

    /// Returns true if `username` created this repository.
    pub fn is_creator(&self, username: &str) -> bool {
        self.created_by.as_deref() == Some(username)
    }
}

/// A single shared code snippet. Immutable once created; the only mutations
/// of a snippet list are append and delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Timestamp-derived unique id (epoch milliseconds at upload).
    pub id: i64,
    /// The snippet body.
    pub message: String,
    /// Human-readable upload time.
    pub time: String,
    /// Language tag used for highlighting.
    pub language: String,
    /// Username of the uploader.
    #[serde(default)]
    pub author: String,
    /// Id of the repository this snippet lives in.
    pub repo_id: String,
}

/// An entry in the shared online-user roster.
///
/// An entry whose `expiration_time` has passed is logically absent no matter
/// what the stored document says; consumers must re-check expiry at read
/// time rather than trust the last garbage-collection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// Username of the online user.
    pub username: String,
    /// One-character avatar.
    pub avatar: String,
    /// Human-readable last-activity time.
    pub last_active: String,
    /// Epoch milliseconds after which this entry is expired.
    pub expiration_time: i64,
}

impl PresenceEntry {
    /// Build a fresh entry for `username` expiring `ttl_millis` from now.
    pub fn fresh(username: &str, ttl_millis: i64) -> Self {
        Self {
            username: username.to_string(),
            avatar: avatar_for(username),
            last_active: now_display(),
            expiration_time: now_millis() + ttl_millis,
        }
    }

    /// Whether this entry is expired at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiration_time <= now_ms
    }
}

/// The shared config document: the unit of atomicity for categories and
/// repositories. Any mutation to either collection rewrites the whole
/// document.
///
/// Both fields are required and must be arrays on the wire; a document
/// missing either one is structurally invalid and must not be repaired into
/// an empty default (that decision belongs to the elevated user).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// All categories, the `"all"` sentinel first.
    pub categories: Vec<Category>,
    /// All repositories.
    pub repositories: Vec<Repository>,
}

impl BoardConfig {
    /// Re-establish the invariants the rest of the system assumes.
    ///
    /// - exactly one `"all"` category exists and it is first;
    /// - every repository's `category_id` references an existing category
    ///   (orphans are reassigned to the first non-`"all"` category, falling
    ///   back to `"all"` when none exists);
    /// - `members` contains `created_by` once known; with a session at hand,
    ///   a repository with no known creator is claimed by the current user,
    ///   as the original board did.
    ///
    /// Returns true if anything changed.
    pub fn normalize(&mut self, session: Option<&SessionContext>) -> bool {
        let mut changed = false;

        // Exactly one "all", first.
        let all_count = self.categories.iter().filter(|c| c.is_all()).count();
        if all_count != 1 || !self.categories[0].is_all() {
            let existing_all = self.categories.iter().find(|c| c.is_all()).cloned();
            self.categories.retain(|c| !c.is_all());
            self.categories
                .insert(0, existing_all.unwrap_or_else(Category::all));
            changed = true;
        }

        let fallback = self.fallback_category_id();
        let valid_ids: Vec<&str> = self.categories.iter().map(|c| c.id.as_str()).collect();

        for repo in &mut self.repositories {
            if repo.category_id != ALL_CATEGORY_ID
                && !valid_ids.contains(&repo.category_id.as_str())
            {
                info!(
                    "reassigning repository {} from missing category {} to {}",
                    repo.id, repo.category_id, fallback
                );
                repo.category_id = fallback.clone();
                changed = true;
            }

            if repo.created_by.is_none() {
                if let Some(session) = session {
                    repo.created_by = Some(session.username.clone());
                    changed = true;
                }
            }
            if let Some(creator) = repo.created_by.clone() {
                if !repo.members.contains(&creator) {
                    repo.members.insert(0, creator);
                    changed = true;
                }
            }
        }

        changed
    }

    /// Id of the first non-`"all"` category, or `"all"` when none exists.
    pub fn fallback_category_id(&self) -> String {
        self.categories
            .iter()
            .find(|c| !c.is_all())
            .map(|c| c.id.clone())
            .unwrap_or_else(|| ALL_CATEGORY_ID.to_string())
    }

    /// Returns true if any repository references the given category.
    pub fn category_in_use(&self, category_id: &str) -> bool {
        self.repositories
            .iter()
            .any(|r| r.category_id == category_id)
    }
}
