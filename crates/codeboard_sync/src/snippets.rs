//! Synchronizer for per-repository snippet documents.
//!
//! Each repository owns one remote document holding an append-only JSON list
//! of snippets. Freshness is polling-only, so `load` compares the fetched
//! (revision, body) pair against the last one seen for that repository and
//! short-circuits when nothing changed; that is the only defense against redundant
//! re-renders.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use codeboard_core::session::SessionContext;
use codeboard_core::types::{Repository, Snippet, now_display, now_millis};

use crate::error::SyncError;
use crate::notify::Notifier;
use crate::store::DocumentStore;

/// Suggested cadence for re-invoking [`SnippetSynchronizer::load`] on the
/// selected repository. There is no push channel; this is the freshness
/// mechanism.
pub const SNIPPET_POLL_INTERVAL_SECS: u64 = 5;

/// Result of a [`SnippetSynchronizer::load`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetLoad {
    /// Whether the document changed since the last load of this repository.
    /// This is the render signal; an unchanged poll must not re-render.
    pub changed: bool,
    /// Snapshot of the repository's snippets after this load.
    pub snippets: Vec<Snippet>,
}

/// Owner of the snippets-by-repository cache.
pub struct SnippetSynchronizer {
    store: Arc<dyn DocumentStore>,
    notifier: Notifier,
    cache: HashMap<String, Vec<Snippet>>,
    /// Last (revision, body) seen per repository, for the unchanged
    /// short-circuit.
    last_seen: HashMap<String, (String, String)>,
    /// Repositories that have been loaded at least once this session.
    loaded_once: HashSet<String>,
}

impl SnippetSynchronizer {
    /// Build a synchronizer over the given store.
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Notifier) -> Self {
        Self {
            store,
            notifier,
            cache: HashMap::new(),
            last_seen: HashMap::new(),
            loaded_once: HashSet::new(),
        }
    }

    /// Cached snippets for a repository.
    pub fn snippets(&self, repo_id: &str) -> &[Snippet] {
        self.cache.get(repo_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Case-insensitive substring search over the cached snippets of a
    /// repository, matching body, language, and author. An empty term
    /// returns everything.
    pub fn search(&self, repo_id: &str, term: &str) -> Vec<Snippet> {
        let term = term.to_lowercase();
        self.snippets(repo_id)
            .iter()
            .filter(|s| {
                term.is_empty()
                    || s.message.to_lowercase().contains(&term)
                    || s.language.to_lowercase().contains(&term)
                    || s.author.to_lowercase().contains(&term)
            })
            .cloned()
            .collect()
    }

    /// Drop all cached state for a repository (after it is deleted).
    pub fn forget(&mut self, repo_id: &str) {
        self.cache.remove(repo_id);
        self.last_seen.remove(repo_id);
        self.loaded_once.remove(repo_id);
    }

    /// Load (or poll) a repository's snippet document.
    ///
    /// An absent document is an empty repository, reported once per session;
    /// an unparseable body degrades to an empty list rather than failing the
    /// caller. Transport failures surface as errors with the cache emptied
    /// so the UI can still render.
    pub async fn load(&mut self, repo: &Repository) -> Result<SnippetLoad, SyncError> {
        let first_load = !self.loaded_once.contains(&repo.id);

        let doc = match self.store.get(&repo.file_path).await {
            Ok(doc) => doc,
            Err(e) => {
                self.cache.insert(repo.id.clone(), Vec::new());
                self.last_seen.remove(&repo.id);
                if first_load {
                    self.notifier
                        .error(format!("Failed to load snippets: {e}"));
                }
                return Err(e);
            }
        };
        self.loaded_once.insert(repo.id.clone());

        let Some(doc) = doc else {
            let changed = self.last_seen.remove(&repo.id).is_some() || first_load;
            self.cache.insert(repo.id.clone(), Vec::new());
            if first_load {
                self.notifier
                    .success("Repository is empty, add the first snippet");
            }
            return Ok(SnippetLoad {
                changed,
                snippets: Vec::new(),
            });
        };

        if self
            .last_seen
            .get(&repo.id)
            .is_some_and(|(revision, body)| *revision == doc.revision && *body == doc.body)
        {
            debug!("snippet document for {} unchanged, skipping", repo.id);
            return Ok(SnippetLoad {
                changed: false,
                snippets: self.snippets(&repo.id).to_vec(),
            });
        }

        let snippets: Vec<Snippet> = match serde_json::from_str(&doc.body) {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!("snippet document for {} is not a snippet list: {e}", repo.id);
                Vec::new()
            }
        };

        self.last_seen
            .insert(repo.id.clone(), (doc.revision, doc.body));
        self.cache.insert(repo.id.clone(), snippets.clone());
        if first_load {
            self.notifier.success("Snippets loaded");
        }
        Ok(SnippetLoad {
            changed: true,
            snippets,
        })
    }

    /// Append a snippet to a repository's document.
    ///
    /// Read-modify-write: the revision token used for the write comes from
    /// the same fetch that produced the list being extended, never from a
    /// cache.
    pub async fn append(
        &mut self,
        session: &SessionContext,
        repo: &Repository,
        message: &str,
        language: &str,
    ) -> Result<Snippet, SyncError> {
        if message.is_empty() {
            let err = SyncError::Rejected("snippet body must not be empty".to_string());
            self.notifier.error(err.to_string());
            return Err(err);
        }

        let doc = self.store.get(&repo.file_path).await.inspect_err(|e| {
            self.notifier.error(format!("Failed to submit snippet: {e}"));
        })?;
        let (mut snippets, revision) = match doc {
            Some(doc) => {
                let snippets: Vec<Snippet> = serde_json::from_str(&doc.body).map_err(|e| {
                    let err =
                        SyncError::Corrupt(format!("snippet document for {}: {e}", repo.id));
                    self.notifier.error(format!("Failed to submit snippet: {err}"));
                    err
                })?;
                (snippets, Some(doc.revision))
            }
            None => (Vec::new(), None),
        };

        let snippet = Snippet {
            id: now_millis(),
            message: message.to_string(),
            time: now_display(),
            language: language.to_string(),
            author: session.username.clone(),
            repo_id: repo.id.clone(),
        };
        snippets.push(snippet.clone());

        let body = serde_json::to_string(&snippets)
            .map_err(|e| SyncError::Rejected(format!("snippet serialization failed: {e}")))?;
        let commit = format!("{} added a snippet to {}", session.username, repo.name);
        let new_revision = self
            .store
            .put(&repo.file_path, &body, revision.as_deref(), &commit)
            .await
            .inspect_err(|e| {
                self.notifier.error(format!("Failed to submit snippet: {e}"));
            })?;

        self.last_seen.insert(repo.id.clone(), (new_revision, body));
        self.cache.insert(repo.id.clone(), snippets);
        self.notifier.success("Snippet submitted");
        Ok(snippet)
    }

    /// Delete a snippet from a repository's document.
    ///
    /// Permitted only for the administrator, the repository's creator, or
    /// the snippet's author; an unauthorized attempt performs no write.
    pub async fn delete(
        &mut self,
        session: &SessionContext,
        repo: &Repository,
        snippet_id: i64,
    ) -> Result<(), SyncError> {
        let doc = self.store.get(&repo.file_path).await.inspect_err(|e| {
            self.notifier.error(format!("Failed to delete snippet: {e}"));
        })?;
        let Some(doc) = doc else {
            let err = SyncError::NotFound(format!("snippet document for {}", repo.id));
            self.notifier.error("Failed to delete snippet: document missing");
            return Err(err);
        };

        let snippets: Vec<Snippet> = serde_json::from_str(&doc.body).map_err(|e| {
            let err = SyncError::Corrupt(format!("snippet document for {}: {e}", repo.id));
            self.notifier.error(format!("Failed to delete snippet: {err}"));
            err
        })?;
        let Some(target) = snippets.iter().find(|s| s.id == snippet_id) else {
            let err = SyncError::NotFound(format!("snippet {snippet_id}"));
            self.notifier.error("Failed to delete snippet: not found");
            return Err(err);
        };

        let authorized = session.is_elevated
            || repo.is_creator(&session.username)
            || target.author == session.username;
        if !authorized {
            let err =
                SyncError::Permission("no permission to delete this snippet".to_string());
            self.notifier.error(err.to_string());
            return Err(err);
        }

        let remaining: Vec<Snippet> = snippets
            .into_iter()
            .filter(|s| s.id != snippet_id)
            .collect();
        let body = serde_json::to_string(&remaining)
            .map_err(|e| SyncError::Rejected(format!("snippet serialization failed: {e}")))?;
        let new_revision = self
            .store
            .put(
                &repo.file_path,
                &body,
                Some(&doc.revision),
                &format!("Delete snippet {snippet_id}"),
            )
            .await
            .inspect_err(|e| {
                self.notifier.error(format!("Failed to delete snippet: {e}"));
            })?;

        self.last_seen.insert(repo.id.clone(), (new_revision, body));
        self.cache.insert(repo.id.clone(), remaining);
        self.notifier.success("Snippet deleted");
        Ok(())
    }
}
