//! Synchronizer for the shared config document (categories + repositories).
//!
//! The config document is the unit of atomicity for board structure: every
//! mutation to either collection rewrites the whole document. Loading runs
//! the body through the integrity guard, re-establishes the board invariants,
//! and persists the repaired result immediately so another client's next
//! load does not re-encounter the same damage.
//!
//! A load failure is not symmetric across users: the elevated account is
//! offered recovery (create the default configuration), everyone else gets
//! empty-but-usable caches and no remote write is attempted.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use codeboard_core::integrity::{self, CheckedJson};
use codeboard_core::session::SessionContext;
use codeboard_core::types::{
    ALL_CATEGORY_ID, BoardConfig, Category, Repository, now_display, timestamp_id,
};

use crate::config::StoreConfig;
use crate::error::SyncError;
use crate::notify::Notifier;
use crate::store::DocumentStore;

/// Hard cap on the serialized config document. Oversized saves abort rather
/// than truncate.
pub const MAX_CONFIG_BYTES: usize = 1_000_000;

/// Delay before the single automatic retry of a transport-failed save.
pub const SAVE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Where the config synchronizer is in its load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigState {
    /// No load attempted yet.
    #[default]
    Unloaded,
    /// A load is in flight.
    Loading,
    /// Caches hold a validated config.
    Loaded,
    /// Load failed and the elevated user has been asked whether to create
    /// the default configuration.
    ErrorNeedsDecision,
    /// Load failed for a non-elevated user; caches were emptied so the UI
    /// can render without crashing.
    ErrorAutoEmpty,
}

/// Result of a [`ConfigSynchronizer::load`] cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLoadOutcome {
    /// Config loaded (possibly after repair) and caches are populated.
    Loaded {
        /// The body needed structural repair before parsing.
        repaired: bool,
        /// The mandatory save-after-load actually reached the store (it is
        /// skipped without an authenticated session, and may fail).
        persisted: bool,
    },
    /// Load failed; the elevated caller may invoke
    /// [`ConfigSynchronizer::create_default_config`].
    NeedsDecision {
        /// Why the load failed.
        reason: String,
    },
    /// Load failed; caches were set to empty collections and no remote
    /// mutation was attempted.
    EmptyFallback {
        /// Why the load failed.
        reason: String,
    },
}

/// Owner of the categories / repositories / current-repository caches and
/// the load/repair/save cycle around the shared config document.
pub struct ConfigSynchronizer {
    store: Arc<dyn DocumentStore>,
    config: StoreConfig,
    notifier: Notifier,
    state: ConfigState,
    board: BoardConfig,
    current_repo: Option<String>,
    revision: Option<String>,
    retry_delay: Duration,
}

impl ConfigSynchronizer {
    /// Build a synchronizer over the given store.
    pub fn new(store: Arc<dyn DocumentStore>, config: StoreConfig, notifier: Notifier) -> Self {
        Self {
            store,
            config,
            notifier,
            state: ConfigState::Unloaded,
            board: BoardConfig::default(),
            current_repo: None,
            revision: None,
            retry_delay: SAVE_RETRY_DELAY,
        }
    }

    /// Override the save-retry delay (tests use zero).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Current state-machine position.
    pub fn state(&self) -> ConfigState {
        self.state
    }

    /// Revision token of the last config document seen or written.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Cached categories, `"all"` first.
    pub fn categories(&self) -> &[Category] {
        &self.board.categories
    }

    /// Cached repositories.
    pub fn repositories(&self) -> &[Repository] {
        &self.board.repositories
    }

    /// The currently selected repository, if any.
    pub fn current_repo(&self) -> Option<&Repository> {
        let id = self.current_repo.as_deref()?;
        self.board.repositories.iter().find(|r| r.id == id)
    }

    /// Select a repository by id. Returns the selection.
    pub fn select_repository(&mut self, id: &str) -> Option<Repository> {
        let repo = self.board.repositories.iter().find(|r| r.id == id).cloned()?;
        self.current_repo = Some(repo.id.clone());
        Some(repo)
    }

    // ==================== load ====================

    /// Load the config document: fetch, verify, repair, normalize, persist.
    ///
    /// Every failure path leaves the caches in a consistent (possibly empty)
    /// state; the outcome says which recovery, if any, is on offer.
    pub async fn load(&mut self, session: Option<&SessionContext>) -> ConfigLoadOutcome {
        self.state = ConfigState::Loading;

        let doc = match self.store.get(&self.config.config_path).await {
            Ok(doc) => doc,
            Err(e) => return self.fail_load(session, format!("config load failed: {e}")),
        };
        let Some(doc) = doc else {
            return self.fail_load(session, "config document does not exist");
        };
        if doc.body.trim().is_empty() {
            return self.fail_load(session, "config document exists but is empty");
        }

        let (text, repaired) = match integrity::check(&doc.body) {
            CheckedJson::Valid => (doc.body.clone(), false),
            CheckedJson::Repaired(fixed) => {
                warn!("config document was truncated; using repaired body");
                (fixed, true)
            }
            CheckedJson::Corrupt => {
                return self.fail_load(session, "config document is corrupt (unrepairable JSON)");
            }
        };

        // Missing or non-array categories/repositories fail deserialization,
        // which is exactly the structural check the document contract asks
        // for.
        let mut board: BoardConfig = match serde_json::from_str(&text) {
            Ok(board) => board,
            Err(e) => {
                return self.fail_load(session, format!("config structure invalid: {e}"));
            }
        };

        board.normalize(session);
        self.revision = Some(doc.revision);
        self.board = board;
        self.state = ConfigState::Loaded;

        // Persist immediately so repairs are not lost on another client's
        // next load. Saving requires a session; without one the repaired
        // state stays local.
        let persisted = match session {
            Some(session) => self.save(session).await.is_ok(),
            None => false,
        };

        self.notifier.success("Board config loaded");
        ConfigLoadOutcome::Loaded { repaired, persisted }
    }

    fn fail_load(
        &mut self,
        session: Option<&SessionContext>,
        reason: impl Into<String>,
    ) -> ConfigLoadOutcome {
        let reason = reason.into();
        error!("config load: {reason}");

        if session.is_some_and(|s| s.is_elevated) {
            self.state = ConfigState::ErrorNeedsDecision;
            self.notifier.error(format!(
                "Config error: {reason}. Create the default configuration?"
            ));
            ConfigLoadOutcome::NeedsDecision { reason }
        } else {
            self.state = ConfigState::ErrorAutoEmpty;
            self.board = BoardConfig::default();
            self.current_repo = None;
            self.revision = None;
            self.notifier
                .error(format!("Config error: {reason}. Contact an administrator."));
            ConfigLoadOutcome::EmptyFallback { reason }
        }
    }

    /// The elevated user declined to create a default configuration after a
    /// failed load. Leaves empty caches so the UI can still render.
    pub fn decline_default_config(&mut self) {
        self.state = ConfigState::ErrorAutoEmpty;
        self.board = BoardConfig::default();
        self.current_repo = None;
        self.notifier
            .error("Config error: no default configuration was created");
    }

    /// Seed the default configuration: the `"all"` sentinel, one starter
    /// category, and one default repository owned by the current user (with
    /// its backing snippet document created remotely). Elevated only.
    pub async fn create_default_config(
        &mut self,
        session: &SessionContext,
    ) -> Result<(), SyncError> {
        self.require_elevated(session, "create the default configuration")?;

        let categories = vec![Category::all(), Category::new("General")];
        let repo_id = timestamp_id("repo");
        let repo = Repository {
            id: repo_id.clone(),
            name: "Default Repository".to_string(),
            description: "Default snippet repository".to_string(),
            file_path: Repository::file_path_for(&repo_id),
            owner: self.config.owner.clone(),
            repo_name: self.config.repo.clone(),
            category_id: categories[1].id.clone(),
            members: vec![session.username.clone()],
            created_by: Some(session.username.clone()),
            created_at: now_display(),
        };

        if let Err(e) = self.create_empty_snippet_doc(&repo).await {
            warn!("could not create backing document for {}: {e}", repo.id);
            self.notifier
                .error(format!("Failed to create repository file: {e}"));
        }

        self.board = BoardConfig {
            categories,
            repositories: vec![repo],
        };
        self.current_repo = None;
        self.state = ConfigState::Loaded;

        self.save(session).await?;
        self.notifier.success("Default configuration created");
        Ok(())
    }

    // ==================== save ====================

    /// Persist the current caches as the config document.
    ///
    /// Re-applies the board invariants, re-fetches the revision token
    /// immediately before writing, and falls back to a create when the
    /// document is absent. A timeout/network-class failure is retried
    /// exactly once after a fixed delay; every other failure is surfaced.
    pub async fn save(&mut self, session: &SessionContext) -> Result<(), SyncError> {
        self.board.normalize(Some(session));

        // Deterministic, diffable serialization: struct field order is
        // stable, pretty-printing keeps the document reviewable in the
        // backing repository.
        let text = serde_json::to_string_pretty(&self.board)
            .map_err(|e| SyncError::Rejected(format!("config serialization failed: {e}")))?;

        if text.len() > MAX_CONFIG_BYTES {
            let err = SyncError::TooLarge { size: text.len() };
            self.notifier
                .error("Board config is too large to save".to_string());
            return Err(err);
        }

        let revision = match self.try_save(&text).await {
            Ok(revision) => revision,
            Err(e) if e.is_retryable() => {
                warn!("config save hit a transient failure, retrying once: {e}");
                tokio::time::sleep(self.retry_delay).await;
                match self.try_save(&text).await {
                    Ok(revision) => revision,
                    Err(e) => {
                        self.notifier
                            .error(format!("Failed to save board config: {e}"));
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to save board config: {e}"));
                return Err(e);
            }
        };

        self.revision = Some(revision);
        self.notifier.success("Board config saved");
        Ok(())
    }

    /// One save attempt: re-fetch the current token (the store's answer
    /// supersedes anything cached), then update, or create when absent.
    async fn try_save(&self, text: &str) -> Result<String, SyncError> {
        let current = self.store.get(&self.config.config_path).await?;
        let revision = current.as_ref().map(|d| d.revision.as_str());
        self.store
            .put(&self.config.config_path, text, revision, "Update board config")
            .await
    }

    async fn create_empty_snippet_doc(&self, repo: &Repository) -> Result<(), SyncError> {
        // An existing document is reset to the empty list, matching the
        // token fetched in the same breath.
        let existing = self.store.get(&repo.file_path).await?;
        let revision = existing.as_ref().map(|d| d.revision.as_str());
        self.store
            .put(&repo.file_path, "[]", revision, "Create repository file")
            .await?;
        Ok(())
    }

    fn require_elevated(&self, session: &SessionContext, action: &str) -> Result<(), SyncError> {
        if session.is_elevated {
            Ok(())
        } else {
            let err = SyncError::Permission(format!("administrator privilege required to {action}"));
            self.notifier.error(err.to_string());
            Err(err)
        }
    }

    // ==================== categories ====================

    /// Create a category. Elevated only.
    pub async fn create_category(
        &mut self,
        session: &SessionContext,
        name: &str,
    ) -> Result<Category, SyncError> {
        self.require_elevated(session, "create categories")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject("category name must not be empty"));
        }

        let category = Category::new(name);
        self.board.categories.push(category.clone());
        self.save(session).await?;
        self.notifier
            .success(format!("Category {} created", category.name));
        Ok(category)
    }

    /// Rename a category. Elevated only.
    pub async fn rename_category(
        &mut self,
        session: &SessionContext,
        id: &str,
        name: &str,
    ) -> Result<(), SyncError> {
        self.require_elevated(session, "rename categories")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject("category name must not be empty"));
        }
        let Some(category) = self.board.categories.iter_mut().find(|c| c.id == id) else {
            return Err(SyncError::NotFound(format!("category {id}")));
        };
        category.name = name.to_string();
        self.save(session).await?;
        self.notifier.success("Category updated");
        Ok(())
    }

    /// Delete a category. Elevated only; the `"all"` sentinel and categories
    /// still referenced by a repository are refused.
    pub async fn delete_category(
        &mut self,
        session: &SessionContext,
        id: &str,
    ) -> Result<(), SyncError> {
        self.require_elevated(session, "delete categories")?;
        if id == ALL_CATEGORY_ID {
            return Err(self.reject("the \"all\" category cannot be deleted"));
        }
        if self.board.category_in_use(id) {
            return Err(self.reject("category still has repositories; move or delete them first"));
        }
        if !self.board.categories.iter().any(|c| c.id == id) {
            return Err(SyncError::NotFound(format!("category {id}")));
        }

        self.board.categories.retain(|c| c.id != id);
        self.save(session).await?;
        self.notifier.success("Category deleted");
        Ok(())
    }

    // ==================== repositories ====================

    /// Create a repository owned by the current user, including its backing
    /// empty snippet document. Any authenticated user may create one.
    ///
    /// An unknown or `"all"` category id falls back to the first regular
    /// category.
    pub async fn create_repository(
        &mut self,
        session: &SessionContext,
        name: &str,
        description: &str,
        category_id: Option<&str>,
    ) -> Result<Repository, SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject("repository name must not be empty"));
        }

        let category_id = match category_id {
            Some(id)
                if id != ALL_CATEGORY_ID
                    && self.board.categories.iter().any(|c| c.id == id) =>
            {
                id.to_string()
            }
            _ => self.board.fallback_category_id(),
        };

        let id = timestamp_id("repo");
        let repo = Repository {
            id: id.clone(),
            name: name.to_string(),
            description: description.trim().to_string(),
            file_path: Repository::file_path_for(&id),
            owner: self.config.owner.clone(),
            repo_name: self.config.repo.clone(),
            category_id,
            members: vec![session.username.clone()],
            created_by: Some(session.username.clone()),
            created_at: now_display(),
        };

        self.board.repositories.push(repo.clone());
        self.save(session).await?;

        if let Err(e) = self.create_empty_snippet_doc(&repo).await {
            warn!("could not create backing document for {}: {e}", repo.id);
            self.notifier
                .error(format!("Failed to create repository file: {e}"));
        }

        self.current_repo = Some(repo.id.clone());
        self.notifier
            .success(format!("Repository {} created", repo.name));
        Ok(repo)
    }

    /// Edit a repository's name, description, and category. Elevated only.
    pub async fn update_repository(
        &mut self,
        session: &SessionContext,
        id: &str,
        name: &str,
        description: &str,
        category_id: Option<&str>,
    ) -> Result<(), SyncError> {
        self.require_elevated(session, "edit repositories")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject("repository name must not be empty"));
        }
        if let Some(category_id) = category_id {
            let known = category_id != ALL_CATEGORY_ID
                && self.board.categories.iter().any(|c| c.id == category_id);
            if !known {
                return Err(self.reject(format!("unknown category {category_id}")));
            }
        }

        let Some(repo) = self.board.repositories.iter_mut().find(|r| r.id == id) else {
            return Err(SyncError::NotFound(format!("repository {id}")));
        };
        repo.name = name.to_string();
        repo.description = description.trim().to_string();
        if let Some(category_id) = category_id {
            repo.category_id = category_id.to_string();
        }

        self.save(session).await?;
        self.notifier.success("Repository updated");
        Ok(())
    }

    /// Delete a repository: its backing remote document first, then the
    /// config entry. Elevated only.
    pub async fn delete_repository(
        &mut self,
        session: &SessionContext,
        id: &str,
    ) -> Result<(), SyncError> {
        self.require_elevated(session, "delete repositories")?;
        let Some(repo) = self.board.repositories.iter().find(|r| r.id == id).cloned() else {
            return Err(SyncError::NotFound(format!("repository {id}")));
        };

        // Fetch the backing document's current token; an already-absent
        // document has nothing to delete.
        match self.store.get(&repo.file_path).await {
            Ok(Some(doc)) => {
                if let Err(e) = self
                    .store
                    .delete(
                        &repo.file_path,
                        &doc.revision,
                        &format!("Delete repository {}", repo.name),
                    )
                    .await
                {
                    self.notifier
                        .error(format!("Failed to delete repository file: {e}"));
                    return Err(e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.notifier
                    .error(format!("Failed to delete repository file: {e}"));
                return Err(e);
            }
        }

        self.board.repositories.retain(|r| r.id != id);
        if self.current_repo.as_deref() == Some(id) {
            self.current_repo = None;
        }
        self.save(session).await?;
        self.notifier
            .success(format!("Repository {} deleted", repo.name));
        Ok(())
    }

    // ==================== membership ====================

    /// Add a member to a repository. Allowed for the administrator and the
    /// repository's creator.
    pub async fn add_member(
        &mut self,
        session: &SessionContext,
        repo_id: &str,
        username: &str,
    ) -> Result<(), SyncError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(self.reject("username must not be empty"));
        }
        self.require_membership_authority(session, repo_id)?;

        let Some(repo) = self.board.repositories.iter_mut().find(|r| r.id == repo_id) else {
            return Err(SyncError::NotFound(format!("repository {repo_id}")));
        };
        if repo.members.iter().any(|m| m == username) {
            return Err(self.reject(format!("{username} is already a member")));
        }
        repo.members.push(username.to_string());

        self.save(session).await?;
        self.notifier.success(format!("Member {username} added"));
        Ok(())
    }

    /// Remove a member from a repository. The creator cannot be removed.
    pub async fn remove_member(
        &mut self,
        session: &SessionContext,
        repo_id: &str,
        username: &str,
    ) -> Result<(), SyncError> {
        self.require_membership_authority(session, repo_id)?;

        let Some(repo) = self.board.repositories.iter_mut().find(|r| r.id == repo_id) else {
            return Err(SyncError::NotFound(format!("repository {repo_id}")));
        };
        if repo.is_creator(username) {
            return Err(self.reject("the repository creator cannot be removed"));
        }
        if !repo.members.iter().any(|m| m == username) {
            return Err(self.reject(format!("{username} is not a member")));
        }
        repo.members.retain(|m| m != username);

        self.save(session).await?;
        self.notifier.success(format!("Member {username} removed"));
        Ok(())
    }

    fn require_membership_authority(
        &self,
        session: &SessionContext,
        repo_id: &str,
    ) -> Result<(), SyncError> {
        let creator = self
            .board
            .repositories
            .iter()
            .find(|r| r.id == repo_id)
            .is_some_and(|r| r.is_creator(&session.username));
        if session.is_elevated || creator {
            Ok(())
        } else {
            let err = SyncError::Permission(
                "only the administrator or the repository creator can manage members".to_string(),
            );
            self.notifier.error(err.to_string());
            Err(err)
        }
    }

    fn reject(&self, reason: impl Into<String>) -> SyncError {
        let err = SyncError::Rejected(reason.into());
        self.notifier.error(err.to_string());
        err
    }
}
