//! Synchronizer for the shared online-user roster.
//!
//! One document lists everyone currently online, each entry carrying its own
//! expiry timestamp. Heartbeats upsert the caller's entry with a fresh TTL;
//! reconciliation prunes expired entries and writes the pruned roster back
//! as best-effort housekeeping. No entry is ever authoritative past its TTL,
//! so reads re-check expiry against the clock instead of trusting the last
//! garbage-collection pass.

use std::sync::Arc;

use tracing::{debug, warn};

use codeboard_core::session::SessionContext;
use codeboard_core::types::{PresenceEntry, now_millis};

use crate::config::StoreConfig;
use crate::error::SyncError;
use crate::store::DocumentStore;

/// How long a heartbeat keeps a user online.
pub const PRESENCE_TTL_MILLIS: i64 = 10 * 60 * 1000;

/// Suggested cadence for [`PresenceSynchronizer::reconcile`] while a session
/// is active.
pub const RECONCILE_INTERVAL_SECS: u64 = 60;

/// Owner of the in-memory roster cache.
pub struct PresenceSynchronizer {
    store: Arc<dyn DocumentStore>,
    config: StoreConfig,
    roster: Vec<PresenceEntry>,
}

impl PresenceSynchronizer {
    /// Build a synchronizer over the given store.
    pub fn new(store: Arc<dyn DocumentStore>, config: StoreConfig) -> Self {
        Self {
            store,
            config,
            roster: Vec::new(),
        }
    }

    /// Currently-online users: the cached roster filtered by expiry at read
    /// time.
    pub fn online_users(&self) -> Vec<PresenceEntry> {
        let now = now_millis();
        self.roster
            .iter()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect()
    }

    /// Whether a user is currently online.
    pub fn is_online(&self, username: &str) -> bool {
        let now = now_millis();
        self.roster
            .iter()
            .any(|e| e.username == username && !e.is_expired(now))
    }

    /// Mark the current user online (upsert with a fresh TTL) or offline
    /// (remove), then write the roster back.
    ///
    /// The in-memory roster is updated before the remote write, so the local
    /// view stays fresh even when the write fails; the failure is still
    /// returned for the caller to see.
    pub async fn heartbeat(
        &mut self,
        session: &SessionContext,
        online: bool,
    ) -> Result<(), SyncError> {
        let doc = self.store.get(&self.config.roster_path).await?;
        let revision = doc.as_ref().map(|d| d.revision.clone());
        let mut users = doc
            .map(|d| parse_roster(&d.body))
            .unwrap_or_default();

        let now = now_millis();
        users.retain(|e| !e.is_expired(now));

        if online {
            let entry = PresenceEntry::fresh(&session.username, PRESENCE_TTL_MILLIS);
            match users.iter_mut().find(|e| e.username == session.username) {
                Some(existing) => *existing = entry,
                None => users.push(entry),
            }
        } else {
            users.retain(|e| e.username != session.username);
        }

        // Local view first: the UI reflects the heartbeat even if the
        // write below loses a race.
        self.roster = users.clone();

        let body = serde_json::to_string(&users)
            .map_err(|e| SyncError::Rejected(format!("roster serialization failed: {e}")))?;
        match self
            .store
            .put(
                &self.config.roster_path,
                &body,
                revision.as_deref(),
                "Update online users",
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("presence heartbeat write failed: {e}");
                Err(e)
            }
        }
    }

    /// Periodic reconciliation: re-read the roster, prune expired entries,
    /// and write back only if pruning changed the set.
    ///
    /// This is routine housekeeping: every failure is logged, none is
    /// surfaced to the user.
    pub async fn reconcile(&mut self) {
        let doc = match self.store.get(&self.config.roster_path).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("presence reconcile fetch failed: {e}");
                return;
            }
        };
        let Some(doc) = doc else {
            self.roster = Vec::new();
            return;
        };

        let users = parse_roster(&doc.body);
        let now = now_millis();
        let active: Vec<PresenceEntry> =
            users.iter().filter(|e| !e.is_expired(now)).cloned().collect();
        let pruned = users.len() - active.len();
        self.roster = active.clone();

        if pruned == 0 {
            return;
        }
        debug!("pruning {pruned} expired roster entries");

        let body = match serde_json::to_string(&active) {
            Ok(body) => body,
            Err(e) => {
                warn!("roster serialization failed: {e}");
                return;
            }
        };
        if let Err(e) = self
            .store
            .put(
                &self.config.roster_path,
                &body,
                Some(&doc.revision),
                "Prune offline users",
            )
            .await
        {
            warn!("presence prune write failed: {e}");
        }
    }
}

/// Parse a roster body, degrading to an empty roster on malformed content;
/// presence is housekeeping and must never take the board down.
fn parse_roster(body: &str) -> Vec<PresenceEntry> {
    match serde_json::from_str(body) {
        Ok(users) => users,
        Err(e) => {
            warn!("online roster is not a presence list: {e}");
            Vec::new()
        }
    }
}
