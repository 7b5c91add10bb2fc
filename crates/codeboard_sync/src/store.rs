//! Remote document store access.
//!
//! The git host's contents API is treated as an opaque key-value store of
//! UTF-8 text documents, each guarded by an opaque revision token (the
//! content SHA). [`DocumentStore`] is the only seam the synchronizers see;
//! [`ContentsApiStore`] talks to the real API over HTTP, and
//! [`InMemoryStore`] enforces the same token compare-and-swap semantics for
//! tests.
//!
//! The wire encodes bodies as base64. That codec lives entirely in this
//! module; no caller ever touches base64.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::config::StoreConfig;
use crate::error::SyncError;

/// A document fetched from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Decoded UTF-8 body. May be empty for a present-but-empty file.
    pub body: String,
    /// Revision token required to update or delete this document.
    pub revision: String,
}

/// Revision-guarded key-value access to JSON documents.
///
/// `put` with `revision: None` creates the document; absence is a
/// precondition, and creating over an existing document is a conflict, never
/// a silent overwrite. `put` with a stale token is likewise a conflict.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document. `Ok(None)` means the document does not exist;
    /// transport failures and non-404 errors are `Err`.
    async fn get(&self, path: &str) -> Result<Option<Document>, SyncError>;

    /// Create (`revision: None`) or update (`revision: Some`) a document.
    /// Returns the new revision token.
    async fn put(
        &self,
        path: &str,
        body: &str,
        revision: Option<&str>,
        message: &str,
    ) -> Result<String, SyncError>;

    /// Delete a document at a known revision.
    async fn delete(&self, path: &str, revision: &str, message: &str) -> Result<(), SyncError>;
}

// ==================== Contents API backend ====================

#[derive(Deserialize)]
struct ContentsFile {
    #[serde(default)]
    content: Option<String>,
    sha: String,
}

#[derive(Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Deserialize)]
struct WrittenContent {
    sha: String,
}

/// `DocumentStore` over the git host's REST contents API.
pub struct ContentsApiStore {
    config: StoreConfig,
    client: reqwest::Client,
}

impl ContentsApiStore {
    /// Build a store client for the configured repository.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base, self.config.owner, self.config.repo, path
        )
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.config.access_token)
    }

    /// Map a non-2xx write response to the taxonomy. 409 is the store
    /// refusing a stale or wrong revision token.
    async fn classify_write_failure(path: &str, resp: reqwest::Response) -> SyncError {
        let status = resp.status();
        if status == StatusCode::CONFLICT {
            return SyncError::Conflict {
                path: path.to_string(),
            };
        }
        let body = resp.text().await.unwrap_or_default();
        warn!("contents API write to {} failed: {} {}", path, status, body);
        SyncError::Transport {
            message: format!("HTTP {status}: {body}"),
            retryable: false,
        }
    }
}

#[async_trait]
impl DocumentStore for ContentsApiStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, SyncError> {
        let resp = self
            .client
            .get(self.url(path))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(SyncError::from_transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Transport {
                message: format!("HTTP {status}: {body}"),
                retryable: false,
            });
        }

        let file: ContentsFile = resp
            .json()
            .await
            .map_err(|e| SyncError::Corrupt(format!("unreadable contents response: {e}")))?;

        let raw = file.content.unwrap_or_default();
        // The API wraps base64 in newlines; strip all whitespace first.
        let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let body = if cleaned.is_empty() {
            String::new()
        } else {
            let bytes = BASE64
                .decode(cleaned.as_bytes())
                .map_err(|e| SyncError::Corrupt(format!("invalid base64 in {path}: {e}")))?;
            String::from_utf8(bytes)
                .map_err(|e| SyncError::Corrupt(format!("non-UTF-8 body in {path}: {e}")))?
        };

        Ok(Some(Document {
            body,
            revision: file.sha,
        }))
    }

    async fn put(
        &self,
        path: &str,
        body: &str,
        revision: Option<&str>,
        message: &str,
    ) -> Result<String, SyncError> {
        let mut payload = json!({
            "message": message,
            "content": BASE64.encode(body.as_bytes()),
            "branch": self.config.branch,
        });
        let request = match revision {
            Some(revision) => {
                payload["sha"] = json!(revision);
                self.client.put(self.url(path))
            }
            None => self.client.post(self.url(path)),
        };

        let resp = request
            .header(AUTHORIZATION, self.auth_header())
            .json(&payload)
            .send()
            .await
            .map_err(SyncError::from_transport)?;

        if !resp.status().is_success() {
            return Err(Self::classify_write_failure(path, resp).await);
        }

        let written: WriteResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::Corrupt(format!("unreadable write response: {e}")))?;
        Ok(written.content.sha)
    }

    async fn delete(&self, path: &str, revision: &str, message: &str) -> Result<(), SyncError> {
        let payload = json!({
            "message": message,
            "sha": revision,
            "branch": self.config.branch,
        });
        let resp = self
            .client
            .delete(self.url(path))
            .header(AUTHORIZATION, self.auth_header())
            .json(&payload)
            .send()
            .await
            .map_err(SyncError::from_transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Self::classify_write_failure(path, resp).await);
        }
        Ok(())
    }
}

// ==================== In-memory test double ====================

struct StoredDoc {
    body: String,
    revision: String,
}

/// In-memory `DocumentStore` with real compare-and-swap semantics on the
/// revision token. Revisions are a monotonic counter, so tests can assert
/// exact tokens.
#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<HashMap<String, StoredDoc>>,
    next_revision: AtomicU64,
    fail_requests: AtomicU32,
    fail_writes: AtomicU32,
    writes: AtomicU64,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` store operations fail with a retryable transport
    /// error, for exercising retry paths.
    pub fn fail_next_requests(&self, n: u32) {
        self.fail_requests.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes (put/delete) fail with a retryable transport
    /// error while reads keep working.
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Current body of a document, if present.
    pub fn body_of(&self, path: &str) -> Option<String> {
        self.docs
            .lock()
            .unwrap()
            .get(path)
            .map(|d| d.body.clone())
    }

    /// Current revision of a document, if present.
    pub fn revision_of(&self, path: &str) -> Option<String> {
        self.docs
            .lock()
            .unwrap()
            .get(path)
            .map(|d| d.revision.clone())
    }

    /// Number of successful writes (put + delete) so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a document directly, bypassing token checks. Returns its
    /// revision.
    pub fn seed(&self, path: &str, body: &str) -> String {
        let revision = self.mint_revision();
        self.docs.lock().unwrap().insert(
            path.to_string(),
            StoredDoc {
                body: body.to_string(),
                revision: revision.clone(),
            },
        );
        revision
    }

    fn mint_revision(&self) -> String {
        format!("rev-{}", self.next_revision.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn maybe_fail(&self) -> Result<(), SyncError> {
        Self::consume_failure(&self.fail_requests)
    }

    fn maybe_fail_write(&self) -> Result<(), SyncError> {
        self.maybe_fail()?;
        Self::consume_failure(&self.fail_writes)
    }

    fn consume_failure(budget: &AtomicU32) -> Result<(), SyncError> {
        let remaining = budget.load(Ordering::SeqCst);
        if remaining > 0 {
            budget.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Transport {
                message: "injected transport failure".to_string(),
                retryable: true,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, SyncError> {
        self.maybe_fail()?;
        Ok(self.docs.lock().unwrap().get(path).map(|d| Document {
            body: d.body.clone(),
            revision: d.revision.clone(),
        }))
    }

    async fn put(
        &self,
        path: &str,
        body: &str,
        revision: Option<&str>,
        _message: &str,
    ) -> Result<String, SyncError> {
        self.maybe_fail_write()?;
        let mut docs = self.docs.lock().unwrap();
        match (docs.get(path), revision) {
            // Create: absence is a precondition.
            (Some(_), None) => {
                return Err(SyncError::Conflict {
                    path: path.to_string(),
                });
            }
            (None, Some(_)) => return Err(SyncError::NotFound(path.to_string())),
            (Some(doc), Some(revision)) if doc.revision != revision => {
                return Err(SyncError::Conflict {
                    path: path.to_string(),
                });
            }
            _ => {}
        }
        let new_revision = self.mint_revision();
        docs.insert(
            path.to_string(),
            StoredDoc {
                body: body.to_string(),
                revision: new_revision.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(new_revision)
    }

    async fn delete(&self, path: &str, revision: &str, _message: &str) -> Result<(), SyncError> {
        self.maybe_fail_write()?;
        let mut docs = self.docs.lock().unwrap();
        match docs.get(path) {
            None => return Err(SyncError::NotFound(path.to_string())),
            Some(doc) if doc.revision != revision => {
                return Err(SyncError::Conflict {
                    path: path.to_string(),
                });
            }
            Some(_) => {}
        }
        docs.remove(path);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
