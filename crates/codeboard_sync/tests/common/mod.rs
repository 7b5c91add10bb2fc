//! Shared fixtures for the synchronizer test suites.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use codeboard_core::types::Repository;
use codeboard_sync::{Notifier, StatusEvent, StoreConfig};

/// Store configuration pointing at nothing; all tests run against
/// `InMemoryStore`.
pub fn store_config() -> StoreConfig {
    StoreConfig {
        api_base: "https://gitee.com/api/v5".to_string(),
        owner: "owner".to_string(),
        repo: "store".to_string(),
        branch: "master".to_string(),
        access_token: "secret".to_string(),
        config_path: "board_config.json".to_string(),
        roster_path: "online_users.json".to_string(),
        admin_username: "admin".to_string(),
    }
}

/// A repository entry with the given id and creator.
pub fn make_repo(id: &str, creator: Option<&str>) -> Repository {
    Repository {
        id: id.to_string(),
        name: format!("Repo {id}"),
        description: String::new(),
        file_path: Repository::file_path_for(id),
        owner: "owner".to_string(),
        repo_name: "store".to_string(),
        category_id: "all".to_string(),
        members: creator.iter().map(|c| c.to_string()).collect(),
        created_by: creator.map(|c| c.to_string()),
        created_at: "2026-01-01 00:00:00".to_string(),
    }
}

/// A notifier that records every status event it sees.
pub fn recording_notifier() -> (Notifier, Arc<Mutex<Vec<StatusEvent>>>) {
    let seen: Arc<Mutex<Vec<StatusEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let notifier = Notifier::new(move |event: &StatusEvent| {
        sink.lock().unwrap().push(event.clone());
    });
    (notifier, seen)
}
