//! Store configuration loaded from environment variables.

use std::env;

use crate::error::SyncError;

/// Deployment-time description of the backing git repository and the fixed
/// document paths inside it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the contents API (default: <https://gitee.com/api/v5>).
    pub api_base: String,
    /// Owner of the backing repository.
    pub owner: String,
    /// Name of the backing repository.
    pub repo: String,
    /// Branch every read and write targets (default: master).
    pub branch: String,
    /// Access token sent as `Authorization: token …` on every request.
    pub access_token: String,
    /// Path of the shared config document (default: board_config.json).
    pub config_path: String,
    /// Path of the shared online roster (default: online_users.json).
    pub roster_path: String,
    /// Username of the single privileged account (default: admin).
    pub admin_username: String,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// `CODEBOARD_OWNER`, `CODEBOARD_REPO`, and `CODEBOARD_ACCESS_TOKEN` are
    /// required; everything else has a default.
    pub fn from_env() -> Result<Self, SyncError> {
        dotenvy::dotenv().ok();

        let required = |key: &str| {
            env::var(key).map_err(|_| SyncError::InvalidConfig(format!("{key} is not set")))
        };

        Ok(StoreConfig {
            api_base: env::var("CODEBOARD_API_BASE")
                .unwrap_or_else(|_| "https://gitee.com/api/v5".to_string()),
            owner: required("CODEBOARD_OWNER")?,
            repo: required("CODEBOARD_REPO")?,
            branch: env::var("CODEBOARD_BRANCH").unwrap_or_else(|_| "master".to_string()),
            access_token: required("CODEBOARD_ACCESS_TOKEN")?,
            config_path: env::var("CODEBOARD_CONFIG_PATH")
                .unwrap_or_else(|_| "board_config.json".to_string()),
            roster_path: env::var("CODEBOARD_ROSTER_PATH")
                .unwrap_or_else(|_| "online_users.json".to_string()),
            admin_username: env::var("CODEBOARD_ADMIN_USERNAME")
                .unwrap_or_else(|_| "admin".to_string()),
        })
    }

    /// Whether `username` is the privileged account.
    pub fn is_admin(&self, username: &str) -> bool {
        username == self.admin_username
    }
}
