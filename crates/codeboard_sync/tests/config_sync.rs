//! Config synchronizer: load/repair/save cycle, error-state decisions, and
//! the category/repository/membership operations.

mod common;

use std::sync::Arc;
use std::time::Duration;

use codeboard_core::session::SessionContext;
use codeboard_core::types::{ALL_CATEGORY_ID, BoardConfig, Category};
use codeboard_sync::{
    ConfigLoadOutcome, ConfigState, ConfigSynchronizer, InMemoryStore, Notifier, SyncError,
};

use common::{make_repo, store_config};

fn synchronizer(store: &Arc<InMemoryStore>) -> ConfigSynchronizer {
    ConfigSynchronizer::new(store.clone(), store_config(), Notifier::disabled())
        .with_retry_delay(Duration::ZERO)
}

fn seed_config(store: &InMemoryStore, board: &BoardConfig) {
    store.seed(
        "board_config.json",
        &serde_json::to_string_pretty(board).unwrap(),
    );
}

fn stored_board(store: &InMemoryStore) -> BoardConfig {
    serde_json::from_str(&store.body_of("board_config.json").unwrap()).unwrap()
}

// Scenario: config absent, non-elevated user. Caches empty, no write.
#[tokio::test]
async fn absent_config_falls_back_to_empty_for_regular_users() {
    let store = Arc::new(InMemoryStore::new());
    let mut sync = synchronizer(&store);
    let session = SessionContext::new("bob");

    let outcome = sync.load(Some(&session)).await;

    assert!(matches!(outcome, ConfigLoadOutcome::EmptyFallback { .. }));
    assert_eq!(sync.state(), ConfigState::ErrorAutoEmpty);
    assert!(sync.categories().is_empty());
    assert!(sync.repositories().is_empty());
    assert_eq!(store.write_count(), 0);
}

// Scenario: config absent, elevated user accepts the default.
#[tokio::test]
async fn elevated_user_can_create_default_config() {
    let store = Arc::new(InMemoryStore::new());
    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");

    let outcome = sync.load(Some(&admin)).await;
    assert!(matches!(outcome, ConfigLoadOutcome::NeedsDecision { .. }));
    assert_eq!(sync.state(), ConfigState::ErrorNeedsDecision);
    assert_eq!(store.write_count(), 0);

    sync.create_default_config(&admin).await.unwrap();

    let categories = sync.categories();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].id, ALL_CATEGORY_ID);
    assert!(categories[1].id.starts_with("category_"));

    let repos = sync.repositories();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].category_id, categories[1].id);
    assert_eq!(repos[0].created_by.as_deref(), Some("admin"));
    assert_eq!(repos[0].members, vec!["admin".to_string()]);

    // Backing snippet document was created empty.
    assert_eq!(store.body_of(&repos[0].file_path).as_deref(), Some("[]"));
    // And the config itself round-trips.
    let saved = stored_board(&store);
    assert_eq!(saved.categories.len(), 2);
    assert_eq!(saved.repositories.len(), 1);
}

#[tokio::test]
async fn declining_the_default_config_leaves_empty_caches() {
    let store = Arc::new(InMemoryStore::new());
    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");

    sync.load(Some(&admin)).await;
    sync.decline_default_config();

    assert_eq!(sync.state(), ConfigState::ErrorAutoEmpty);
    assert!(sync.categories().is_empty());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn non_elevated_user_cannot_create_default_config() {
    let store = Arc::new(InMemoryStore::new());
    let mut sync = synchronizer(&store);
    let session = SessionContext::new("bob");

    let err = sync.create_default_config(&session).await.unwrap_err();
    assert!(matches!(err, SyncError::Permission(_)));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn truncated_config_is_repaired_and_persisted() {
    let store = Arc::new(InMemoryStore::new());
    let board = BoardConfig {
        categories: vec![Category::all()],
        repositories: vec![],
    };
    let full = serde_json::to_string_pretty(&board).unwrap();
    // Drop the trailing "]\n}", the truncation the store has been seen to
    // produce.
    let truncated = &full[..full.len() - 3];
    store.seed("board_config.json", truncated);

    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");
    let outcome = sync.load(Some(&admin)).await;

    assert_eq!(
        outcome,
        ConfigLoadOutcome::Loaded {
            repaired: true,
            persisted: true,
        }
    );
    // The persisted document is whole again.
    let saved = stored_board(&store);
    assert_eq!(saved.categories[0].id, ALL_CATEGORY_ID);
}

#[tokio::test]
async fn corrupt_config_is_an_error_not_a_write() {
    let store = Arc::new(InMemoryStore::new());
    // Ends inside a string literal: unrepairable.
    store.seed("board_config.json", r#"{"categories": [{"id": "all"#);

    let mut sync = synchronizer(&store);
    let outcome = sync.load(Some(&SessionContext::new("bob"))).await;

    assert!(matches!(outcome, ConfigLoadOutcome::EmptyFallback { .. }));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn structurally_invalid_config_is_an_error() {
    let store = Arc::new(InMemoryStore::new());
    // Valid JSON, wrong shape: repositories is not an array.
    store.seed(
        "board_config.json",
        r#"{"categories": [], "repositories": {}}"#,
    );

    let mut sync = synchronizer(&store);
    let outcome = sync.load(Some(&SessionContext::elevated("admin"))).await;
    assert!(matches!(outcome, ConfigLoadOutcome::NeedsDecision { .. }));
}

#[tokio::test]
async fn empty_config_document_is_an_error() {
    let store = Arc::new(InMemoryStore::new());
    store.seed("board_config.json", "");

    let mut sync = synchronizer(&store);
    let outcome = sync.load(None).await;
    assert!(matches!(outcome, ConfigLoadOutcome::EmptyFallback { .. }));
}

#[tokio::test]
async fn load_repairs_missing_all_and_orphaned_categories() {
    let store = Arc::new(InMemoryStore::new());
    let general = Category {
        id: "category_7".to_string(),
        name: "General".to_string(),
    };
    let mut repo = make_repo("repo_1", Some("carol"));
    repo.category_id = "category_gone".to_string();
    seed_config(
        &store,
        &BoardConfig {
            categories: vec![general.clone()],
            repositories: vec![repo],
        },
    );

    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");
    let outcome = sync.load(Some(&admin)).await;
    assert!(matches!(outcome, ConfigLoadOutcome::Loaded { .. }));

    // Exactly one "all", first.
    let all_count = sync
        .categories()
        .iter()
        .filter(|c| c.id == ALL_CATEGORY_ID)
        .count();
    assert_eq!(all_count, 1);
    assert_eq!(sync.categories()[0].id, ALL_CATEGORY_ID);

    // The orphan was reassigned to an existing category.
    let category_ids: Vec<&str> = sync.categories().iter().map(|c| c.id.as_str()).collect();
    assert!(category_ids.contains(&sync.repositories()[0].category_id.as_str()));
    assert_eq!(sync.repositories()[0].category_id, general.id);

    // And the repaired result reached the store.
    let saved = stored_board(&store);
    assert_eq!(saved.repositories[0].category_id, general.id);
}

#[tokio::test]
async fn repair_and_save_cycle_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let mut repo = make_repo("repo_1", None);
    repo.category_id = "category_gone".to_string();
    seed_config(
        &store,
        &BoardConfig {
            categories: vec![],
            repositories: vec![repo],
        },
    );

    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");

    sync.load(Some(&admin)).await;
    let first = store.body_of("board_config.json").unwrap();

    sync.load(Some(&admin)).await;
    let second = store.body_of("board_config.json").unwrap();

    // Byte-identical payload (tokens differ, bodies must not).
    assert_eq!(first, second);
}

#[tokio::test]
async fn save_retries_once_on_transient_transport_failure() {
    let store = Arc::new(InMemoryStore::new());
    seed_config(
        &store,
        &BoardConfig {
            categories: vec![Category::all()],
            repositories: vec![],
        },
    );
    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");
    sync.load(Some(&admin)).await;

    store.fail_next_requests(1);
    sync.save(&admin).await.unwrap();
    assert!(store.body_of("board_config.json").is_some());
}

#[tokio::test]
async fn oversized_config_save_is_aborted() {
    let store = Arc::new(InMemoryStore::new());
    let mut repo = make_repo("repo_1", Some("carol"));
    repo.description = "x".repeat(1_100_000);
    seed_config(
        &store,
        &BoardConfig {
            categories: vec![Category::all()],
            repositories: vec![repo],
        },
    );

    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");
    let outcome = sync.load(Some(&admin)).await;

    // Load succeeds, but the mandatory persist was refused, and nothing
    // was truncated onto the store.
    assert_eq!(
        outcome,
        ConfigLoadOutcome::Loaded {
            repaired: false,
            persisted: false,
        }
    );
    assert_eq!(store.write_count(), 0);

    let err = sync.save(&admin).await.unwrap_err();
    assert!(matches!(err, SyncError::TooLarge { .. }));
}

#[tokio::test]
async fn category_lifecycle_guards() {
    let store = Arc::new(InMemoryStore::new());
    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");
    sync.create_default_config(&admin).await.unwrap();

    // Non-elevated callers cannot manage categories.
    let bob = SessionContext::new("bob");
    assert!(matches!(
        sync.create_category(&bob, "Systems").await,
        Err(SyncError::Permission(_))
    ));

    let category = sync.create_category(&admin, "Systems").await.unwrap();
    assert!(sync.categories().iter().any(|c| c.id == category.id));

    sync.rename_category(&admin, &category.id, "Systems & Tools")
        .await
        .unwrap();
    assert!(
        sync.categories()
            .iter()
            .any(|c| c.name == "Systems & Tools")
    );

    // The sentinel is undeletable.
    assert!(matches!(
        sync.delete_category(&admin, ALL_CATEGORY_ID).await,
        Err(SyncError::Rejected(_))
    ));

    // A category with repositories refuses deletion. The default repo lives
    // in the starter category.
    let starter = sync.categories()[1].id.clone();
    assert!(matches!(
        sync.delete_category(&admin, &starter).await,
        Err(SyncError::Rejected(_))
    ));

    // An unused category deletes fine.
    sync.delete_category(&admin, &category.id).await.unwrap();
    assert!(!sync.categories().iter().any(|c| c.id == category.id));
}

#[tokio::test]
async fn repository_lifecycle() {
    let store = Arc::new(InMemoryStore::new());
    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");
    sync.create_default_config(&admin).await.unwrap();

    let carol = SessionContext::new("carol");
    let repo = sync
        .create_repository(&carol, "Kernel bits", "low-level snippets", None)
        .await
        .unwrap();
    assert_eq!(repo.created_by.as_deref(), Some("carol"));
    assert_eq!(repo.members, vec!["carol".to_string()]);
    assert_eq!(repo.file_path, format!("{}.json", repo.id));
    assert_eq!(store.body_of(&repo.file_path).as_deref(), Some("[]"));
    // Creating selects the repository.
    assert_eq!(sync.current_repo().unwrap().id, repo.id);

    // Unknown category falls back to the first regular category.
    assert_ne!(repo.category_id, ALL_CATEGORY_ID);

    // Editing is for the administrator.
    assert!(matches!(
        sync.update_repository(&carol, &repo.id, "Renamed", "", None)
            .await,
        Err(SyncError::Permission(_))
    ));
    sync.update_repository(&admin, &repo.id, "Kernel", "still low-level", None)
        .await
        .unwrap();
    assert!(sync.repositories().iter().any(|r| r.name == "Kernel"));

    // Deletion removes both the config entry and the backing document.
    sync.delete_repository(&admin, &repo.id).await.unwrap();
    assert!(!sync.repositories().iter().any(|r| r.id == repo.id));
    assert_eq!(store.body_of(&repo.file_path), None);
    assert!(sync.current_repo().is_none());
}

#[tokio::test]
async fn membership_rules() {
    let store = Arc::new(InMemoryStore::new());
    let mut sync = synchronizer(&store);
    let admin = SessionContext::elevated("admin");
    sync.create_default_config(&admin).await.unwrap();

    let carol = SessionContext::new("carol");
    let repo = sync
        .create_repository(&carol, "Shared", "", None)
        .await
        .unwrap();

    // A stranger cannot manage members.
    let mallory = SessionContext::new("mallory");
    assert!(matches!(
        sync.add_member(&mallory, &repo.id, "dave").await,
        Err(SyncError::Permission(_))
    ));

    // The creator can.
    sync.add_member(&carol, &repo.id, "dave").await.unwrap();
    assert!(matches!(
        sync.add_member(&carol, &repo.id, "dave").await,
        Err(SyncError::Rejected(_))
    ));

    // The creator cannot be removed; other members can.
    assert!(matches!(
        sync.remove_member(&carol, &repo.id, "carol").await,
        Err(SyncError::Rejected(_))
    ));
    sync.remove_member(&carol, &repo.id, "dave").await.unwrap();

    let members = &sync
        .repositories()
        .iter()
        .find(|r| r.id == repo.id)
        .unwrap()
        .members;
    assert_eq!(members, &vec!["carol".to_string()]);
}
