use chrono::{Duration, Utc};
use snowcell_core::session::SESSION_TTL_DAYS;
use snowcell_core::{
    AcceptAny, Account, ModelCatalog, SelectionStore, Session, SessionStore, SncError, StateStore,
};
use std::sync::Arc;
use tempfile::TempDir;

fn account(dir: &TempDir) -> Account {
    let state = StateStore::new(dir.path());
    let selections = SelectionStore::new(
        state.clone(),
        SessionStore::new(state),
        ModelCatalog::builtin(),
    );
    Account::new(Arc::new(AcceptAny), selections)
}

#[test]
fn login_lasts_thirty_days() {
    let dir = TempDir::new().expect("temp dir");
    let account = account(&dir);

    let session = account.login("developer", "dev-token").expect("login");
    assert_eq!(
        session.expires_at - session.created_at,
        Duration::days(SESSION_TTL_DAYS)
    );
    assert!(StateStore::new(dir.path()).path("session").exists());
    assert_eq!(account.status().expect("status"), Some(session));
}

#[test]
fn expired_session_is_removed_from_disk() {
    let dir = TempDir::new().expect("temp dir");
    let state = StateStore::new(dir.path());
    let account = account(&dir);
    account.login("developer", "dev-token").expect("login");

    let created = Utc::now() - Duration::days(SESSION_TTL_DAYS + 1);
    let stale = Session::new("developer", created, Duration::days(SESSION_TTL_DAYS));
    state.write("session", &stale).expect("overwrite session");

    assert_eq!(account.status().expect("status"), None);
    assert!(!state.path("session").exists());
}

#[test]
fn selection_requires_live_session() {
    let dir = TempDir::new().expect("temp dir");
    let state = StateStore::new(dir.path());
    let sessions = SessionStore::new(state.clone());
    let selections = SelectionStore::new(state.clone(), sessions.clone(), ModelCatalog::builtin());

    assert!(matches!(
        selections.select("qwen"),
        Err(SncError::NotAuthenticated)
    ));

    sessions.create("developer").expect("session");
    let selection = selections.select("llama").expect("select");
    assert_eq!(selection.name, "Meta-Llama/Llama-2-7b-chat");

    sessions.destroy().expect("logout");
    assert!(matches!(
        selections.current(),
        Err(SncError::NotAuthenticated)
    ));
}

#[test]
fn unknown_model_leaves_selection_alone() {
    let dir = TempDir::new().expect("temp dir");
    let account = account(&dir);
    account.login("developer", "dev-token").expect("login");

    let state = StateStore::new(dir.path());
    let selections = SelectionStore::new(
        state.clone(),
        SessionStore::new(state),
        ModelCatalog::builtin(),
    );
    selections.select("mistral").expect("select");
    assert!(matches!(
        selections.select("gpt-4"),
        Err(SncError::UnknownModel { .. })
    ));
    assert_eq!(
        selections.current().expect("current").map(|s| s.key),
        Some("mistral".to_string())
    );
}

#[test]
fn unwritable_state_dir_reports_storage_error() {
    let dir = TempDir::new().expect("temp dir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").expect("blocker file");

    let sessions = SessionStore::new(StateStore::new(blocker.join("state")));
    assert!(matches!(
        sessions.create("developer"),
        Err(SncError::StorageUnavailable { .. })
    ));
}

#[test]
fn every_catalog_key_is_selectable() {
    let state = StateStore::temporary();
    let catalog = ModelCatalog::builtin();
    let sessions = SessionStore::new(state.clone());
    let selections = SelectionStore::new(state.clone(), sessions.clone(), catalog);
    sessions.create("developer").expect("session");

    let keys: Vec<_> = catalog.keys().collect();
    assert_eq!(keys, ["qwen", "llama", "mistral"]);
    for key in keys {
        let selection = selections.select(key).expect("select");
        assert_eq!(selection.key, key);
        assert_eq!(Some(selection), selections.current().expect("current"));
    }

    std::fs::remove_dir_all(state.root()).expect("cleanup");
}
