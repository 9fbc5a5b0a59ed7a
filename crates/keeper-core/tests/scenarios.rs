use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use keeper_core::auth::{AuthGate, AuthInput, AuthState};
use keeper_core::biometric::NoBiometric;
use keeper_core::controller::{ChangeCause, CollectionController, CollectionEvent};
use keeper_core::editor::{DeleteOutcome, EditorState, Field};
use keeper_core::entry::{is_sorted_newest_first, Entry, NEW_ACCOUNT_SOURCE};
use keeper_core::error::{AuthError, PersistError};
use keeper_core::prompt::Prompter;
use keeper_core::secure_storage::MemorySecretBackend;
use keeper_core::store::{BlobBackend, MemoryBackend, Store};
use tempfile::tempdir;
use zeroize::Zeroizing;

struct AlwaysYes;

#[async_trait]
impl Prompter for AlwaysYes {
    async fn confirm(&self, _message: &str) -> bool {
        true
    }

    async fn ask_secret(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        None
    }
}

struct BrokenDisk;

impl BlobBackend for BrokenDisk {
    fn read(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn write(&self, _key: &str, _value: &[u8]) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("disk full"))
    }
}

fn entry(source: &str, secs: i64) -> Entry {
    Entry::at(source, "", Utc.timestamp_opt(secs, 0).unwrap())
}

fn gate() -> AuthGate {
    AuthGate::new(Arc::new(MemorySecretBackend::new()), Arc::new(NoBiometric))
}

async fn unlocked(store: Store) -> CollectionController {
    let mut auth = gate();
    auth.set_secret("abc", "abc").unwrap();
    let mut controller = CollectionController::new(store, auth);
    controller.load_initial().await;
    controller.authenticate(AuthInput::secret("abc")).await.unwrap();
    controller
}

#[tokio::test]
async fn secret_setup_and_authentication() {
    let auth = gate();
    let mut controller = CollectionController::new(Store::new(Arc::new(MemoryBackend::new())), auth);

    controller.set_secret("abc", "abc").unwrap();
    controller.authenticate(AuthInput::secret("abc")).await.unwrap();
    assert_eq!(controller.auth().state(), AuthState::Unlocked);

    controller.lock();
    let err = controller
        .authenticate(AuthInput::secret("xyz"))
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::Mismatch);
    assert_eq!(controller.auth().state(), AuthState::Locked);
}

#[tokio::test]
async fn add_sort_delete_and_reload() {
    let dir = tempdir().unwrap();
    let mut controller = unlocked(Store::open_dir(dir.path())).await;

    controller.add(entry("A", 1)).unwrap();
    controller.add(entry("B", 2)).unwrap();
    let sources: Vec<String> = controller.rows().into_iter().map(|r| r.label).collect();
    assert_eq!(sources, vec!["B", "A"]);

    let a_index = (0..controller.len())
        .find(|&i| controller.entry(i).unwrap().source == "A")
        .unwrap();
    controller
        .delete_at(&BTreeSet::from([a_index]))
        .unwrap();
    controller.flush().await.unwrap();

    let reloaded = Store::open_dir(dir.path()).load();
    assert_eq!(reloaded, vec![entry("B", 2)]);
}

#[tokio::test]
async fn reload_sorts_whatever_was_persisted() {
    let dir = tempdir().unwrap();
    Store::open_dir(dir.path())
        .save(&[entry("old", 1), entry("new", 3), entry("mid", 2)])
        .unwrap();

    let mut controller = CollectionController::new(Store::open_dir(dir.path()), gate());
    let mut events = controller.subscribe();
    assert_eq!(controller.load_initial().await, 3);

    match events.recv().await.unwrap() {
        CollectionEvent::Changed {
            cause,
            len,
            snapshot,
            ..
        } => {
            assert_eq!(cause, ChangeCause::Loaded);
            assert_eq!(len, 3);
            assert!(snapshot.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }

    controller.set_secret("abc", "abc").unwrap();
    controller.authenticate(AuthInput::secret("abc")).await.unwrap();
    let entries = controller.snapshot().unwrap();
    assert!(is_sorted_newest_first(&entries));
    assert_eq!(entries[0].source, "new");
}

#[tokio::test]
async fn new_entry_leaves_existing_entries_untouched() {
    let dir = tempdir().unwrap();
    Store::open_dir(dir.path())
        .save(&[entry("mail", 2), entry("bank", 1)])
        .unwrap();
    let mut controller = unlocked(Store::open_dir(dir.path())).await;

    let index = controller.add(Entry::new_account()).unwrap();
    let mut session = controller.open_session(index).unwrap();
    session.begin_edit().unwrap();
    session.set_field(Field::Source, "forum").unwrap();
    session.on_host_disappear(&mut controller).unwrap();
    controller.flush().await.unwrap();

    let persisted = Store::open_dir(dir.path()).load();
    assert_eq!(persisted.len(), 3);
    assert_eq!(persisted[0].source, "forum");
    assert_eq!(persisted[1], entry("mail", 2));
    assert_eq!(persisted[2], entry("bank", 1));
}

#[tokio::test]
async fn corrupt_blob_starts_empty() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("password.json"), b"\x00\x01garbage").unwrap();
    let mut controller = unlocked(Store::open_dir(dir.path())).await;
    assert!(controller.is_empty());

    controller.add(entry("fresh", 1)).unwrap();
    controller.flush().await.unwrap();
    assert_eq!(Store::open_dir(dir.path()).load().len(), 1);
}

#[tokio::test]
async fn editor_session_roundtrip_through_disk() {
    let dir = tempdir().unwrap();
    Store::open_dir(dir.path())
        .save(&[entry("mail", 2), entry("bank", 1)])
        .unwrap();
    let mut controller = unlocked(Store::open_dir(dir.path())).await;

    let mut session = controller.open_session(1).unwrap();
    let created = session.create_new(&mut controller).unwrap();
    assert_eq!(created, 2);
    assert_eq!(controller.len(), 3);
    assert_eq!(controller.entry(2).unwrap().source, NEW_ACCOUNT_SOURCE);

    session.set_field(Field::Source, "forum").unwrap();
    session.set_field(Field::Password, "s3cret").unwrap();
    session.on_host_disappear(&mut controller).unwrap();
    assert_eq!(session.state(), EditorState::Closed);
    controller.flush().await.unwrap();

    let persisted = Store::open_dir(dir.path()).load();
    assert_eq!(persisted.len(), 3);
    let forum = persisted.iter().find(|e| e.source == "forum").unwrap();
    assert_eq!(forum.password, "s3cret");
    assert_eq!(controller.entry(2).unwrap().source, "mail");
}

#[tokio::test]
async fn editor_delete_persists_and_closes() {
    let backend = Arc::new(MemoryBackend::new());
    Store::new(backend.clone())
        .save(&[entry("a", 2), entry("b", 1)])
        .unwrap();
    let mut controller = unlocked(Store::new(backend.clone())).await;

    let mut session = controller.open_session(0).unwrap();
    let outcome = session.delete(&mut controller, &AlwaysYes).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    controller.flush().await.unwrap();

    let persisted = Store::new(backend).load();
    assert_eq!(persisted, vec![entry("b", 1)]);
}

#[tokio::test]
async fn failed_write_is_reported_and_state_kept() {
    let mut controller = unlocked(Store::new(Arc::new(BrokenDisk))).await;
    let mut events = controller.subscribe();

    controller.add(entry("kept", 1)).unwrap();
    let err = controller.flush().await.unwrap_err();
    assert!(matches!(err, PersistError::Write(_)));
    assert_eq!(controller.len(), 1);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CollectionEvent::PersistFailed { .. }) {
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}
