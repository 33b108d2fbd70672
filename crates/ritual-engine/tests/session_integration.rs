use std::sync::Arc;

use ritual_core::cache::{legacy_progress_key, progress_key};
use ritual_core::{DateKey, ProgressState, RitualDraft};
use ritual_engine::{EngineError, FixedClock, Identity, MemRemote, ProgressEngine};
use ritual_store::{DynKvStore, FsKvStore, KvStore, MemKvStore};
use serde_json::json;
use tempfile::TempDir;

#[path = "helpers.rs"]
mod helpers;
use helpers::{Device, GatedRemote, at, text};

fn day(raw: &str) -> DateKey {
    DateKey::parse(raw).unwrap()
}

#[tokio::test]
async fn mutations_are_refused_without_a_session() {
    let device = Device::local();
    let err = device.engine.award_xp(10).await.unwrap_err();
    assert_eq!(err, EngineError::NoSession);
    assert_eq!(err.reason_code(), "session_missing");
    assert!(!device.engine.is_ready());
    assert_eq!(device.engine.snapshot().total_xp, 0);
}

#[tokio::test]
async fn hydration_merges_remote_and_local_snapshots() {
    let remote = MemRemote::new();
    remote.seed_profile("u1", json!({ "totalXP": 100, "lastLoginDate": "2024-01-01" }));
    remote.seed_entry(
        "u1",
        json!({
            "id": "r1",
            "date": "2023-12-31",
            "movieId": 603,
            "movieTitle": "The Matrix",
            "text": "remote take"
        }),
    );
    let device = Device::with_remote(&remote);
    device.clock.set(at("2024-01-02 09:00"));
    let local = ProgressState {
        total_xp: 80,
        last_login_date: Some(day("2024-01-02")),
        username: Some("reel".into()),
        ..ProgressState::default()
    };
    assert!(device.engine.cache().write("u1", &local).persisted());

    let report = device.engine.sign_in(Identity::new("u1")).await.unwrap();
    // profile, entries, follows and the local snapshot
    assert_eq!(report.sources, 4);
    assert_eq!(report.entries, 1);
    assert!(report.pending_invite.is_none());

    let state = device.engine.snapshot();
    assert_eq!(state.total_xp, 100);
    assert_eq!(state.last_login_date, Some(day("2024-01-02")));
    assert_eq!(state.username.as_deref(), Some("reel"));
    assert_eq!(state.journal_entries[0].subject_id, "603");
    assert!(state.has_mark("first_mark"));

    let uploaded = remote.profile("u1").unwrap();
    assert_eq!(uploaded["totalXP"], 100);
    assert_eq!(uploaded["inviteCode"], json!(report.invite_code));
}

#[tokio::test]
async fn hydration_advances_last_login_to_today() {
    let device = Device::local();
    device.clock.set(at("2024-03-05 08:00"));
    device.sign_in("u1").await;
    assert_eq!(device.engine.snapshot().last_login_date, Some(day("2024-03-05")));
}

#[tokio::test]
async fn invite_code_is_issued_once_and_kept() {
    let device = Device::local();
    let first = device.engine.sign_in(Identity::new("u1")).await.unwrap();
    let code = first.invite_code.clone().unwrap();
    assert_eq!(code.len(), 8);

    device.engine.sign_out();
    let second = device.engine.sign_in(Identity::new("u1")).await.unwrap();
    assert_eq!(second.invite_code, Some(code.clone()));
    let registry = device.engine.cache().invite_registry();
    let parsed = ritual_core::InviteCode::parse(&code).unwrap();
    assert_eq!(registry.owner_of(&parsed), Some("u1"));
}

#[tokio::test]
async fn legacy_snapshot_is_migrated() {
    let device = Device::local();
    let legacy = json!({
        "xp": 120,
        "entries": [
            { "id": "e1", "date": "2023-12-30", "subjectId": "tt1", "subjectTitle": "Heat", "text": "great" }
        ]
    });
    device
        .store
        .set(&legacy_progress_key("u1"), &legacy.to_string())
        .unwrap();

    device.sign_in("u1").await;
    let state = device.engine.snapshot();
    assert_eq!(state.total_xp, 120);
    assert_eq!(state.journal_entries.len(), 1);

    assert_eq!(device.store.get(&legacy_progress_key("u1")).unwrap(), None);
    assert!(device.store.get(&progress_key("u1")).unwrap().is_some());
    assert_eq!(device.engine.cache().read("u1").unwrap().total_xp, 120);
}

#[tokio::test]
async fn entry_backup_restores_lost_entries() {
    let device = Device::local();
    device.sign_in("u1").await;
    device
        .engine
        .submit_entry(RitualDraft::new("tt1", "Heat", "first take"))
        .await
        .unwrap();
    device.engine.sign_out();

    // The main snapshot goes missing; the backup still has the entry.
    device.store.remove(&progress_key("u1")).unwrap();
    device.sign_in("u1").await;
    let state = device.engine.snapshot();
    assert_eq!(state.journal_entries.len(), 1);
    assert_eq!(state.journal_entries[0].text, "first take");
}

#[tokio::test]
async fn sign_out_resets_state_and_queues() {
    let device = Device::local();
    device.sign_in("u1").await;
    device.engine.award_xp(600).await.unwrap();
    assert!(device.engine.next_level_up().is_some());

    device.engine.sign_out();
    assert!(!device.engine.is_ready());
    assert_eq!(device.engine.identity(), None);
    assert_eq!(*device.engine.snapshot(), ProgressState::default());
    assert_eq!(device.engine.next_level_up(), None);
    assert!(device.engine.drain_notifications().is_empty());
    assert_eq!(device.engine.award_xp(5).await, Err(EngineError::NoSession));

    device.sign_in("u1").await;
    assert_eq!(device.engine.snapshot().total_xp, 600);
}

#[tokio::test]
async fn switching_identity_does_not_leak_progress() {
    let device = Device::local();
    device.sign_in("alice").await;
    device.engine.award_xp(50).await.unwrap();

    device.sign_in("bob").await;
    assert_eq!(device.engine.identity(), Some(Identity::new("bob")));
    assert_eq!(device.engine.snapshot().total_xp, 0);
    assert_eq!(device.engine.cache().read("alice").unwrap().total_xp, 50);
}

#[tokio::test]
async fn subscribers_see_every_commit() {
    let device = Device::local();
    let mut rx = device.engine.subscribe();
    device.sign_in("u1").await;
    let _ = rx.borrow_and_update();

    device.engine.award_xp(5).await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().total_xp, 5);
}

#[tokio::test]
async fn progress_survives_restart_on_disk() {
    let dir = TempDir::new().unwrap();
    let open = || {
        let store: DynKvStore = Arc::new(FsKvStore::open(dir.path()).unwrap());
        ProgressEngine::builder(store)
            .clock(Arc::new(FixedClock::at("2024-01-01 20:00")))
            .build()
    };

    let engine = open();
    engine.sign_in(Identity::new("u1")).await.unwrap();
    engine
        .submit_entry(RitualDraft::new("tt1", "Heat", text(180)))
        .await
        .unwrap();
    drop(engine);

    let engine = open();
    engine.sign_in(Identity::new("u1")).await.unwrap();
    let state = engine.snapshot();
    assert_eq!(state.total_xp, 50);
    assert_eq!(state.journal_entries.len(), 1);
    assert_eq!(state.streak, 1);
}

#[tokio::test]
async fn unreadable_cache_is_treated_as_absent() {
    let store = MemKvStore::new();
    store.set(&progress_key("u1"), "{not json").unwrap();
    let device = Device::build(store, None);
    device.sign_in("u1").await;
    assert_eq!(device.engine.snapshot().total_xp, 0);
    assert!(device.engine.is_ready());
}

#[tokio::test]
async fn sign_out_during_hydration_keeps_the_cached_snapshot() {
    let remote = GatedRemote::new(&MemRemote::new());
    let device = Device::with_gate(&remote);
    let alice = ProgressState {
        total_xp: 500,
        ..ProgressState::default()
    };
    assert!(device.engine.cache().write("alice", &alice).persisted());

    remote.arm("register_invite_code");
    let (hydrated, ()) = tokio::join!(device.engine.sign_in(Identity::new("alice")), async {
        remote.entered().await;
        device.engine.sign_out();
        remote.release();
    });

    assert_eq!(hydrated.unwrap_err(), EngineError::NoSession);
    assert_eq!(device.engine.identity(), None);
    assert_eq!(device.engine.cache().read("alice").unwrap().total_xp, 500);
}

#[tokio::test]
async fn mutations_wait_for_hydration() {
    let remote = GatedRemote::new(&MemRemote::new());
    let device = Device::with_gate(&remote);

    remote.arm("fetch_profile");
    let (hydrated, refused) = tokio::join!(device.engine.sign_in(Identity::new("u1")), async {
        remote.entered().await;
        let ready = device.engine.is_ready();
        let refused = device.engine.award_xp(5).await;
        remote.release();
        (ready, refused)
    });

    hydrated.unwrap();
    assert_eq!(refused, (false, Err(EngineError::NotHydrated)));
    assert_eq!(device.engine.snapshot().total_xp, 0);
    device.engine.award_xp(5).await.unwrap();
    assert_eq!(device.engine.snapshot().total_xp, 5);
}

#[tokio::test]
async fn identities_never_read_each_others_snapshots() {
    let device = Device::local();
    let bob = ProgressState {
        total_xp: 900,
        ..ProgressState::default()
    };
    assert!(device.engine.cache().write("bob", &bob).persisted());

    device.sign_in("v2.bob").await;
    assert_eq!(device.engine.snapshot().total_xp, 0);
    device.engine.award_xp(1).await.unwrap();
    assert_eq!(device.engine.cache().read("bob").unwrap().total_xp, 900);
}
