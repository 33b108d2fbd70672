//! Shared test helpers for engine integration tests.
//!
//! Each integration test compiles this module separately, so some helpers
//! appear unused in certain test files.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use ritual_core::{InviteCode, InviteRegistry, JournalEntry, ProgressState};
use ritual_engine::remote::{ClaimReceipt, ReferralAcceptance, RemoteResult};
use ritual_engine::{FixedClock, Identity, MemRemote, ProgressEngine, RemotePersistence};
use ritual_store::{DynKvStore, MemKvStore};
use serde_json::Value;
use tokio::sync::Notify;

pub const TEST_START: &str = "2024-01-01 20:00";

pub fn at(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").unwrap()
}

/// One device: a local store and a clock, optionally wired to a remote.
pub struct Device {
    pub engine: ProgressEngine,
    pub store: MemKvStore,
    pub clock: Arc<FixedClock>,
}

impl Device {
    pub fn local() -> Self {
        Self::build(MemKvStore::new(), None)
    }

    pub fn with_remote(remote: &MemRemote) -> Self {
        Self::build(MemKvStore::new(), Some(Arc::new(remote.clone())))
    }

    pub fn with_gate(remote: &GatedRemote) -> Self {
        Self::build(MemKvStore::new(), Some(Arc::new(remote.clone())))
    }

    pub fn build(store: MemKvStore, remote: Option<Arc<dyn RemotePersistence>>) -> Self {
        let clock = Arc::new(FixedClock::at(TEST_START));
        let kv: DynKvStore = Arc::new(store.clone());
        let mut builder = ProgressEngine::builder(kv).clock(clock.clone());
        if let Some(remote) = remote {
            builder = builder.remote(remote);
        }
        Self {
            engine: builder.build(),
            store,
            clock,
        }
    }

    pub async fn sign_in(&self, id: &str) {
        self.engine.sign_in(Identity::new(id)).await.unwrap();
    }

    /// Cache a snapshot for `id` that owns `code`, as a previous session would.
    pub fn seed_owner(&self, id: &str, code: &str) {
        let state = ProgressState {
            invite_code: Some(code.to_string()),
            ..ProgressState::default()
        };
        assert!(self.engine.cache().write(id, &state).persisted());
    }

    /// Register `code` as owned by `owner` in this device's invite registry.
    pub fn register_code(&self, code: &str, owner: &str) {
        let mut registry: InviteRegistry = self.engine.cache().invite_registry();
        registry.issue(&InviteCode::parse(code).unwrap(), owner, at(TEST_START));
        assert!(self.engine.cache().write_invite_registry(&registry));
    }
}

pub fn text(chars: usize) -> String {
    "a".repeat(chars)
}

/// Wraps a [`MemRemote`] and parks one armed call until the test releases
/// it, so a test can act while that request is in flight.
#[derive(Clone)]
pub struct GatedRemote {
    pub inner: MemRemote,
    gate: Arc<Gate>,
}

#[derive(Default)]
struct Gate {
    armed: Mutex<Option<&'static str>>,
    entered: Notify,
    released: Notify,
}

impl GatedRemote {
    pub fn new(inner: &MemRemote) -> Self {
        Self {
            inner: inner.clone(),
            gate: Arc::default(),
        }
    }

    /// Park the next call to the trait method named `method`.
    pub fn arm(&self, method: &'static str) {
        *self.gate.armed.lock().unwrap() = Some(method);
    }

    /// Resolves once the armed call is parked.
    pub async fn entered(&self) {
        self.gate.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.released.notify_one();
    }

    async fn pass(&self, method: &str) {
        let park = {
            let mut armed = self.gate.armed.lock().unwrap();
            if *armed == Some(method) {
                *armed = None;
                true
            } else {
                false
            }
        };
        if park {
            self.gate.entered.notify_one();
            self.gate.released.notified().await;
        }
    }
}

#[async_trait]
impl RemotePersistence for GatedRemote {
    async fn fetch_profile(&self, identity: &str) -> RemoteResult<Option<Value>> {
        self.pass("fetch_profile").await;
        self.inner.fetch_profile(identity).await
    }

    async fn upsert_profile(&self, identity: &str, progress: &Value) -> RemoteResult<()> {
        self.pass("upsert_profile").await;
        self.inner.upsert_profile(identity, progress).await
    }

    async fn list_entries(&self, identity: &str) -> RemoteResult<Vec<Value>> {
        self.pass("list_entries").await;
        self.inner.list_entries(identity).await
    }

    async fn insert_entry(&self, identity: &str, entry: &JournalEntry) -> RemoteResult<()> {
        self.pass("insert_entry").await;
        self.inner.insert_entry(identity, entry).await
    }

    async fn list_following(&self, identity: &str) -> RemoteResult<Vec<String>> {
        self.pass("list_following").await;
        self.inner.list_following(identity).await
    }

    async fn count_followers(&self, identity: &str) -> RemoteResult<u64> {
        self.pass("count_followers").await;
        self.inner.count_followers(identity).await
    }

    async fn set_follow(&self, follower: &str, followee: &str, follow: bool) -> RemoteResult<()> {
        self.pass("set_follow").await;
        self.inner.set_follow(follower, followee, follow).await
    }

    async fn register_invite_code(&self, identity: &str, code: &InviteCode) -> RemoteResult<()> {
        self.pass("register_invite_code").await;
        self.inner.register_invite_code(identity, code).await
    }

    async fn claim_invite(&self, claimant: &str, code: &InviteCode) -> RemoteResult<ClaimReceipt> {
        self.pass("claim_invite").await;
        self.inner.claim_invite(claimant, code).await
    }

    async fn list_referral_acceptances(&self, inviter: &str) -> RemoteResult<Vec<ReferralAcceptance>> {
        self.pass("list_referral_acceptances").await;
        self.inner.list_referral_acceptances(inviter).await
    }
}
