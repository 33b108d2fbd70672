//! Durable local cache for progress snapshots, the entry backup, and the
//! referral bookkeeping that never leaves the device.
//!
//! Reads never fail: a payload that does not parse is removed and treated as
//! absent. Writes go through [`write_with_degradation`] and report how far
//! down the ladder they had to go.

use ritual_store::{DynKvStore, Fallback, KvStore, StoreError, get_json, put_json, write_with_degradation};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::model::{JournalEntry, ProgressState};
use crate::normalize::normalize;
use crate::referral::{InviteCode, InviteDeviceGuard, InviteRegistry};

// Neither prefix may extend the other, or one identity's legacy key could
// name another identity's current snapshot.
const PROGRESS_PREFIX: &str = "ritual.progress_v2.";
const LEGACY_PROGRESS_PREFIX: &str = "ritual.progress.";
const BACKUP_PREFIX: &str = "ritual.entries.backup.";
pub const REGISTRY_KEY: &str = "ritual.invite.registry";
pub const DEVICE_GUARD_KEY: &str = "ritual.invite.device_guard";
pub const PENDING_INVITE_KEY: &str = "ritual.invite.pending";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entry counts tried by the backup writer, largest first.
    pub backup_ladder: Vec<usize>,
    /// Inline avatar payloads above this size are dropped under pressure.
    pub avatar_data_max_bytes: usize,
    /// Key prefixes of disposable caches cleared as the last resort.
    pub auxiliary_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backup_ladder: vec![800, 400, 200],
            avatar_data_max_bytes: 16 * 1024,
            auxiliary_prefixes: vec![
                "ritual.poster_cache.".into(),
                "ritual.search_cache.".into(),
                "ritual.feed_cache.".into(),
            ],
        }
    }
}

/// Result of a cache write. Failures are already logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Full,
    Degraded(&'static str),
    Failed,
}

impl CacheWrite {
    pub fn persisted(self) -> bool {
        !matches!(self, CacheWrite::Failed)
    }
}

#[derive(Clone)]
pub struct ProgressCache {
    store: DynKvStore,
    config: CacheConfig,
}

impl std::fmt::Debug for ProgressCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub fn progress_key(identity: &str) -> String {
    format!("{PROGRESS_PREFIX}{identity}")
}

pub fn legacy_progress_key(identity: &str) -> String {
    format!("{LEGACY_PROGRESS_PREFIX}{identity}")
}

pub fn backup_key(identity: &str) -> String {
    format!("{BACKUP_PREFIX}{identity}")
}

impl ProgressCache {
    pub fn new(store: DynKvStore, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn read(&self, identity: &str) -> Option<ProgressState> {
        self.read_value(&progress_key(identity)).map(|v| normalize(&v))
    }

    /// Snapshot under the pre-v2 key, if one is still around.
    pub fn read_legacy(&self, identity: &str) -> Option<ProgressState> {
        self.read_value(&legacy_progress_key(identity))
            .map(|v| normalize(&v))
    }

    /// Write the snapshot. A successful write retires the legacy key.
    pub fn write(&self, identity: &str, state: &ProgressState) -> CacheWrite {
        let key = progress_key(identity);
        let max_avatar = self.config.avatar_data_max_bytes;
        let prefixes = &self.config.auxiliary_prefixes;
        let ladder = [
            Fallback::new("drop_avatar_data", move |_: &dyn KvStore, s: &ProgressState| {
                let mut slim = s.clone();
                if slim.avatar_data.as_ref().is_some_and(|d| d.len() > max_avatar) {
                    slim.avatar_data = None;
                }
                slim
            }),
            Fallback::new("clear_auxiliary_caches", move |store: &dyn KvStore, s: &ProgressState| {
                clear_prefixes(store, prefixes);
                s.clone()
            }),
        ];
        let outcome = self.finish(&key, write_with_degradation(self.store(), &key, state, &ladder));
        if outcome.persisted() {
            let legacy = legacy_progress_key(identity);
            if let Err(err) = self.store.remove(&legacy) {
                log::warn!("could not remove legacy key '{legacy}': {err}");
            }
        }
        outcome
    }

    pub fn read_backup(&self, identity: &str) -> Option<Vec<JournalEntry>> {
        let raw = self.read_value(&backup_key(identity))?;
        let wrapped = serde_json::json!({ "journalEntries": raw });
        Some(normalize(&wrapped).journal_entries)
    }

    /// Write the most recent entries (`entries` is newest first), shrinking
    /// the list along the backup ladder when the store refuses.
    pub fn write_backup(&self, identity: &str, entries: &[JournalEntry]) -> CacheWrite {
        let key = backup_key(identity);
        let mut sizes = self.config.backup_ladder.iter().copied();
        let first = sizes.next().unwrap_or(entries.len());
        let payload: Vec<JournalEntry> = entries.iter().take(first).cloned().collect();
        let ladder: Vec<Fallback<'_, Vec<JournalEntry>>> = sizes
            .map(|n| {
                Fallback::new(ladder_label(n), move |_: &dyn KvStore, list: &Vec<JournalEntry>| {
                    list.iter().take(n).cloned().collect()
                })
            })
            .collect();
        self.finish(&key, write_with_degradation(self.store(), &key, &payload, &ladder))
    }

    pub fn invite_registry(&self) -> InviteRegistry {
        self.read_typed(REGISTRY_KEY).unwrap_or_default()
    }

    pub fn write_invite_registry(&self, registry: &InviteRegistry) -> bool {
        self.write_typed(REGISTRY_KEY, registry)
    }

    pub fn device_guard(&self) -> InviteDeviceGuard {
        self.read_typed(DEVICE_GUARD_KEY).unwrap_or_default()
    }

    pub fn write_device_guard(&self, guard: &InviteDeviceGuard) -> bool {
        self.write_typed(DEVICE_GUARD_KEY, guard)
    }

    /// Pending invite code captured from a link. Invalid stored values are
    /// cleared on read.
    pub fn pending_invite(&self) -> Option<InviteCode> {
        let raw = match self.store.get(PENDING_INVITE_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("pending invite unreadable: {err}");
                return None;
            }
        };
        match InviteCode::parse(&raw) {
            Ok(code) => Some(code),
            Err(_) => {
                self.clear_pending_invite();
                None
            }
        }
    }

    pub fn set_pending_invite(&self, code: &InviteCode) -> bool {
        match self.store.set(PENDING_INVITE_KEY, code.as_str()) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("could not store pending invite: {err}");
                false
            }
        }
    }

    /// Idempotent.
    pub fn clear_pending_invite(&self) {
        if let Err(err) = self.store.remove(PENDING_INVITE_KEY) {
            log::warn!("could not clear pending invite: {err}");
        }
    }

    fn read_value(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("cache read of '{key}' failed: {err}");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                self.discard(key, &err.to_string());
                None
            }
        }
    }

    fn read_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match get_json(self.store(), key) {
            Ok(value) => value,
            Err(StoreError::Json(err)) => {
                self.discard(key, &err.to_string());
                None
            }
            Err(err) => {
                log::warn!("cache read of '{key}' failed: {err}");
                None
            }
        }
    }

    fn write_typed<T: serde::Serialize>(&self, key: &str, value: &T) -> bool {
        match put_json(self.store(), key, value) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("cache write of '{key}' failed: {err}");
                false
            }
        }
    }

    fn discard(&self, key: &str, reason: &str) {
        log::warn!("discarding corrupt cache key '{key}': {reason}");
        if let Err(err) = self.store.remove(key) {
            log::warn!("could not remove corrupt key '{key}': {err}");
        }
    }

    fn finish(&self, key: &str, result: ritual_store::StoreResult<ritual_store::WriteReport>) -> CacheWrite {
        match result {
            Ok(report) => match report.fallback {
                None => CacheWrite::Full,
                Some(label) => {
                    log::info!("'{key}' written with fallback '{label}' after {} attempts", report.attempts);
                    CacheWrite::Degraded(label)
                }
            },
            Err(err) => {
                log::error!("'{key}' could not be written after every fallback: {err}");
                CacheWrite::Failed
            }
        }
    }
}

fn clear_prefixes(store: &dyn KvStore, prefixes: &[String]) {
    let keys = match store.keys() {
        Ok(keys) => keys,
        Err(err) => {
            log::warn!("could not list keys for cleanup: {err}");
            return;
        }
    };
    for key in keys.iter().filter(|k| prefixes.iter().any(|p| k.starts_with(p.as_str()))) {
        if let Err(err) = store.remove(key) {
            log::warn!("could not remove '{key}': {err}");
        }
    }
}

fn ladder_label(n: usize) -> &'static str {
    match n {
        400 => "backup_400",
        200 => "backup_200",
        100 => "backup_100",
        _ => "backup_truncated",
    }
}
