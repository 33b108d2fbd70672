//! Local persistence and best-effort remote writes after a commit.

use std::collections::VecDeque;
use std::sync::Arc;

use ritual_core::{CacheWrite, ProgressState};
use tracing::{debug, info, warn};

use super::ProgressEngine;
use crate::events::Notification;
use crate::remote::{Channel, FailureKind, RemoteFailure, RemotePersistence, classify};

impl ProgressEngine {
    /// Write the published state to the local cache, then push what the
    /// remote side is missing. Work for a stale `generation` is dropped: the
    /// published state then belongs to another session and must not land
    /// under `identity`.
    pub(super) async fn persist(&self, identity: &str, generation: u64) {
        let Some(snapshot) = self.snapshot_for(generation) else {
            debug!(identity, "session changed; local write skipped");
            return;
        };
        match self.cache.write(identity, &snapshot) {
            CacheWrite::Full => {}
            CacheWrite::Degraded(rung) => info!(identity, rung, "progress cached in degraded form"),
            CacheWrite::Failed => warn!(identity, "progress could not be cached locally"),
        }
        if !self.cache.write_backup(identity, &snapshot.journal_entries).persisted() {
            warn!(identity, "entry backup could not be written");
        }
        self.flush_remote(identity, generation).await;
    }

    pub(super) async fn flush_remote(&self, identity: &str, generation: u64) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        self.flush_entries(&remote, identity, generation).await;
        self.flush_follows(&remote, identity, generation).await;
        self.upload_profile(&remote, identity, generation).await;
    }

    /// Published state, read under the session lock so it is known to belong
    /// to `generation`.
    fn snapshot_for(&self, generation: u64) -> Option<Arc<ProgressState>> {
        let session = self.lock();
        (session.generation == generation).then(|| self.state.get())
    }

    /// Whether remote work for `generation` may go ahead on `channel`.
    pub(super) fn channel_open(&self, channel: Channel, generation: u64) -> bool {
        let session = self.lock();
        session.generation == generation && session.channels.is_enabled(channel)
    }

    async fn flush_entries(&self, remote: &Arc<dyn RemotePersistence>, identity: &str, generation: u64) {
        if !self.channel_open(Channel::Entries, generation) {
            return;
        }
        let mut queue: VecDeque<_> = self.lock().pending_entries.drain(..).collect();
        while let Some(entry) = queue.front() {
            if let Err(failure) = remote.insert_entry(identity, entry).await {
                match self.remote_failed(Channel::Entries, &failure, generation) {
                    FailureKind::Transient => break,
                    FailureKind::Capability => return,
                    FailureKind::Rejected(_) => {
                        warn!(identity, entry = entry.id.as_str(), "remote refused entry; not retried");
                    }
                }
            }
            queue.pop_front();
        }
        if queue.is_empty() {
            return;
        }
        let mut session = self.lock();
        if session.generation == generation && session.channels.is_enabled(Channel::Entries) {
            debug!(identity, pending = queue.len(), "entry uploads deferred");
            for entry in queue.into_iter().rev() {
                session.pending_entries.push_front(entry);
            }
        }
    }

    async fn flush_follows(&self, remote: &Arc<dyn RemotePersistence>, identity: &str, generation: u64) {
        if !self.channel_open(Channel::Follows, generation) {
            return;
        }
        let queue: Vec<(String, bool)> = {
            let session = self.lock();
            session
                .pending_follows
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect()
        };
        for (target, follow) in queue {
            if let Err(failure) = remote.set_follow(identity, &target, follow).await {
                match self.remote_failed(Channel::Follows, &failure, generation) {
                    FailureKind::Transient | FailureKind::Capability => break,
                    FailureKind::Rejected(_) => {
                        warn!(identity, followee = target.as_str(), "remote refused follow edge; not retried");
                    }
                }
            }
            let mut session = self.lock();
            // A newer toggle for the same target stays queued.
            if session.generation == generation && session.pending_follows.get(&target) == Some(&follow) {
                session.pending_follows.remove(&target);
            }
        }
    }

    async fn upload_profile(&self, remote: &Arc<dyn RemotePersistence>, identity: &str, generation: u64) {
        if !self.channel_open(Channel::Profile, generation) {
            return;
        }
        let Some(snapshot) = self.snapshot_for(generation) else {
            return;
        };
        let payload = snapshot.to_json();
        if let Err(failure) = remote.upsert_profile(identity, &payload).await {
            self.remote_failed(Channel::Profile, &failure, generation);
        }
    }

    /// Absorb a remote failure: capability errors close the channel for the
    /// session, transient ones become an advisory. Returns the classification.
    pub(super) fn remote_failed(&self, channel: Channel, failure: &RemoteFailure, generation: u64) -> FailureKind {
        let kind = classify(failure);
        let mut session = self.lock();
        if session.generation != generation {
            return kind;
        }
        match &kind {
            FailureKind::Capability => {
                if session.channels.disable(channel) {
                    warn!(%channel, code = ?failure.code, "remote channel unavailable; continuing local-only");
                }
                match channel {
                    Channel::Entries => session.pending_entries.clear(),
                    Channel::Follows => session.pending_follows.clear(),
                    Channel::Profile | Channel::Invites => {}
                }
            }
            FailureKind::Transient => {
                warn!(%channel, error = %failure, "remote write failed");
                session.notifications.push_back(Notification::SyncAdvisory {
                    channel,
                    message: failure.message.clone(),
                });
            }
            FailureKind::Rejected(conflict) => {
                debug!(%channel, reason = conflict.reason_code(), "remote rejected request");
            }
        }
        kind
    }
}
