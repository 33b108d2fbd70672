//! Sign-in hydration and sign-out.

use std::sync::Arc;

use ritual_core::marks::{self, MarkAction};
use ritual_core::{InviteCode, ProgressState, merge, normalize};
use serde::Serialize;
use tracing::{debug, info};

use super::{Phase, ProgressEngine};
use crate::error::{EngineError, EngineResult};
use crate::remote::{Channel, RemotePersistence};

/// Authenticated identity supplied by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HydrationReport {
    /// Sources that contributed a snapshot.
    pub sources: usize,
    pub entries: usize,
    pub invite_code: Option<String>,
    /// Outcome of auto-claiming a pending invite code, when one was stored.
    pub pending_invite: Option<EngineResult<super::ClaimOutcome>>,
}

#[derive(Default)]
struct RemoteSnapshots {
    profile: Option<ProgressState>,
    entries: Option<ProgressState>,
    follows: Option<ProgressState>,
}

impl ProgressEngine {
    /// Hydrate progress for `identity` from every source, then run the
    /// post-sign-in chores: invite code issuance, inviter reward sync and the
    /// pending invite claim. Mutations are refused until this returns.
    pub async fn sign_in(&self, identity: Identity) -> EngineResult<HydrationReport> {
        let generation = {
            let mut session = self.lock();
            let generation = session.restart(Some(identity.clone()), Phase::Hydrating);
            self.state.set(ProgressState::default());
            generation
        };
        let id = identity.id.as_str();
        info!(identity = id, "hydrating progress");

        let remote = self.fetch_remote(id, generation).await;
        let backup = self.cache.read_backup(id).map(|journal_entries| ProgressState {
            journal_entries,
            ..ProgressState::default()
        });
        // Later sources win identity fields: local beats remote.
        let sources = [
            remote.profile,
            remote.entries,
            remote.follows,
            backup,
            self.cache.read_legacy(id),
            self.cache.read(id),
        ];
        let contributing = sources.iter().flatten().count();
        let mut state = merge(&sources).unwrap_or_default();

        let now = self.clock.now();
        let today = self.clock.today();
        state.last_login_date = state.last_login_date.max(Some(today));

        let code = match state.invite_code.as_deref().map(InviteCode::parse) {
            Some(Ok(code)) => code,
            _ => {
                let code = InviteCode::generate();
                state.invite_code = Some(code.to_string());
                code
            }
        };
        let mut registry = self.cache.invite_registry();
        registry.issue(&code, id, now);
        self.cache.write_invite_registry(&registry);
        let unlocked = marks::evaluate(&mut state, &MarkAction::Sync);

        {
            let mut session = self.lock();
            if session.generation != generation {
                return Err(EngineError::NoSession);
            }
            session.phase = Phase::Ready;
            session.record_unlocks(&unlocked);
            self.state.set(state);
        }

        self.register_invite_code(id, &code, generation).await;
        self.sync_inviter_rewards(id, generation).await;
        self.persist(id, generation).await;
        self.ensure_current(generation)?;

        let pending_invite = match self.cache.pending_invite() {
            Some(code) => Some(self.claim_pending_invite(&code).await),
            None => None,
        };

        self.ensure_current(generation)?;
        let snapshot = self.state.get();
        debug!(identity = id, sources = contributing, entries = snapshot.journal_entries.len(), "hydrated");
        Ok(HydrationReport {
            sources: contributing,
            entries: snapshot.journal_entries.len(),
            invite_code: snapshot.invite_code.clone(),
            pending_invite,
        })
    }

    /// Drop the session and reset the published state. In-flight remote work
    /// for the old session is discarded when it completes.
    pub fn sign_out(&self) {
        let identity = {
            let mut session = self.lock();
            let identity = session.identity.take();
            session.restart(None, Phase::SignedOut);
            self.state.set(ProgressState::default());
            identity
        };
        if let Some(identity) = identity {
            info!(identity = identity.id.as_str(), "signed out");
        }
    }

    async fn fetch_remote(&self, identity: &str, generation: u64) -> RemoteSnapshots {
        let mut out = RemoteSnapshots::default();
        let Some(remote) = self.remote.clone() else {
            return out;
        };
        out.profile = self.fetch_profile(&remote, identity, generation).await;
        out.entries = self.fetch_entries(&remote, identity, generation).await;
        out.follows = self.fetch_follows(&remote, identity, generation).await;
        out
    }

    async fn fetch_profile(
        &self,
        remote: &Arc<dyn RemotePersistence>,
        identity: &str,
        generation: u64,
    ) -> Option<ProgressState> {
        if !self.channel_open(Channel::Profile, generation) {
            return None;
        }
        match remote.fetch_profile(identity).await {
            Ok(blob) => blob.map(|raw| normalize(&raw)),
            Err(failure) => {
                self.remote_failed(Channel::Profile, &failure, generation);
                None
            }
        }
    }

    async fn fetch_entries(
        &self,
        remote: &Arc<dyn RemotePersistence>,
        identity: &str,
        generation: u64,
    ) -> Option<ProgressState> {
        if !self.channel_open(Channel::Entries, generation) {
            return None;
        }
        match remote.list_entries(identity).await {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => Some(normalize(&serde_json::json!({ "journalEntries": rows }))),
            Err(failure) => {
                self.remote_failed(Channel::Entries, &failure, generation);
                None
            }
        }
    }

    async fn fetch_follows(
        &self,
        remote: &Arc<dyn RemotePersistence>,
        identity: &str,
        generation: u64,
    ) -> Option<ProgressState> {
        if !self.channel_open(Channel::Follows, generation) {
            return None;
        }
        let following = match remote.list_following(identity).await {
            Ok(following) => following,
            Err(failure) => {
                self.remote_failed(Channel::Follows, &failure, generation);
                return None;
            }
        };
        let followers = match remote.count_followers(identity).await {
            Ok(count) => count,
            Err(failure) => {
                self.remote_failed(Channel::Follows, &failure, generation);
                0
            }
        };
        Some(ProgressState {
            following: following.into_iter().filter(|f| !f.trim().is_empty()).collect(),
            followers,
            ..ProgressState::default()
        })
    }
}
