//! In-memory remote service for tests and offline demos.
//!
//! Channels can be switched to fail with a capability signature (feature
//! absent), a transient one (network down) or a constraint violation. Every call is counted per
//! channel so tests can assert that a disabled channel is never retried.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ritual_core::{InviteCode, JournalEntry};
use serde_json::Value;

use super::channel::{Channel, RemoteFailure, RemoteResult};
use super::traits::{ClaimReceipt, ReferralAcceptance, RemotePersistence};

#[derive(Debug, Default)]
struct MemRemoteState {
    profiles: BTreeMap<String, Value>,
    entries: BTreeMap<String, Vec<Value>>,
    follows: BTreeSet<(String, String)>,
    invite_owners: BTreeMap<String, String>,
    claimed_by: BTreeMap<String, String>,
    acceptances: Vec<ReferralAcceptance>,
    missing: BTreeSet<Channel>,
    offline: BTreeSet<Channel>,
    rejecting: BTreeSet<Channel>,
    calls: BTreeMap<Channel, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MemRemote {
    state: Arc<Mutex<MemRemoteState>>,
}

impl MemRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemRemoteState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `channel` fail as if its tables or policies were absent.
    pub fn set_missing(&self, channel: Channel, missing: bool) {
        let mut state = self.lock();
        if missing {
            state.missing.insert(channel);
        } else {
            state.missing.remove(&channel);
        }
    }

    /// Make `channel` fail with a transient network error.
    pub fn set_offline(&self, channel: Channel, offline: bool) {
        let mut state = self.lock();
        if offline {
            state.offline.insert(channel);
        } else {
            state.offline.remove(&channel);
        }
    }

    /// Make calls on `channel` fail with a check-constraint violation.
    pub fn set_rejecting(&self, channel: Channel, rejecting: bool) {
        let mut state = self.lock();
        if rejecting {
            state.rejecting.insert(channel);
        } else {
            state.rejecting.remove(&channel);
        }
    }

    pub fn calls(&self, channel: Channel) -> usize {
        self.lock().calls.get(&channel).copied().unwrap_or(0)
    }

    pub fn seed_profile(&self, identity: &str, progress: Value) {
        self.lock().profiles.insert(identity.to_string(), progress);
    }

    pub fn seed_entry(&self, identity: &str, row: Value) {
        self.lock()
            .entries
            .entry(identity.to_string())
            .or_default()
            .push(row);
    }

    pub fn seed_invite(&self, code: &str, owner: &str) {
        self.lock()
            .invite_owners
            .insert(code.to_string(), owner.to_string());
    }

    pub fn profile(&self, identity: &str) -> Option<Value> {
        self.lock().profiles.get(identity).cloned()
    }

    pub fn entry_count(&self, identity: &str) -> usize {
        self.lock().entries.get(identity).map_or(0, Vec::len)
    }

    pub fn is_following(&self, follower: &str, followee: &str) -> bool {
        self.lock()
            .follows
            .contains(&(follower.to_string(), followee.to_string()))
    }

    pub fn invite_owner(&self, code: &str) -> Option<String> {
        self.lock().invite_owners.get(code).cloned()
    }

    /// Count the call and fail if the channel is switched off.
    fn enter(&self, channel: Channel) -> RemoteResult<MutexGuard<'_, MemRemoteState>> {
        let mut state = self.lock();
        *state.calls.entry(channel).or_default() += 1;
        if state.missing.contains(&channel) {
            return Err(RemoteFailure::missing_relation(format!(
                "relation \"{channel}\" does not exist"
            )));
        }
        if state.offline.contains(&channel) {
            return Err(RemoteFailure::unavailable("service unavailable"));
        }
        if state.rejecting.contains(&channel) {
            return Err(RemoteFailure::new(
                Some("23514"),
                Some(400),
                format!("new row for \"{channel}\" violates check constraint"),
            ));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemotePersistence for MemRemote {
    async fn fetch_profile(&self, identity: &str) -> RemoteResult<Option<Value>> {
        Ok(self.enter(Channel::Profile)?.profiles.get(identity).cloned())
    }

    async fn upsert_profile(&self, identity: &str, progress: &Value) -> RemoteResult<()> {
        self.enter(Channel::Profile)?
            .profiles
            .insert(identity.to_string(), progress.clone());
        Ok(())
    }

    async fn list_entries(&self, identity: &str) -> RemoteResult<Vec<Value>> {
        let state = self.enter(Channel::Entries)?;
        let mut rows = state.entries.get(identity).cloned().unwrap_or_default();
        rows.reverse();
        Ok(rows)
    }

    async fn insert_entry(&self, identity: &str, entry: &JournalEntry) -> RemoteResult<()> {
        let row = serde_json::to_value(entry)
            .map_err(|err| RemoteFailure::new(Some("22P02"), Some(400), err.to_string()))?;
        self.enter(Channel::Entries)?
            .entries
            .entry(identity.to_string())
            .or_default()
            .push(row);
        Ok(())
    }

    async fn list_following(&self, identity: &str) -> RemoteResult<Vec<String>> {
        let state = self.enter(Channel::Follows)?;
        Ok(state
            .follows
            .iter()
            .filter(|(from, _)| from == identity)
            .map(|(_, to)| to.clone())
            .collect())
    }

    async fn count_followers(&self, identity: &str) -> RemoteResult<u64> {
        let state = self.enter(Channel::Follows)?;
        Ok(state.follows.iter().filter(|(_, to)| to == identity).count() as u64)
    }

    async fn set_follow(&self, follower: &str, followee: &str, follow: bool) -> RemoteResult<()> {
        let mut state = self.enter(Channel::Follows)?;
        let edge = (follower.to_string(), followee.to_string());
        if follow {
            state.follows.insert(edge);
        } else {
            state.follows.remove(&edge);
        }
        Ok(())
    }

    async fn register_invite_code(&self, identity: &str, code: &InviteCode) -> RemoteResult<()> {
        self.enter(Channel::Invites)?
            .invite_owners
            .entry(code.to_string())
            .or_insert_with(|| identity.to_string());
        Ok(())
    }

    async fn claim_invite(&self, claimant: &str, code: &InviteCode) -> RemoteResult<ClaimReceipt> {
        let mut state = self.enter(Channel::Invites)?;
        let Some(inviter) = state.invite_owners.get(code.as_str()).cloned() else {
            return Err(RemoteFailure::rejected("invite_not_found"));
        };
        if inviter == claimant {
            return Err(RemoteFailure::rejected("invite_self"));
        }
        if state.claimed_by.contains_key(claimant) {
            return Err(RemoteFailure::rejected("invite_already_claimed"));
        }
        state
            .claimed_by
            .insert(claimant.to_string(), code.to_string());
        state.acceptances.push(ReferralAcceptance {
            code: code.to_string(),
            claimant: claimant.to_string(),
        });
        Ok(ClaimReceipt { inviter })
    }

    async fn list_referral_acceptances(&self, inviter: &str) -> RemoteResult<Vec<ReferralAcceptance>> {
        let state = self.enter(Channel::Invites)?;
        Ok(state
            .acceptances
            .iter()
            .filter(|a| state.invite_owners.get(&a.code).is_some_and(|owner| owner == inviter))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FailureKind, classify};

    #[tokio::test]
    async fn missing_channel_fails_with_capability_signature() {
        let remote = MemRemote::new();
        remote.set_missing(Channel::Follows, true);
        let err = remote.list_following("u1").await.unwrap_err();
        assert_eq!(classify(&err), FailureKind::Capability);
        assert_eq!(remote.calls(Channel::Follows), 1);
    }

    #[tokio::test]
    async fn claim_rules_mirror_the_service() {
        let remote = MemRemote::new();
        let code = InviteCode::parse("ABCDEF12").unwrap();
        assert!(remote.claim_invite("bob", &code).await.is_err());

        remote.register_invite_code("alice", &code).await.unwrap();
        assert_eq!(remote.claim_invite("alice", &code).await, Err(RemoteFailure::rejected("invite_self")));
        assert_eq!(
            remote.claim_invite("bob", &code).await.unwrap().inviter,
            "alice"
        );
        assert_eq!(
            remote.claim_invite("bob", &code).await,
            Err(RemoteFailure::rejected("invite_already_claimed"))
        );
        let accepted = remote.list_referral_acceptances("alice").await.unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].claimant, "bob");
    }
}
