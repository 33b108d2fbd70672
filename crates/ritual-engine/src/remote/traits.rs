use async_trait::async_trait;
use ritual_core::{InviteCode, JournalEntry};
use serde_json::Value;

use super::channel::RemoteResult;

/// Inviter resolved by a successful claim RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub inviter: String,
}

/// One accepted claim as recorded by the remote invite registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralAcceptance {
    pub code: String,
    pub claimant: String,
}

/// Remote persistence service. Every call may fail with a
/// [`RemoteFailure`](super::RemoteFailure); the engine classifies it.
#[async_trait]
pub trait RemotePersistence: Send + Sync {
    /// Opaque progress blob stored on the profile record.
    async fn fetch_profile(&self, identity: &str) -> RemoteResult<Option<Value>>;
    async fn upsert_profile(&self, identity: &str, progress: &Value) -> RemoteResult<()>;

    /// Raw entry rows, newest first.
    async fn list_entries(&self, identity: &str) -> RemoteResult<Vec<Value>>;
    async fn insert_entry(&self, identity: &str, entry: &JournalEntry) -> RemoteResult<()>;

    async fn list_following(&self, identity: &str) -> RemoteResult<Vec<String>>;
    async fn count_followers(&self, identity: &str) -> RemoteResult<u64>;
    async fn set_follow(&self, follower: &str, followee: &str, follow: bool) -> RemoteResult<()>;

    async fn register_invite_code(&self, identity: &str, code: &InviteCode) -> RemoteResult<()>;
    async fn claim_invite(&self, claimant: &str, code: &InviteCode) -> RemoteResult<ClaimReceipt>;
    async fn list_referral_acceptances(&self, inviter: &str) -> RemoteResult<Vec<ReferralAcceptance>>;
}
