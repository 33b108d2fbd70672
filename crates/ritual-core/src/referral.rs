//! Invite codes, the shared invite registry, the per-device claim guard, and
//! the reward side of an accepted claim.
//!
//! Guard order for a claim: format, account already invited, own code,
//! device guard, then (in the caller) owner resolution. Both sides are
//! rewarded at most once: the invitee through the write-once
//! `invited_by_code`, the inviter through `referral_accepted_keys`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::date::DateKey;
use crate::error::{ConflictError, RuleError, ValidationError};
use crate::ledger::{LeagueTable, XpAward, award_xp};
use crate::model::{MAX_REFERRAL_KEYS, ProgressState};
use crate::rules::RewardRules;

pub const INVITE_CODE_LEN: usize = 8;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static INVITE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{8}$").expect("invite code regex"));

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    /// Trim and uppercase, then require exactly eight `[A-Z0-9]`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let candidate = raw.trim().to_ascii_uppercase();
        if INVITE_CODE_RE.is_match(&candidate) {
            Ok(Self(candidate))
        } else {
            Err(ValidationError::InvalidInviteCode(raw.to_string()))
        }
    }

    /// Fresh random code.
    pub fn generate() -> Self {
        let bytes = uuid::Uuid::new_v4().into_bytes();
        let code = bytes[..INVITE_CODE_LEN]
            .iter()
            .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep a stored code only if it is well formed.
pub fn valid_code(raw: Option<&str>) -> Option<String> {
    raw.and_then(|c| InviteCode::parse(c).ok())
        .map(InviteCode::into_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRegistryEntry {
    pub owner_identity: String,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub claim_count: u64,
    #[serde(default)]
    pub last_claim_at: Option<NaiveDateTime>,
}

/// Code → owner map, shared by every identity on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteRegistry {
    entries: BTreeMap<String, InviteRegistryEntry>,
}

impl InviteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner` as the owner of `code`. An existing owner is kept.
    pub fn issue(&mut self, code: &InviteCode, owner: &str, now: NaiveDateTime) {
        self.entries
            .entry(code.as_str().to_string())
            .or_insert_with(|| InviteRegistryEntry {
                owner_identity: owner.to_string(),
                created_at: now,
                claim_count: 0,
                last_claim_at: None,
            });
    }

    pub fn owner_of(&self, code: &InviteCode) -> Option<&str> {
        self.entries
            .get(code.as_str())
            .map(|e| e.owner_identity.as_str())
    }

    pub fn get(&self, code: &InviteCode) -> Option<&InviteRegistryEntry> {
        self.entries.get(code.as_str())
    }

    /// Bump the claim counter; creates the entry when the owner was only
    /// known remotely.
    pub fn record_claim(&mut self, code: &InviteCode, owner: &str, now: NaiveDateTime) {
        let entry = self
            .entries
            .entry(code.as_str().to_string())
            .or_insert_with(|| InviteRegistryEntry {
                owner_identity: owner.to_string(),
                created_at: now,
                claim_count: 0,
                last_claim_at: None,
            });
        entry.claim_count += 1;
        entry.last_claim_at = Some(now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-device claim throttle. The daily count resets with the date; the list
/// of claimed codes never does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteDeviceGuard {
    #[serde(default)]
    pub date: Option<DateKey>,
    #[serde(default)]
    pub claim_count: u32,
    #[serde(default)]
    pub claimed_codes: Vec<String>,
}

impl InviteDeviceGuard {
    fn count_on(&self, today: DateKey) -> u32 {
        if self.date == Some(today) {
            self.claim_count
        } else {
            0
        }
    }

    pub fn check(&self, code: &InviteCode, today: DateKey, limit: u32) -> Result<(), ConflictError> {
        if self.count_on(today) >= limit {
            return Err(ConflictError::DeviceLimit { limit });
        }
        if self.claimed_codes.iter().any(|c| c == code.as_str()) {
            return Err(ConflictError::DeviceCodeReuse);
        }
        Ok(())
    }

    pub fn record(&mut self, code: &InviteCode, today: DateKey) {
        self.claim_count = self.count_on(today) + 1;
        self.date = Some(today);
        if !self.claimed_codes.iter().any(|c| c == code.as_str()) {
            self.claimed_codes.push(code.as_str().to_string());
        }
    }
}

/// Local guards 1 to 4. Owner resolution (guard 5) needs the registry or the
/// remote service and is done by the caller.
pub fn precheck_claim(
    state: &ProgressState,
    raw_code: &str,
    guard: &InviteDeviceGuard,
    today: DateKey,
    device_limit: u32,
) -> Result<InviteCode, RuleError> {
    let code = InviteCode::parse(raw_code)?;
    if state.invited_by_code.is_some() {
        return Err(ConflictError::AlreadyClaimedOnAccount.into());
    }
    if state.invite_code.as_deref() == Some(code.as_str()) {
        return Err(ConflictError::SelfInvite.into());
    }
    guard.check(&code, today, device_limit)?;
    Ok(code)
}

/// Key identifying one claimant of one code on the inviter side.
pub fn acceptance_key(code: &InviteCode, claimant: &str) -> String {
    format!("{code}:{claimant}")
}

/// Credit the invitee. Sets the write-once `invited_by_code`.
pub fn apply_invitee_reward(
    state: &mut ProgressState,
    code: &InviteCode,
    now: NaiveDateTime,
    rules: &RewardRules,
    table: &LeagueTable,
) -> Result<XpAward, ConflictError> {
    if state.invited_by_code.is_some() {
        return Err(ConflictError::AlreadyClaimedOnAccount);
    }
    state.invited_by_code = Some(code.as_str().to_string());
    state.invite_claimed_at = Some(now);
    Ok(award_xp(state, rules.invitee_reward_xp, table))
}

/// Credit the inviter for `claimant`. Returns `None` when that claimant was
/// already rewarded.
pub fn apply_inviter_reward(
    state: &mut ProgressState,
    code: &InviteCode,
    claimant: &str,
    rules: &RewardRules,
    table: &LeagueTable,
) -> Option<XpAward> {
    let key = acceptance_key(code, claimant);
    if state.referral_accepted_keys.contains(&key) {
        return None;
    }
    state.referral_accepted_keys.insert(key);
    while state.referral_accepted_keys.len() > MAX_REFERRAL_KEYS {
        state.referral_accepted_keys.shift_remove_index(0);
    }
    state.invite_claims_count += 1;
    state.invite_rewards_earned += rules.inviter_reward_xp;
    Some(award_xp(state, rules.inviter_reward_xp, table))
}
