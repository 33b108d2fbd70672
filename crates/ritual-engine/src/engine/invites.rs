//! Referral claims, invite code registration and inviter reward sync.

use ritual_core::marks::{self, MarkAction};
use ritual_core::referral::{apply_invitee_reward, apply_inviter_reward, precheck_claim};
use chrono::NaiveDateTime;
use ritual_core::{ConflictError, DateKey, InviteCode, MarkUnlock, ProgressState};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ProgressEngine, Session};
use crate::error::{EngineError, EngineResult};
use crate::events::Notification;
use crate::remote::{Channel, ClaimReceipt, FailureKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub code: InviteCode,
    pub inviter: String,
    pub xp_granted: u64,
    pub unlocked: Vec<MarkUnlock>,
    /// Whether the remote registry confirmed the claim.
    pub confirmed_remotely: bool,
}

impl ProgressEngine {
    /// Store a code captured from an invite link until it can be claimed.
    /// Works signed in or out.
    pub fn capture_pending_invite(&self, raw: &str) -> EngineResult<InviteCode> {
        let code = InviteCode::parse(raw)?;
        self.cache.set_pending_invite(&code);
        debug!(code = code.as_str(), "pending invite captured");
        Ok(code)
    }

    pub fn pending_invite(&self) -> Option<InviteCode> {
        self.cache.pending_invite()
    }

    /// Claim `raw` for the signed-in identity.
    ///
    /// Local guards run first (format, already invited, own code, device
    /// guard), then the owner is resolved remotely or, when the invite
    /// channel is absent, from the device registry.
    pub async fn claim_invite_code(&self, raw: &str) -> EngineResult<ClaimOutcome> {
        let (identity, generation, code) = {
            let mut session = self.lock();
            let (identity, generation) = session.ready()?;
            let state = self.state.get();
            let guard = self.cache.device_guard();
            let code = precheck_claim(
                &state,
                raw,
                &guard,
                self.clock.today(),
                self.config.invite_daily_limit,
            )?;
            if !session.claims_in_flight.insert(code.to_string()) {
                return Err(ConflictError::ClaimInFlight.into());
            }
            (identity, generation, code)
        };
        let result = self.complete_claim(&identity, generation, &code).await;
        self.lock().claims_in_flight.remove(code.as_str());
        let device = self.config.device_id.as_str();
        match &result {
            Ok(outcome) => info!(identity = identity.as_str(), device, code = code.as_str(), inviter = outcome.inviter.as_str(), "invite claimed"),
            Err(err) => debug!(identity = identity.as_str(), device, code = code.as_str(), reason = err.reason_code(), "invite claim refused"),
        }
        result
    }

    /// Claim the stored pending code and clear it unless the failure may
    /// go away on a later attempt.
    pub(super) async fn claim_pending_invite(&self, code: &InviteCode) -> EngineResult<ClaimOutcome> {
        let result = self.claim_invite_code(code.as_str()).await;
        let clear = match &result {
            Ok(_) => true,
            Err(EngineError::Rule(rule)) => rule.clears_pending_invite(),
            Err(_) => false,
        };
        if clear {
            self.cache.clear_pending_invite();
        }
        result
    }

    async fn complete_claim(&self, identity: &str, generation: u64, code: &InviteCode) -> EngineResult<ClaimOutcome> {
        let receipt = self.remote_claim(identity, generation, code).await?;
        let confirmed_remotely = receipt.is_some();
        let inviter = match receipt {
            Some(receipt) => receipt.inviter,
            None => self
                .cache
                .invite_registry()
                .owner_of(code)
                .map(str::to_string)
                .ok_or(ConflictError::InviteNotFound)?,
        };
        if inviter == identity {
            return Err(ConflictError::SelfInvite.into());
        }

        let now = self.clock.now();
        let rules = &self.config.rewards;
        let table = &self.table;
        let reward = |state: &mut ProgressState, session: &mut Session| -> EngineResult<(u64, Vec<MarkUnlock>)> {
            let award = apply_invitee_reward(state, code, now, rules, table)?;
            let unlocked = marks::evaluate(state, &MarkAction::InviteClaimed);
            session.record_award(&award);
            session.record_unlocks(&unlocked);
            Ok((award.granted(), unlocked))
        };
        let mut persist_generation = Some(generation);
        let (xp_granted, unlocked) = match self.commit(Some(generation), reward) {
            Ok((_, _, out)) => out,
            // The remote registry already counts this claimant, so a retry
            // would be refused. The reward lands in a newer session for the
            // same identity, or else in its cached snapshot.
            Err(EngineError::NoSession | EngineError::NotHydrated) if confirmed_remotely => {
                let resumed = self.commit(None, |state, session| {
                    if session.identity.as_ref().is_none_or(|current| current.id != identity) {
                        return Err(EngineError::NoSession);
                    }
                    reward(state, session)
                });
                match resumed {
                    Ok((_, current, out)) => {
                        persist_generation = Some(current);
                        out
                    }
                    Err(EngineError::NoSession | EngineError::NotHydrated) => {
                        persist_generation = None;
                        self.credit_invitee_detached(identity, code, now)?
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        let mut guard = self.cache.device_guard();
        guard.record(code, DateKey::of(now));
        self.cache.write_device_guard(&guard);
        let mut registry = self.cache.invite_registry();
        registry.record_claim(code, &inviter, now);
        self.cache.write_invite_registry(&registry);

        if !confirmed_remotely {
            self.credit_inviter_locally(&inviter, code, identity);
        }
        if let Some(generation) = persist_generation {
            self.persist(identity, generation).await;
        }

        Ok(ClaimOutcome {
            code: code.clone(),
            inviter,
            xp_granted,
            unlocked,
            confirmed_remotely,
        })
    }

    /// `Ok(None)` means the remote registry is not available and the local
    /// registry decides.
    async fn remote_claim(&self, identity: &str, generation: u64, code: &InviteCode) -> EngineResult<Option<ClaimReceipt>> {
        let Some(remote) = self.remote.clone() else {
            return Ok(None);
        };
        if !self.channel_open(Channel::Invites, generation) {
            return Ok(None);
        }
        match remote.claim_invite(identity, code).await {
            Ok(receipt) => Ok(Some(receipt)),
            Err(failure) => match self.remote_failed(Channel::Invites, &failure, generation) {
                FailureKind::Capability => Ok(None),
                FailureKind::Rejected(conflict) => Err(conflict.into()),
                FailureKind::Transient => Err(EngineError::Deferred {
                    channel: Channel::Invites,
                    message: failure.message,
                }),
            },
        }
    }

    /// Apply the invitee reward to `identity`'s cached snapshot after the
    /// session that made the claim went away.
    fn credit_invitee_detached(
        &self,
        identity: &str,
        code: &InviteCode,
        now: NaiveDateTime,
    ) -> EngineResult<(u64, Vec<MarkUnlock>)> {
        let mut state = self.cache.read(identity).unwrap_or_default();
        let award = apply_invitee_reward(&mut state, code, now, &self.config.rewards, &self.table)?;
        let unlocked = marks::evaluate(&mut state, &MarkAction::InviteClaimed);
        if self.cache.write(identity, &state).persisted() {
            info!(identity, code = code.as_str(), "invite reward cached for a closed session");
        } else {
            warn!(identity, "invitee reward could not be cached");
        }
        Ok((award.granted(), unlocked))
    }

    /// Local-only mode: the inviter's cached snapshot on this device is the
    /// only place their reward can land.
    fn credit_inviter_locally(&self, inviter: &str, code: &InviteCode, claimant: &str) {
        let Some(mut state) = self.cache.read(inviter) else {
            debug!(inviter, "no cached snapshot for inviter; reward waits for their sync");
            return;
        };
        if apply_inviter_reward(&mut state, code, claimant, &self.config.rewards, &self.table).is_none() {
            return;
        }
        marks::evaluate(&mut state, &MarkAction::InviteAccepted);
        if !self.cache.write(inviter, &state).persisted() {
            warn!(inviter, "inviter reward could not be cached");
        }
    }

    pub(super) async fn register_invite_code(&self, identity: &str, code: &InviteCode, generation: u64) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        if !self.channel_open(Channel::Invites, generation) {
            return;
        }
        if let Err(failure) = remote.register_invite_code(identity, code).await {
            self.remote_failed(Channel::Invites, &failure, generation);
        }
    }

    /// Credit the signed-in inviter once per claimant the remote registry
    /// has accepted since the last sync.
    pub(super) async fn sync_inviter_rewards(&self, identity: &str, generation: u64) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        if !self.channel_open(Channel::Invites, generation) {
            return;
        }
        let acceptances = match remote.list_referral_acceptances(identity).await {
            Ok(list) => list,
            Err(failure) => {
                self.remote_failed(Channel::Invites, &failure, generation);
                return;
            }
        };
        if acceptances.is_empty() {
            return;
        }
        let rules = &self.config.rewards;
        let table = &self.table;
        let result = self.commit(Some(generation), |state, session| {
            let mut credited = 0;
            for acceptance in &acceptances {
                let Ok(code) = InviteCode::parse(&acceptance.code) else {
                    continue;
                };
                if acceptance.claimant == identity {
                    continue;
                }
                if let Some(award) = apply_inviter_reward(state, &code, &acceptance.claimant, rules, table) {
                    session.record_award(&award);
                    session.notifications.push_back(Notification::InviteAccepted {
                        claimant: acceptance.claimant.clone(),
                        xp: award.granted(),
                    });
                    credited += 1;
                }
            }
            let unlocked = marks::evaluate(state, &MarkAction::InviteAccepted);
            session.record_unlocks(&unlocked);
            Ok(credited)
        });
        if let Ok((_, _, credited)) = result {
            if credited > 0 {
                info!(identity, credited, "inviter rewards applied");
            }
        }
    }
}
