//! User-initiated mutations. Each commits locally, then persists.

use ritual_core::activity;
use ritual_core::ledger::award_xp;
use ritual_core::{
    EchoRecord, MarkUnlock, ProgressState, RitualDraft, RitualOutcome, ValidationError, XpAward,
    commit_ritual,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::ProgressEngine;
use crate::error::EngineResult;
use crate::events::Notification;
use crate::moderation::ModerationLimits;
use crate::remote::Channel;

/// Partial profile update. `None` leaves a field alone; an empty string
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileEdit {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub bio: Option<String>,
    pub avatar_id: Option<String>,
    pub avatar_url: Option<String>,
    pub avatar_data: Option<String>,
}

impl ProfileEdit {
    fn apply(&self, state: &mut ProgressState) {
        let fields = [
            (&self.full_name, &mut state.full_name),
            (&self.username, &mut state.username),
            (&self.gender, &mut state.gender),
            (&self.birth_date, &mut state.birth_date),
            (&self.bio, &mut state.bio),
            (&self.avatar_id, &mut state.avatar_id),
            (&self.avatar_url, &mut state.avatar_url),
            (&self.avatar_data, &mut state.avatar_data),
        ];
        for (edit, slot) in fields {
            if let Some(value) = edit {
                let value = value.trim();
                *slot = (!value.is_empty()).then(|| value.to_string());
            }
        }
    }
}

impl ProgressEngine {
    /// Grant `amount` XP. Crossed league thresholds queue level-ups in order.
    pub async fn award_xp(&self, amount: u64) -> EngineResult<XpAward> {
        let (identity, generation, award) = self.commit(None, |state, session| {
            if amount == 0 {
                return Err(ValidationError::ZeroAmount.into());
            }
            let award = award_xp(state, amount, &self.table);
            session.record_award(&award);
            Ok(award)
        })?;
        self.persist(&identity, generation).await;
        Ok(award)
    }

    /// Moderate, validate and commit one journal entry, then upload it.
    pub async fn submit_entry(&self, draft: RitualDraft) -> EngineResult<RitualOutcome> {
        let now = self.clock.now();
        let limits = ModerationLimits {
            max_chars: self.config.rewards.max_entry_chars,
        };
        let (identity, generation, outcome) = self.commit(None, |state, session| {
            self.moderator.moderate(&draft.text, &limits).into_result()?;
            let outcome = commit_ritual(
                state,
                &draft,
                now,
                uuid::Uuid::new_v4().to_string(),
                &self.config.rewards,
                &self.table,
            )?;
            session.record_award(&outcome.xp);
            if let Some(advance) = &outcome.streak {
                session.notifications.extend(Notification::from_streak(advance));
            }
            session.record_unlocks(&outcome.unlocked);
            if self.uploads_to(session, Channel::Entries) {
                session.pending_entries.push_back(outcome.entry.clone());
            }
            Ok(outcome)
        })?;
        info!(
            identity = identity.as_str(),
            subject = outcome.entry.subject_id.as_str(),
            xp = outcome.xp_granted,
            "entry committed"
        );
        self.persist(&identity, generation).await;
        Ok(outcome)
    }

    /// Follow or unfollow `target`. Returns whether `target` is now followed.
    pub async fn toggle_follow(&self, target: &str) -> EngineResult<bool> {
        let target = target.trim().to_string();
        let (identity, generation, following) = self.commit(None, |state, session| {
            if target.is_empty() {
                return Err(ValidationError::MissingSubject.into());
            }
            let following = if state.following.remove(&target) {
                false
            } else {
                state.following.insert(target.clone());
                true
            };
            if self.uploads_to(session, Channel::Follows) {
                session.pending_follows.insert(target.clone(), following);
            }
            Ok(following)
        })?;
        debug!(identity = identity.as_str(), target = target.as_str(), following, "follow toggled");
        self.persist(&identity, generation).await;
        Ok(following)
    }

    /// Record an echo given on someone's entry. A repeat of a recent echo is
    /// a no-op that returns no unlocks.
    pub async fn give_echo(&self, echo: EchoRecord) -> EngineResult<Vec<MarkUnlock>> {
        let (identity, generation, unlocked) = self.commit(None, |state, session| {
            let unlocked = activity::give_echo(state, echo).unwrap_or_default();
            session.record_unlocks(&unlocked);
            Ok(unlocked)
        })?;
        self.persist(&identity, generation).await;
        Ok(unlocked)
    }

    /// Passive XP for time spent reading; `None` once today's cap is used up.
    pub async fn record_dwell(&self, amount: u64) -> EngineResult<Option<XpAward>> {
        let today = self.clock.today();
        let (identity, generation, award) = self.commit(None, |state, session| {
            let award = activity::record_dwell(state, amount, today, &self.config.rewards, &self.table)?;
            if let Some(award) = &award {
                session.record_award(award);
            }
            Ok(award)
        })?;
        if award.is_some() {
            self.persist(&identity, generation).await;
        }
        Ok(award)
    }

    pub async fn claim_share_reward(&self) -> EngineResult<XpAward> {
        let today = self.clock.today();
        let (identity, generation, award) = self.commit(None, |state, session| {
            let award = activity::claim_share_reward(state, today, &self.config.rewards, &self.table)?;
            session.record_award(&award);
            Ok(award)
        })?;
        self.persist(&identity, generation).await;
        Ok(award)
    }

    pub async fn set_featured_marks(&self, ids: &[String]) -> EngineResult<()> {
        let (identity, generation, ()) = self.commit(None, |state, _| {
            activity::set_featured_marks(state, ids)?;
            Ok(())
        })?;
        self.persist(&identity, generation).await;
        Ok(())
    }

    pub async fn update_profile(&self, edit: ProfileEdit) -> EngineResult<()> {
        let (identity, generation, ()) = self.commit(None, |state, _| {
            edit.apply(state);
            Ok(())
        })?;
        self.persist(&identity, generation).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_edit_sets_clears_and_skips() {
        let mut state = ProgressState {
            bio: Some("old".into()),
            username: Some("reel".into()),
            ..ProgressState::default()
        };
        let edit = ProfileEdit {
            full_name: Some("  Ada Reel ".into()),
            bio: Some("".into()),
            ..ProfileEdit::default()
        };
        edit.apply(&mut state);
        assert_eq!(state.full_name.as_deref(), Some("Ada Reel"));
        assert_eq!(state.bio, None);
        assert_eq!(state.username.as_deref(), Some("reel"));
    }

    #[test]
    fn profile_edit_reads_camel_case() {
        let edit: ProfileEdit = serde_json::from_str(r#"{"avatarUrl":"https://img/1.png"}"#).unwrap();
        assert_eq!(edit.avatar_url.as_deref(), Some("https://img/1.png"));
        assert_eq!(edit.full_name, None);
    }
}
