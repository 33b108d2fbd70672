//! Smaller progress transitions: passive dwell XP, the daily share reward,
//! echoes, and the featured-mark showcase.

use std::collections::BTreeSet;

use crate::date::DateKey;
use crate::error::{ConflictError, ValidationError};
use crate::fingerprint::echo_fingerprint;
use crate::ledger::{LeagueTable, XpAward, award_xp};
use crate::marks::{self, Mark, MarkAction, MarkUnlock};
use crate::merge::merge_echoes;
use crate::model::{EchoRecord, MAX_FEATURED_MARKS, ProgressState};
use crate::rules::RewardRules;

/// Grant up to `amount` dwell XP, bounded by the per-day cap. Returns `None`
/// once today's cap is exhausted.
pub fn record_dwell(
    state: &mut ProgressState,
    amount: u64,
    today: DateKey,
    rules: &RewardRules,
    table: &LeagueTable,
) -> Result<Option<XpAward>, ValidationError> {
    if amount == 0 {
        return Err(ValidationError::ZeroAmount);
    }
    // A clock that went backwards keeps counting against the later day.
    if state.last_dwell_date.is_none_or(|last| last < today) {
        state.last_dwell_date = Some(today);
        state.daily_dwell_xp = 0;
    }
    let grant = amount.min(rules.dwell_daily_cap.saturating_sub(state.daily_dwell_xp));
    if grant == 0 {
        return Ok(None);
    }
    state.daily_dwell_xp += grant;
    Ok(Some(award_xp(state, grant, table)))
}

pub fn claim_share_reward(
    state: &mut ProgressState,
    today: DateKey,
    rules: &RewardRules,
    table: &LeagueTable,
) -> Result<XpAward, ConflictError> {
    if let Some(last) = state.last_share_reward_date.filter(|last| *last >= today) {
        return Err(ConflictError::ShareAlreadyRewarded(last));
    }
    state.last_share_reward_date = Some(today);
    Ok(award_xp(state, rules.share_reward_xp, table))
}

/// Record an echo the user gave. Returns `None` when this echo is already in
/// the recent history.
pub fn give_echo(state: &mut ProgressState, echo: EchoRecord) -> Option<Vec<MarkUnlock>> {
    let print = echo_fingerprint(&echo);
    if state.echo_history.iter().any(|e| echo_fingerprint(e) == print) {
        return None;
    }
    state.echoes_given = state.echoes_given.saturating_add(1);
    let mut history = std::mem::take(&mut state.echo_history);
    history.push(echo);
    state.echo_history = merge_echoes(history);
    Some(marks::evaluate(state, &MarkAction::EchoGiven))
}

/// Replace the featured marks. Order is kept; duplicates collapse.
pub fn set_featured_marks(state: &mut ProgressState, ids: &[String]) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    let featured: Vec<String> = ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect();
    if featured.len() > MAX_FEATURED_MARKS {
        return Err(ValidationError::TooManyFeatured {
            count: featured.len(),
            max: MAX_FEATURED_MARKS,
        });
    }
    for id in &featured {
        if Mark::from_id(id).is_none() {
            return Err(ValidationError::UnknownMark(id.clone()));
        }
        if !state.has_mark(id) {
            return Err(ValidationError::MarkNotUnlocked(id.clone()));
        }
    }
    state.featured_marks = featured;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(raw: &str) -> DateKey {
        DateKey::parse(raw).unwrap()
    }

    fn setup() -> (RewardRules, LeagueTable) {
        let rules = RewardRules::default();
        let table = LeagueTable::new(rules.league_threshold);
        (rules, table)
    }

    #[test]
    fn dwell_is_capped_per_day() {
        let (rules, table) = setup();
        let mut state = ProgressState::new();
        let today = day("2024-01-01");
        assert_eq!(record_dwell(&mut state, 15, today, &rules, &table).unwrap().unwrap().granted(), 15);
        assert_eq!(record_dwell(&mut state, 15, today, &rules, &table).unwrap().unwrap().granted(), 5);
        assert!(record_dwell(&mut state, 15, today, &rules, &table).unwrap().is_none());
        assert_eq!(state.total_xp, 20);

        let tomorrow = day("2024-01-02");
        assert!(record_dwell(&mut state, 3, tomorrow, &rules, &table).unwrap().is_some());
        assert_eq!(state.daily_dwell_xp, 3);
        assert_eq!(
            record_dwell(&mut state, 0, tomorrow, &rules, &table),
            Err(ValidationError::ZeroAmount)
        );
    }

    #[test]
    fn share_reward_once_per_day() {
        let (rules, table) = setup();
        let mut state = ProgressState::new();
        claim_share_reward(&mut state, day("2024-01-01"), &rules, &table).unwrap();
        let err = claim_share_reward(&mut state, day("2024-01-01"), &rules, &table).unwrap_err();
        assert_eq!(err.reason_code(), "share_already_rewarded");
        claim_share_reward(&mut state, day("2024-01-02"), &rules, &table).unwrap();
        assert_eq!(state.total_xp, 30);
    }

    #[test]
    fn echo_counts_once_and_unlocks_first_echo() {
        let mut state = ProgressState::new();
        let echo = EchoRecord {
            id: Some("row-1".into()),
            entry_id: Some("entry-1".into()),
            title: "Heat".into(),
            date: day("2024-01-01"),
        };
        let unlocked = give_echo(&mut state, echo.clone()).unwrap();
        assert_eq!(unlocked.iter().map(|u| u.id).collect::<Vec<_>>(), vec!["first_echo"]);
        assert!(give_echo(&mut state, echo).is_none());
        assert_eq!(state.echoes_given, 1);
        assert_eq!(state.echo_history.len(), 1);
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn featured_marks_must_be_unlocked_and_bounded() {
        let mut state = ProgressState::new();
        for id in ["first_mark", "streak_3", "critic", "century"] {
            state.marks.insert(id.into());
        }
        set_featured_marks(&mut state, &ids(&["critic", "first_mark", "critic"])).unwrap();
        assert_eq!(state.featured_marks, vec!["critic", "first_mark"]);

        assert!(matches!(
            set_featured_marks(&mut state, &ids(&["first_mark", "streak_3", "critic", "century"])),
            Err(ValidationError::TooManyFeatured { count: 4, .. })
        ));
        assert_eq!(
            set_featured_marks(&mut state, &ids(&["bogus"])),
            Err(ValidationError::UnknownMark("bogus".into()))
        );
        assert_eq!(
            set_featured_marks(&mut state, &ids(&["welcomed"])),
            Err(ValidationError::MarkNotUnlocked("welcomed".into()))
        );
        assert_eq!(state.featured_marks, vec!["critic", "first_mark"]);
    }
}
