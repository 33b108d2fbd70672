//! Day-over-day streak continuity from calendar date keys.

use serde::Serialize;

use crate::date::DateKey;
use crate::model::ProgressState;

/// Streak lengths that earn a one-shot celebration.
pub const MILESTONES: &[u32] = &[3, 7, 14, 30, 50, 100, 365];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "cadence")]
pub enum Cadence {
    /// No previous streak date.
    First,
    /// Already counted today. Also used when the clock moved backwards.
    SameDay,
    /// Previous date was yesterday.
    Maintained,
    /// One or more calendar days were skipped.
    Broken { gap_days: i64 },
}

impl Cadence {
    pub fn same_day(self) -> bool {
        matches!(self, Cadence::SameDay)
    }

    pub fn maintained(self) -> bool {
        matches!(self, Cadence::Maintained)
    }

    pub fn broken(self) -> bool {
        matches!(self, Cadence::Broken { .. })
    }
}

pub fn evaluate(last: Option<DateKey>, today: DateKey) -> Cadence {
    let Some(last) = last else {
        return Cadence::First;
    };
    match last.days_until(today) {
        diff if diff <= 0 => Cadence::SameDay,
        1 => Cadence::Maintained,
        gap_days => Cadence::Broken { gap_days },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakAdvance {
    pub cadence: Cadence,
    pub previous: u32,
    pub current: u32,
    /// Set when `current` is a milestone reached by this advance.
    pub milestone: Option<u32>,
}

/// Apply today's qualifying action to the streak.
///
/// `first_today` must be decided by the caller before any other side effect
/// of the action; only the day's first action moves the streak.
pub fn advance(state: &mut ProgressState, today: DateKey, first_today: bool) -> Option<StreakAdvance> {
    if !first_today {
        return None;
    }
    let cadence = evaluate(state.last_streak_date, today);
    let previous = state.streak;
    let current = match cadence {
        Cadence::SameDay => return None,
        Cadence::Maintained => previous.saturating_add(1),
        Cadence::First | Cadence::Broken { .. } => {
            state.non_consecutive_count = state.non_consecutive_count.saturating_add(1);
            1
        }
    };
    state.streak = current;
    state.last_streak_date = Some(today);
    let milestone = (current != previous && MILESTONES.contains(&current)).then_some(current);
    Some(StreakAdvance {
        cadence,
        previous,
        current,
        milestone,
    })
}

/// Streak as it stands today without acting: zero once a day has been missed.
pub fn effective_streak(state: &ProgressState, today: DateKey) -> u32 {
    match evaluate(state.last_streak_date, today) {
        Cadence::SameDay | Cadence::Maintained => state.streak,
        Cadence::First | Cadence::Broken { .. } => 0,
    }
}
