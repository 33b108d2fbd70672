//! Achievement ("mark") catalog and rule evaluation.
//!
//! Each mark fires at most once per identity. Rules are pure predicates over
//! the progress state and the action that just happened; evaluation walks
//! [`CATALOG`] in declaration order so results are stable run to run.

use std::collections::BTreeSet;

use chrono::{NaiveTime, Timelike};
use serde::Serialize;

use crate::model::{JournalEntry, ProgressState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkCategory {
    Ritual,
    Craft,
    Rhythm,
    Discovery,
    Social,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    FirstMark,
    Exact180,
    NightOwl,
    EarlyBird,
    GenreHopper,
    GenreExplorer,
    Critic,
    Streak3,
    WeekStreak,
    MonthStreak,
    Comeback,
    TenRituals,
    FiftyRituals,
    Century,
    FirstEcho,
    EchoChamber,
    Ambassador,
    Welcomed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkDefinition {
    pub mark: Mark,
    pub id: &'static str,
    pub category: MarkCategory,
    pub notification: &'static str,
}

const fn def(
    mark: Mark,
    id: &'static str,
    category: MarkCategory,
    notification: &'static str,
) -> MarkDefinition {
    MarkDefinition {
        mark,
        id,
        category,
        notification,
    }
}

pub const CATALOG: &[MarkDefinition] = &[
    def(Mark::FirstMark, "first_mark", MarkCategory::Ritual, "Your first ritual is in the book."),
    def(Mark::Exact180, "180_exact", MarkCategory::Craft, "Exactly 180 characters. Precise."),
    def(Mark::NightOwl, "night_owl", MarkCategory::Rhythm, "Journaling after midnight."),
    def(Mark::EarlyBird, "early_bird", MarkCategory::Rhythm, "A ritual before sunrise."),
    def(Mark::GenreHopper, "genre_hopper", MarkCategory::Discovery, "Three genres explored."),
    def(Mark::GenreExplorer, "genre_explorer", MarkCategory::Discovery, "Ten genres explored."),
    def(Mark::Critic, "critic", MarkCategory::Craft, "Ten rated rituals."),
    def(Mark::Streak3, "streak_3", MarkCategory::Rhythm, "Three days in a row."),
    def(Mark::WeekStreak, "week_streak", MarkCategory::Rhythm, "A full week of rituals."),
    def(Mark::MonthStreak, "month_streak", MarkCategory::Rhythm, "Thirty days without a gap."),
    def(Mark::Comeback, "comeback", MarkCategory::Rhythm, "Back after a break."),
    def(Mark::TenRituals, "ten_rituals", MarkCategory::Ritual, "Ten rituals written."),
    def(Mark::FiftyRituals, "fifty_rituals", MarkCategory::Ritual, "Fifty rituals written."),
    def(Mark::Century, "century", MarkCategory::Ritual, "One hundred rituals written."),
    def(Mark::FirstEcho, "first_echo", MarkCategory::Social, "You echoed someone's ritual."),
    def(Mark::EchoChamber, "echo_chamber", MarkCategory::Social, "Your rituals were echoed ten times."),
    def(Mark::Ambassador, "ambassador", MarkCategory::Social, "A friend joined with your code."),
    def(Mark::Welcomed, "welcomed", MarkCategory::Social, "Joined through a friend's invite."),
];

impl Mark {
    pub fn definition(self) -> &'static MarkDefinition {
        CATALOG
            .iter()
            .find(|d| d.mark == self)
            .unwrap_or(&CATALOG[0])
    }

    pub fn id(self) -> &'static str {
        self.definition().id
    }

    pub fn from_id(id: &str) -> Option<Mark> {
        CATALOG.iter().find(|d| d.id == id).map(|d| d.mark)
    }
}

/// Notification produced the first and only time a mark unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkUnlock {
    pub id: &'static str,
    pub category: MarkCategory,
    pub notification: &'static str,
}

/// Insert `mark` into `marks`. Returns the notification only when the mark
/// was not already present.
pub fn try_unlock(mark: Mark, marks: &mut BTreeSet<String>) -> Option<MarkUnlock> {
    let def = mark.definition();
    if !marks.insert(def.id.to_string()) {
        return None;
    }
    Some(MarkUnlock {
        id: def.id,
        category: def.category,
        notification: def.notification,
    })
}

/// The action being evaluated.
#[derive(Debug, Clone, Copy)]
pub enum MarkAction<'a> {
    Ritual {
        entry: &'a JournalEntry,
        local_time: NaiveTime,
        /// The entry introduced a genre not seen before.
        novel_genre: bool,
    },
    EchoGiven,
    InviteClaimed,
    InviteAccepted,
    /// State arrived from elsewhere (hydration); only cumulative rules apply.
    Sync,
}

fn satisfied(mark: Mark, state: &ProgressState, action: &MarkAction<'_>) -> bool {
    let entries = state.journal_entries.len();
    match mark {
        Mark::FirstMark => entries >= 1,
        Mark::Exact180 => matches!(action, MarkAction::Ritual { entry, .. } if entry.visible_len() == 180),
        Mark::NightOwl => {
            matches!(action, MarkAction::Ritual { local_time, .. } if local_time.hour() < 4)
        }
        Mark::EarlyBird => {
            matches!(action, MarkAction::Ritual { local_time, .. } if (5..7).contains(&local_time.hour()))
        }
        Mark::GenreHopper => {
            matches!(action, MarkAction::Ritual { novel_genre: true, .. })
                && state.unique_genres.len() >= 3
        }
        Mark::GenreExplorer => state.unique_genres.len() >= 10,
        Mark::Critic => {
            state
                .journal_entries
                .iter()
                .filter(|e| e.rating.is_some())
                .count()
                >= 10
        }
        Mark::Streak3 => state.streak >= 3,
        Mark::WeekStreak => state.streak >= 7,
        Mark::MonthStreak => state.streak >= 30,
        Mark::Comeback => {
            matches!(action, MarkAction::Ritual { .. }) && state.non_consecutive_count >= 2
        }
        Mark::TenRituals => entries >= 10,
        Mark::FiftyRituals => entries >= 50,
        Mark::Century => entries >= 100,
        Mark::FirstEcho => state.echoes_given >= 1,
        Mark::EchoChamber => state.echoes_received >= 10,
        Mark::Ambassador => state.invite_claims_count >= 1,
        Mark::Welcomed => state.invited_by_code.is_some(),
    }
}

/// Evaluate every rule against `state` after `action`, unlocking what is newly
/// satisfied. Already-unlocked marks are skipped silently.
pub fn evaluate(state: &mut ProgressState, action: &MarkAction<'_>) -> Vec<MarkUnlock> {
    let mut unlocked = Vec::new();
    for def in CATALOG {
        if state.marks.contains(def.id) || !satisfied(def.mark, state, action) {
            continue;
        }
        unlocked.extend(try_unlock(def.mark, &mut state.marks));
    }
    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateKey;

    fn entry(text: &str) -> JournalEntry {
        JournalEntry {
            id: "e1".into(),
            date: DateKey::parse("2024-01-01").unwrap(),
            subject_id: "tt1".into(),
            subject_title: "Heat".into(),
            text: text.into(),
            genre: None,
            rating: None,
            poster_ref: None,
        }
    }

    #[test]
    fn catalog_ids_are_unique_and_round_trip() {
        let ids: BTreeSet<_> = CATALOG.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
        for def in CATALOG {
            assert_eq!(Mark::from_id(def.id), Some(def.mark));
            assert_eq!(def.mark.id(), def.id);
        }
    }

    #[test]
    fn try_unlock_is_idempotent() {
        let mut marks = BTreeSet::new();
        let first = try_unlock(Mark::FirstMark, &mut marks);
        assert_eq!(first.map(|u| u.id), Some("first_mark"));
        assert!(try_unlock(Mark::FirstMark, &mut marks).is_none());
        assert_eq!(marks.len(), 1);
    }

    #[test]
    fn ritual_rules_read_entry_and_time() {
        let text = "x".repeat(180);
        let e = entry(&text);
        let mut state = ProgressState::new();
        state.journal_entries.push(e.clone());
        let action = MarkAction::Ritual {
            entry: &e,
            local_time: NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
            novel_genre: false,
        };
        let ids: Vec<_> = evaluate(&mut state, &action).iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["first_mark", "180_exact", "night_owl"]);
        assert!(evaluate(&mut state, &action).is_empty());
    }

    #[test]
    fn sync_only_fires_cumulative_rules() {
        let mut state = ProgressState::new();
        state.streak = 7;
        state.echoes_received = 12;
        let ids: Vec<_> = evaluate(&mut state, &MarkAction::Sync)
            .iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec!["streak_3", "week_streak", "echo_chamber"]);
    }
}
