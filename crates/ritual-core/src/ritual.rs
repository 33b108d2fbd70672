//! Journal entry submission: the synchronous half of the ritual pipeline.
//!
//! Moderation and remote upload live in the engine. Everything here runs
//! before the first suspension point and either commits fully or leaves the
//! state untouched.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::date::DateKey;
use crate::error::{ConflictError, RuleError, ValidationError};
use crate::fingerprint::{is_placeholder_title, normalize_text, subject_identity};
use crate::ledger::{LeagueTable, XpAward, award_xp};
use crate::marks::{self, MarkAction, MarkUnlock};
use crate::model::{JournalEntry, ProgressState, visible_len};
use crate::rules::RewardRules;
use crate::streak::{self, StreakAdvance};

/// What the user typed, before it becomes a [`JournalEntry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RitualDraft {
    pub subject_id: String,
    pub subject_title: String,
    pub text: String,
    pub rating: Option<f32>,
    pub genre: Option<String>,
    pub poster_ref: Option<String>,
}

impl RitualDraft {
    pub fn new(subject_id: impl Into<String>, subject_title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            subject_title: subject_title.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_poster(mut self, poster_ref: impl Into<String>) -> Self {
        self.poster_ref = Some(poster_ref.into());
        self
    }

    fn to_entry(&self, id: String, date: DateKey) -> JournalEntry {
        let trimmed = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        JournalEntry {
            id,
            date,
            subject_id: self.subject_id.trim().to_string(),
            subject_title: self.subject_title.trim().to_string(),
            text: self.text.trim().to_string(),
            genre: trimmed(&self.genre),
            rating: self.rating,
            poster_ref: trimmed(&self.poster_ref),
        }
    }
}

pub fn validate_draft(draft: &RitualDraft, rules: &RewardRules) -> Result<(), ValidationError> {
    let chars = visible_len(&draft.text);
    if chars == 0 {
        return Err(ValidationError::EmptyEntry);
    }
    if chars > rules.max_entry_chars {
        return Err(ValidationError::EntryTooLong {
            chars,
            max: rules.max_entry_chars,
        });
    }
    if draft.subject_id.trim().is_empty() && is_placeholder_title(&draft.subject_title) {
        return Err(ValidationError::MissingSubject);
    }
    if let Some(rating) = draft.rating {
        if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
            return Err(ValidationError::InvalidRating(rating));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RitualOutcome {
    pub entry: JournalEntry,
    pub first_today: bool,
    #[serde(skip)]
    pub xp: XpAward,
    pub xp_granted: u64,
    pub streak: Option<StreakAdvance>,
    pub unlocked: Vec<MarkUnlock>,
}

/// Commit one journal entry written at local time `now`.
pub fn commit_ritual(
    state: &mut ProgressState,
    draft: &RitualDraft,
    now: NaiveDateTime,
    entry_id: String,
    rules: &RewardRules,
    table: &LeagueTable,
) -> Result<RitualOutcome, RuleError> {
    validate_draft(draft, rules)?;
    let today = DateKey::of(now);
    let entry = draft.to_entry(entry_id, today);

    let identity = subject_identity(&entry);
    if state
        .entries_on(today)
        .any(|existing| subject_identity(existing) == identity)
    {
        return Err(ConflictError::DuplicateEntryToday {
            subject_id: entry.subject_id.clone(),
            date: today,
        }
        .into());
    }

    // Decided once, before anything below mutates the state.
    let first_today = state.entries_on(today).next().is_none();

    let genre = entry.genre.as_deref().map(normalize_text).filter(|g| !g.is_empty());
    let novel_genre = genre
        .as_ref()
        .is_some_and(|g| !state.unique_genres.contains(g));

    let streak = streak::advance(state, today, first_today);
    let amount = rules.entry_award(entry.visible_len(), state.streak);
    let xp = award_xp(state, amount, table);

    state.journal_entries.push(entry.clone());
    state
        .journal_entries
        .sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
    state.active_days.insert(today);
    if let Some(genre) = genre {
        state.unique_genres.insert(genre);
    }

    let unlocked = marks::evaluate(
        state,
        &MarkAction::Ritual {
            entry: &entry,
            local_time: now.time(),
            novel_genre,
        },
    );
    log::debug!(
        "ritual committed: subject={} xp={} first_today={first_today}",
        identity,
        xp.granted()
    );

    Ok(RitualOutcome {
        xp_granted: xp.granted(),
        entry,
        first_today,
        xp,
        streak,
        unlocked,
    })
}
