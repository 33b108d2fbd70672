//! The per-identity progress aggregate and the records it holds.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::date::DateKey;

pub const MAX_FEATURED_MARKS: usize = 3;
pub const MAX_ECHO_HISTORY: usize = 10;
pub const MAX_REFERRAL_KEYS: usize = 200;

/// Cumulative progress for one identity.
///
/// Persisted as camelCase JSON. Stored payloads are never deserialized into
/// this type directly; see [`crate::normalize::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    #[serde(rename = "dailyDwellXP")]
    pub daily_dwell_xp: u64,
    pub last_dwell_date: Option<DateKey>,
    pub last_login_date: Option<DateKey>,

    pub journal_entries: Vec<JournalEntry>,
    pub marks: BTreeSet<String>,
    pub featured_marks: Vec<String>,
    pub active_days: BTreeSet<DateKey>,
    pub unique_genres: BTreeSet<String>,

    pub streak: u32,
    pub last_streak_date: Option<DateKey>,
    pub non_consecutive_count: u32,

    pub echoes_given: u64,
    pub echoes_received: u64,
    pub echo_history: Vec<EchoRecord>,

    pub followers: u64,
    pub following: BTreeSet<String>,

    pub full_name: Option<String>,
    pub username: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub bio: Option<String>,
    pub avatar_id: Option<String>,
    pub avatar_url: Option<String>,
    /// Inline image payload (data URL). Large; first thing dropped under quota pressure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_data: Option<String>,

    pub last_share_reward_date: Option<DateKey>,

    pub invite_code: Option<String>,
    pub invited_by_code: Option<String>,
    pub invite_claims_count: u64,
    pub invite_rewards_earned: u64,
    pub invite_claimed_at: Option<NaiveDateTime>,
    pub referral_accepted_keys: IndexSet<String>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn entries_on(&self, date: DateKey) -> impl Iterator<Item = &JournalEntry> {
        self.journal_entries.iter().filter(move |e| e.date == date)
    }

    pub fn has_mark(&self, id: &str) -> bool {
        self.marks.contains(id)
    }
}

/// One journal entry about one film.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub date: DateKey,
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub subject_title: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_ref: Option<String>,
}

impl JournalEntry {
    /// Length as the user sees it: characters, not bytes, trimmed.
    pub fn visible_len(&self) -> usize {
        visible_len(&self.text)
    }
}

pub fn visible_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// A reaction the user gave to someone else's entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub title: String,
    pub date: DateKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_field_names() {
        let mut state = ProgressState::new();
        state.total_xp = 10;
        state.daily_dwell_xp = 3;
        state.marks.insert("first_mark".into());
        let json = state.to_json();
        assert_eq!(json["totalXP"], 10);
        assert_eq!(json["dailyDwellXP"], 3);
        assert_eq!(json["marks"][0], "first_mark");
        assert!(json.get("avatarData").is_none());
        assert!(json["inviteCode"].is_null());
    }

    #[test]
    fn visible_len_counts_chars_after_trim() {
        assert_eq!(visible_len("  héllo  "), 5);
        assert_eq!(visible_len(""), 0);
    }
}
