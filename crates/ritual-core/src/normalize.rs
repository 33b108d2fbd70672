//! Read boundary for stored and remote progress payloads.
//!
//! Payloads come from older app versions, other devices and the remote
//! profile blob, so no field is trusted: wrong types fall back to defaults,
//! malformed entries are skipped, and invariants are re-established before a
//! [`ProgressState`] is handed out.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::date::DateKey;
use crate::fingerprint::{echo_fingerprint, normalize_text};
use crate::merge::{merge_echoes, merge_entries};
use crate::model::{
    EchoRecord, JournalEntry, MAX_FEATURED_MARKS, MAX_REFERRAL_KEYS, ProgressState,
};
use crate::referral::valid_code;

/// Build a [`ProgressState`] from an arbitrary JSON value.
pub fn normalize(raw: &Value) -> ProgressState {
    let Some(obj) = raw.as_object() else {
        return ProgressState::default();
    };

    let entries_raw = field(obj, &["journalEntries", "entries"]);
    let journal_entries = merge_entries(
        entries_raw
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(entry_from_value),
    );

    let mut state = ProgressState {
        total_xp: u64_field(obj, &["totalXP", "xp"]),
        daily_dwell_xp: u64_field(obj, &["dailyDwellXP"]),
        last_dwell_date: date_field(obj, &["lastDwellDate"]),
        last_login_date: date_field(obj, &["lastLoginDate"]),
        journal_entries,
        marks: string_set(obj, &["marks"]),
        featured_marks: string_list(obj, &["featuredMarks"]),
        active_days: string_list(obj, &["activeDays"])
            .iter()
            .filter_map(|d| DateKey::parse(d))
            .collect(),
        unique_genres: string_list(obj, &["uniqueGenres"])
            .iter()
            .map(|g| normalize_text(g))
            .filter(|g| !g.is_empty())
            .collect(),
        streak: u32_field(obj, &["streak"]),
        last_streak_date: date_field(obj, &["lastStreakDate"]),
        non_consecutive_count: u32_field(obj, &["nonConsecutiveCount"]),
        echoes_given: u64_field(obj, &["echoesGiven"]),
        echoes_received: u64_field(obj, &["echoesReceived"]),
        echo_history: merge_echoes(
            field(obj, &["echoHistory"])
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(echo_from_value),
        ),
        followers: u64_field(obj, &["followers"]),
        following: string_set(obj, &["following"]),
        full_name: text_field(obj, &["fullName"]),
        username: text_field(obj, &["username"]),
        gender: text_field(obj, &["gender"]),
        birth_date: text_field(obj, &["birthDate"]),
        bio: text_field(obj, &["bio"]),
        avatar_id: text_field(obj, &["avatarId"]),
        avatar_url: text_field(obj, &["avatarUrl"]),
        avatar_data: text_field(obj, &["avatarData"]),
        last_share_reward_date: date_field(obj, &["lastShareRewardDate"]),
        invite_code: valid_code(text_field(obj, &["inviteCode"]).as_deref()),
        invited_by_code: valid_code(text_field(obj, &["invitedByCode"]).as_deref()),
        invite_claims_count: u64_field(obj, &["inviteClaimsCount"]),
        invite_rewards_earned: u64_field(obj, &["inviteRewardsEarned"]),
        invite_claimed_at: timestamp_field(obj, &["inviteClaimedAt"]),
        referral_accepted_keys: string_list(obj, &["referralAcceptedKeys"])
            .into_iter()
            .collect(),
    };
    enforce_invariants(&mut state);
    state
}

/// Re-establish the structural invariants of a state in place.
pub fn enforce_invariants(state: &mut ProgressState) {
    if state.streak == 0 || state.last_streak_date.is_none() {
        state.streak = 0;
        state.last_streak_date = None;
    }

    let mut seen = BTreeSet::new();
    let marks = &state.marks;
    state
        .featured_marks
        .retain(|m| marks.contains(m) && seen.insert(m.clone()));
    state.featured_marks.truncate(MAX_FEATURED_MARKS);

    while state.referral_accepted_keys.len() > MAX_REFERRAL_KEYS {
        state.referral_accepted_keys.shift_remove_index(0);
    }

    for entry in &state.journal_entries {
        state.active_days.insert(entry.date);
        if let Some(genre) = entry.genre.as_deref().map(normalize_text) {
            if !genre.is_empty() {
                state.unique_genres.insert(genre);
            }
        }
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name).filter(|v| !v.is_null()))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.floor() as u64)
        }),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(|f| {
            (f.is_finite() && f >= 0.0).then(|| f.floor() as u64)
        }),
        _ => None,
    }
}

fn u64_field(obj: &Map<String, Value>, names: &[&str]) -> u64 {
    field(obj, names).and_then(as_u64).unwrap_or(0)
}

fn u32_field(obj: &Map<String, Value>, names: &[&str]) -> u32 {
    u32::try_from(u64_field(obj, names)).unwrap_or(u32::MAX)
}

fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn text_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names).and_then(as_text)
}

fn date_field(obj: &Map<String, Value>, names: &[&str]) -> Option<DateKey> {
    field(obj, names)
        .and_then(Value::as_str)
        .and_then(DateKey::parse)
}

fn timestamp_field(obj: &Map<String, Value>, names: &[&str]) -> Option<NaiveDateTime> {
    let raw = field(obj, names)?.as_str()?.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

fn string_list(obj: &Map<String, Value>, names: &[&str]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    field(obj, names)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(as_text)
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

fn string_set(obj: &Map<String, Value>, names: &[&str]) -> BTreeSet<String> {
    string_list(obj, names).into_iter().collect()
}

fn entry_from_value(value: &Value) -> Option<JournalEntry> {
    let obj = value.as_object()?;
    let date = date_field(obj, &["date", "createdAt", "created_at"])?;
    let text = text_field(obj, &["text", "body"])?;
    let id = match field(obj, &["id"]) {
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => as_text(other).unwrap_or_default(),
        None => String::new(),
    };
    let subject_id = match field(obj, &["subjectId", "movieId", "subject_id"]) {
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => as_text(other).unwrap_or_default(),
        None => String::new(),
    };
    let rating = field(obj, &["rating"])
        .and_then(Value::as_f64)
        .filter(|r| r.is_finite() && (0.0..=5.0).contains(r))
        .map(|r| r as f32);
    Some(JournalEntry {
        id,
        date,
        subject_id,
        subject_title: text_field(obj, &["subjectTitle", "movieTitle", "subject_title"])
            .unwrap_or_default(),
        text,
        genre: text_field(obj, &["genre"]),
        rating,
        poster_ref: text_field(obj, &["posterRef", "posterPath", "poster_ref"]),
    })
}

fn echo_from_value(value: &Value) -> Option<EchoRecord> {
    let obj = value.as_object()?;
    let echo = EchoRecord {
        id: text_field(obj, &["id"]),
        entry_id: text_field(obj, &["entryId"]),
        title: text_field(obj, &["title"]).unwrap_or_default(),
        date: date_field(obj, &["date"])?,
    };
    // An echo with neither id nor title cannot be told apart from others.
    (!echo_fingerprint(&echo).starts_with("title:|")).then_some(echo)
}
