//! Field-wise reconciliation of progress snapshots from several sources.
//!
//! Sources are stale in different dimensions, so nothing here is
//! last-write-wins on the whole object. The single intentional dependence on
//! input order is identity fields: later inputs win. Everything else is a
//! function of the set of inputs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use indexmap::IndexSet;

use crate::date::DateKey;
use crate::fingerprint::{echo_fingerprint, entry_fingerprint, is_placeholder_title};
use crate::model::{EchoRecord, JournalEntry, MAX_ECHO_HISTORY, ProgressState};
use crate::normalize::enforce_invariants;
use crate::referral::valid_code;

/// Merge snapshots. `None` inputs are skipped; returns `None` only when every
/// input is `None`.
pub fn merge(states: &[Option<ProgressState>]) -> Option<ProgressState> {
    let sources: Vec<&ProgressState> = states.iter().flatten().collect();
    if sources.is_empty() {
        return None;
    }

    let max_u64 = |f: fn(&ProgressState) -> u64| sources.iter().map(|s| f(s)).max().unwrap_or(0);
    let latest = |f: fn(&ProgressState) -> Option<DateKey>| sources.iter().filter_map(|s| f(s)).max();

    let (daily_dwell_xp, last_dwell_date) = dated_counter(&sources, |s| (s.daily_dwell_xp, s.last_dwell_date));
    let (streak, last_streak_date) =
        dated_counter(&sources, |s| (u64::from(s.streak), s.last_streak_date));

    let mut referral_accepted_keys = IndexSet::new();
    for source in &sources {
        referral_accepted_keys.extend(source.referral_accepted_keys.iter().cloned());
    }

    let mut merged = ProgressState {
        total_xp: max_u64(|s| s.total_xp),
        daily_dwell_xp,
        last_dwell_date,
        last_login_date: latest(|s| s.last_login_date),

        journal_entries: merge_entries(sources.iter().flat_map(|s| s.journal_entries.iter().cloned())),
        marks: sources.iter().flat_map(|s| s.marks.iter().cloned()).collect(),
        featured_marks: sources
            .iter()
            .rev()
            .find(|s| !s.featured_marks.is_empty())
            .map(|s| s.featured_marks.clone())
            .unwrap_or_default(),
        active_days: sources.iter().flat_map(|s| s.active_days.iter().copied()).collect(),
        unique_genres: sources.iter().flat_map(|s| s.unique_genres.iter().cloned()).collect(),

        streak: u32::try_from(streak).unwrap_or(u32::MAX),
        last_streak_date,
        non_consecutive_count: sources.iter().map(|s| s.non_consecutive_count).max().unwrap_or(0),

        echoes_given: max_u64(|s| s.echoes_given),
        echoes_received: max_u64(|s| s.echoes_received),
        echo_history: merge_echoes(sources.iter().flat_map(|s| s.echo_history.iter().cloned())),

        followers: max_u64(|s| s.followers),
        following: sources.iter().flat_map(|s| s.following.iter().cloned()).collect(),

        full_name: last_text(&sources, |s| s.full_name.as_deref()),
        username: last_text(&sources, |s| s.username.as_deref()),
        gender: last_text(&sources, |s| s.gender.as_deref()),
        birth_date: last_text(&sources, |s| s.birth_date.as_deref()),
        bio: last_text(&sources, |s| s.bio.as_deref()),
        avatar_id: last_text(&sources, |s| s.avatar_id.as_deref()),
        avatar_url: last_text(&sources, |s| s.avatar_url.as_deref()),
        avatar_data: last_text(&sources, |s| s.avatar_data.as_deref()),

        last_share_reward_date: latest(|s| s.last_share_reward_date),

        invite_code: sources.iter().rev().find_map(|s| valid_code(s.invite_code.as_deref())),
        invited_by_code: sources
            .iter()
            .rev()
            .find_map(|s| valid_code(s.invited_by_code.as_deref())),
        invite_claims_count: max_u64(|s| s.invite_claims_count),
        invite_rewards_earned: max_u64(|s| s.invite_rewards_earned),
        invite_claimed_at: sources.iter().rev().find_map(|s| s.invite_claimed_at),
        referral_accepted_keys,
    };
    enforce_invariants(&mut merged);
    Some(merged)
}

/// Value from the source with the most recent date. Ties and undated inputs
/// fall back to the maximum value.
fn dated_counter(
    sources: &[&ProgressState],
    pick: impl Fn(&ProgressState) -> (u64, Option<DateKey>),
) -> (u64, Option<DateKey>) {
    let picked: Vec<_> = sources.iter().map(|s| pick(s)).collect();
    let latest = picked.iter().filter_map(|(_, date)| *date).max();
    let value = picked
        .iter()
        .filter(|(_, date)| latest.is_none() || *date == latest)
        .map(|(value, _)| *value)
        .max()
        .unwrap_or(0);
    (value, latest)
}

fn last_text(sources: &[&ProgressState], pick: impl Fn(&ProgressState) -> Option<&str>) -> Option<String> {
    sources
        .iter()
        .rev()
        .filter_map(|s| pick(s))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Deduplicate entries by fingerprint and sort newest first (id descending on
/// the same date).
pub fn merge_entries(entries: impl IntoIterator<Item = JournalEntry>) -> Vec<JournalEntry> {
    let mut by_print: BTreeMap<String, JournalEntry> = BTreeMap::new();
    for entry in entries {
        let key = entry_fingerprint(&entry);
        match by_print.remove(&key) {
            Some(existing) => {
                by_print.insert(key, combine_entries(existing, entry));
            }
            None => {
                by_print.insert(key, entry);
            }
        }
    }
    let mut merged: Vec<_> = by_print.into_values().collect();
    merged.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
    merged
}

/// Combine two entries with the same fingerprint. Symmetric in its arguments.
fn combine_entries(a: JournalEntry, b: JournalEntry) -> JournalEntry {
    let text = match a.text.chars().count().cmp(&b.text.chars().count()) {
        Ordering::Greater => a.text,
        Ordering::Less => b.text,
        Ordering::Equal => a.text.min(b.text),
    };
    let subject_title = match (is_placeholder_title(&a.subject_title), is_placeholder_title(&b.subject_title)) {
        (false, true) => a.subject_title,
        (true, false) => b.subject_title,
        _ => a.subject_title.min(b.subject_title),
    };
    let rating = match (a.rating, b.rating) {
        (Some(x), Some(y)) => Some(if x.total_cmp(&y).is_ge() { x } else { y }),
        (x, y) => x.or(y),
    };
    JournalEntry {
        id: prefer_non_empty(a.id, b.id),
        date: a.date,
        subject_id: prefer_non_empty(a.subject_id, b.subject_id),
        subject_title,
        text,
        genre: min_present(a.genre, b.genre),
        rating,
        poster_ref: min_present(a.poster_ref, b.poster_ref),
    }
}

fn prefer_non_empty(a: String, b: String) -> String {
    match (a.trim().is_empty(), b.trim().is_empty()) {
        (false, true) => a,
        (true, false) => b,
        _ => a.min(b),
    }
}

fn min_present(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Deduplicate echoes and keep the most recent [`MAX_ECHO_HISTORY`].
pub fn merge_echoes(echoes: impl IntoIterator<Item = EchoRecord>) -> Vec<EchoRecord> {
    let mut by_print: BTreeMap<String, EchoRecord> = BTreeMap::new();
    for echo in echoes {
        let key = echo_fingerprint(&echo);
        let merged = match by_print.remove(&key) {
            Some(existing) => EchoRecord {
                id: min_present(existing.id, echo.id),
                entry_id: min_present(existing.entry_id, echo.entry_id),
                title: prefer_non_empty(existing.title, echo.title),
                date: existing.date.max(echo.date),
            },
            None => echo,
        };
        by_print.insert(key, merged);
    }
    let mut merged: Vec<_> = by_print.into_iter().collect();
    merged.sort_by(|(ka, a), (kb, b)| b.date.cmp(&a.date).then_with(|| ka.cmp(kb)));
    merged.truncate(MAX_ECHO_HISTORY);
    merged.into_iter().map(|(_, echo)| echo).collect()
}
