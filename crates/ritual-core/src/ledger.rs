//! XP accumulation and league progression.
//!
//! Leagues are fixed-width XP bands. A single award can cross several bands;
//! each crossing becomes its own [`LevelUp`] so the presentation layer can
//! celebrate them one at a time through [`LevelUpQueue`].

use std::collections::VecDeque;

use serde::Serialize;

use crate::model::ProgressState;

pub const LEAGUES: &[&str] = &[
    "Bronze", "Silver", "Gold", "Platinum", "Emerald", "Sapphire", "Ruby", "Diamond", "Master",
    "Legend",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeagueTable {
    threshold: u64,
}

impl LeagueTable {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn last_index(&self) -> usize {
        LEAGUES.len() - 1
    }

    pub fn index_of(&self, xp: u64) -> usize {
        usize::try_from(xp / self.threshold)
            .unwrap_or(usize::MAX)
            .min(self.last_index())
    }

    pub fn name(&self, index: usize) -> &'static str {
        LEAGUES[index.min(self.last_index())]
    }

    /// XP at which league `index` starts.
    pub fn floor(&self, index: usize) -> u64 {
        (index.min(self.last_index()) as u64).saturating_mul(self.threshold)
    }

    /// Percent through the current league, clamped to `[0, 100]`.
    pub fn progress_percent(&self, xp: u64) -> f64 {
        let floor = self.floor(self.index_of(xp));
        let pct = xp.saturating_sub(floor) as f64 / self.threshold as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub league_index: usize,
    pub league: &'static str,
    pub total_xp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpAward {
    pub previous: u64,
    pub total: u64,
    /// Crossed leagues in ascending order.
    pub level_ups: Vec<LevelUp>,
}

impl XpAward {
    pub fn granted(&self) -> u64 {
        self.total - self.previous
    }
}

/// Add `amount` to the state's XP and report every league crossed.
pub fn award_xp(state: &mut ProgressState, amount: u64, table: &LeagueTable) -> XpAward {
    let previous = state.total_xp;
    let total = previous.saturating_add(amount);
    state.total_xp = total;

    let from = table.index_of(previous);
    let to = table.index_of(total);
    let level_ups = (from + 1..=to)
        .map(|league_index| LevelUp {
            league_index,
            league: table.name(league_index),
            total_xp: total,
        })
        .collect();
    XpAward {
        previous,
        total,
        level_ups,
    }
}

/// FIFO of pending level-up celebrations. The head stays put until acknowledged.
#[derive(Debug, Clone, Default)]
pub struct LevelUpQueue {
    pending: VecDeque<LevelUp>,
}

impl LevelUpQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, level_ups: impl IntoIterator<Item = LevelUp>) {
        self.pending.extend(level_ups);
    }

    pub fn peek(&self) -> Option<&LevelUp> {
        self.pending.front()
    }

    pub fn acknowledge(&mut self) -> Option<LevelUp> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn league_index_clamps_to_last() {
        let table = LeagueTable::new(500);
        assert_eq!(table.index_of(0), 0);
        assert_eq!(table.index_of(499), 0);
        assert_eq!(table.index_of(500), 1);
        assert_eq!(table.index_of(1_000_000), LEAGUES.len() - 1);
        assert_eq!(table.name(99), "Legend");
    }

    #[test]
    fn progress_within_league() {
        let table = LeagueTable::new(500);
        assert_eq!(table.progress_percent(0), 0.0);
        assert_eq!(table.progress_percent(750), 50.0);
        assert_eq!(table.progress_percent(u64::MAX), 100.0);
    }

    #[test]
    fn multi_league_jump_enqueues_every_crossing() {
        let table = LeagueTable::new(500);
        let mut state = ProgressState::new();
        state.total_xp = 480;
        let award = award_xp(&mut state, 1_100, &table);
        assert_eq!(award.total, 1_580);
        assert_eq!(award.granted(), 1_100);
        let indices: Vec<_> = award.level_ups.iter().map(|l| l.league_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);

        let mut queue = LevelUpQueue::new();
        queue.extend(award.level_ups);
        assert_eq!(queue.peek().map(|l| l.league), Some("Silver"));
        assert_eq!(queue.peek().map(|l| l.league), Some("Silver"));
        assert_eq!(queue.acknowledge().map(|l| l.league), Some("Silver"));
        assert_eq!(queue.acknowledge().map(|l| l.league), Some("Gold"));
        assert_eq!(queue.acknowledge().map(|l| l.league), Some("Platinum"));
        assert!(queue.acknowledge().is_none());
    }

    #[test]
    fn award_within_league_queues_nothing() {
        let table = LeagueTable::new(500);
        let mut state = ProgressState::new();
        let award = award_xp(&mut state, 20, &table);
        assert!(award.level_ups.is_empty());
        assert_eq!(state.total_xp, 20);
    }
}
