//! Tunable reward constants shared by the ledger, the ritual pipeline and referrals.

/// Reward constants. Every XP amount the engine grants comes from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRules {
    /// XP for any accepted journal entry.
    pub entry_xp: u64,
    /// Extra XP when the entry is exactly `exact_length` characters.
    pub exact_length_bonus: u64,
    pub exact_length: usize,
    pub max_entry_chars: usize,
    /// Streak length at which `streak_multiplier_percent` applies to the whole award.
    pub streak_multiplier_threshold: u32,
    pub streak_multiplier_percent: u64,
    /// XP per league.
    pub league_threshold: u64,
    pub dwell_daily_cap: u64,
    pub share_reward_xp: u64,
    pub invitee_reward_xp: u64,
    pub inviter_reward_xp: u64,
}

impl Default for RewardRules {
    fn default() -> Self {
        Self {
            entry_xp: 20,
            exact_length_bonus: 30,
            exact_length: 180,
            max_entry_chars: 180,
            streak_multiplier_threshold: 5,
            streak_multiplier_percent: 150,
            league_threshold: 500,
            dwell_daily_cap: 20,
            share_reward_xp: 15,
            invitee_reward_xp: 100,
            inviter_reward_xp: 150,
        }
    }
}

impl RewardRules {
    /// XP for one entry of `chars` visible characters at streak `streak`
    /// (the streak after today's advance). Rounded down.
    pub fn entry_award(&self, chars: usize, streak: u32) -> u64 {
        let mut award = self.entry_xp;
        if chars == self.exact_length {
            award += self.exact_length_bonus;
        }
        if streak >= self.streak_multiplier_threshold {
            award = award * self.streak_multiplier_percent / 100;
        }
        award
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_covers_bonus() {
        let rules = RewardRules::default();
        assert_eq!(rules.entry_award(42, 1), 20);
        assert_eq!(rules.entry_award(180, 1), 50);
        assert_eq!(rules.entry_award(42, 5), 30);
        assert_eq!(rules.entry_award(180, 9), 75);
    }
}
