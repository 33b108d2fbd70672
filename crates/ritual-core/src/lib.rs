//! Progress model and the pure rules over it: normalization, merge, streaks,
//! XP and leagues, marks, referral rewards, and the local progress cache.

pub mod activity;
pub mod cache;
pub mod date;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod marks;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod referral;
pub mod ritual;
pub mod rules;
pub mod streak;

pub use cache::{CacheConfig, CacheWrite, ProgressCache};
pub use date::DateKey;
pub use error::{ConflictError, RuleError, ValidationError};
pub use ledger::{LeagueTable, LevelUp, LevelUpQueue, XpAward};
pub use marks::{Mark, MarkAction, MarkUnlock};
pub use merge::merge;
pub use model::{EchoRecord, JournalEntry, ProgressState};
pub use normalize::normalize;
pub use referral::{InviteCode, InviteDeviceGuard, InviteRegistry};
pub use ritual::{RitualDraft, RitualOutcome, commit_ritual};
pub use rules::RewardRules;
pub use streak::{Cadence, StreakAdvance};
