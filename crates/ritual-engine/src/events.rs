use ritual_core::streak::Cadence;
use ritual_core::{MarkUnlock, StreakAdvance};
use serde::Serialize;

use crate::remote::Channel;

/// One-shot events for the presentation layer, drained in order.
/// Level-ups are delivered separately through the acknowledgement queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Notification {
    StreakAdvanced { streak: u32, cadence: Cadence },
    StreakMilestone { streak: u32 },
    MarkUnlocked(MarkUnlock),
    InviteAccepted { claimant: String, xp: u64 },
    /// A remote write failed transiently; local state is unaffected.
    SyncAdvisory { channel: Channel, message: String },
}

impl Notification {
    pub(crate) fn from_streak(advance: &StreakAdvance) -> Vec<Notification> {
        let mut out = vec![Notification::StreakAdvanced {
            streak: advance.current,
            cadence: advance.cadence,
        }];
        out.extend(
            advance
                .milestone
                .map(|streak| Notification::StreakMilestone { streak }),
        );
        out
    }
}
