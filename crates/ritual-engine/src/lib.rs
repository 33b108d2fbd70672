//! Progress reconciliation and rewards engine.
//!
//! [`ProgressEngine`] owns the canonical [`ProgressState`](ritual_core::ProgressState)
//! for the signed-in identity. It hydrates from the local cache and the
//! remote service, applies every mutation locally first, and pushes changes
//! out best-effort. Remote channels that the deployment does not provide are
//! switched off for the session and the engine carries on local-only.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod moderation;
pub mod remote;
pub mod state_store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{
    ClaimOutcome, EngineBuilder, HydrationReport, Identity, LeagueStatus, ProfileEdit,
    ProgressEngine,
};
pub use error::{EngineError, EngineResult};
pub use events::Notification;
pub use moderation::{AllowAll, ModerationLimits, ModerationVerdict, Moderator};
pub use remote::{Channel, MemRemote, RemoteFailure, RemotePersistence};
pub use state_store::ProgressStateStore;
