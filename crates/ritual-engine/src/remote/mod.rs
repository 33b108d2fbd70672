//! Remote persistence seam and failure classification.

mod channel;
mod mem;
mod traits;

pub use channel::{Channel, ChannelState, FailureKind, RemoteFailure, RemoteResult, classify};
pub use mem::MemRemote;
pub use traits::{ClaimReceipt, ReferralAcceptance, RemotePersistence};
