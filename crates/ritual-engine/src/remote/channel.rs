use std::collections::BTreeSet;
use std::fmt;

use ritual_core::ConflictError;
use serde::Serialize;

/// Independently degradable slices of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Profile,
    Entries,
    Follows,
    Invites,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Profile, Channel::Entries, Channel::Follows, Channel::Invites];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Profile => "profile",
            Channel::Entries => "entries",
            Channel::Follows => "follows",
            Channel::Invites => "invites",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error as reported by the remote service. Plain data; see [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote failure (code={code:?}, status={status:?}): {message}")]
pub struct RemoteFailure {
    pub code: Option<String>,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(code: Option<&str>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            status,
            message: message.into(),
        }
    }

    /// Missing table or policy.
    pub fn missing_relation(message: impl Into<String>) -> Self {
        Self::new(Some("42P01"), Some(404), message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(None, Some(503), message)
    }

    /// Deterministic claim rejection from the invite RPC.
    pub fn rejected(code: &str) -> Self {
        Self::new(Some(code), Some(409), code.replace('_', " "))
    }
}

pub type RemoteResult<T> = Result<T, RemoteFailure>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Feature absent or forbidden for this deployment. Never retried.
    Capability,
    /// Network trouble, rate limiting, server errors.
    Transient,
    /// The service understood the request and refused it.
    Rejected(ConflictError),
}

const CAPABILITY_CODES: &[&str] = &["42P01", "42501", "42883", "PGRST202", "PGRST204", "PGRST205"];
const CAPABILITY_MESSAGES: &[&str] = &["does not exist", "permission denied", "schema cache"];

pub fn classify(failure: &RemoteFailure) -> FailureKind {
    if let Some(code) = failure.code.as_deref() {
        if CAPABILITY_CODES.contains(&code) {
            return FailureKind::Capability;
        }
        if let Some(conflict) = claim_rejection(code).or_else(|| row_rejection(code)) {
            return FailureKind::Rejected(conflict);
        }
    }
    let message = failure.message.to_lowercase();
    if CAPABILITY_MESSAGES.iter().any(|m| message.contains(m)) {
        return FailureKind::Capability;
    }
    FailureKind::Transient
}

fn claim_rejection(code: &str) -> Option<ConflictError> {
    match code {
        "invite_not_found" => Some(ConflictError::InviteNotFound),
        "invite_self" => Some(ConflictError::SelfInvite),
        "invite_already_claimed" => Some(ConflictError::AlreadyClaimedOnAccount),
        "invite_device_reuse" => Some(ConflictError::DeviceCodeReuse),
        _ => None,
    }
}

/// SQLSTATE classes 22 (data exception) and 23 (integrity constraint): the
/// row itself is unacceptable and resending it cannot help.
fn row_rejection(code: &str) -> Option<ConflictError> {
    let deterministic = code.len() == 5 && (code.starts_with("22") || code.starts_with("23"));
    deterministic.then(|| ConflictError::RowRejected { code: code.to_string() })
}

/// Channels proven absent for the current session.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    disabled: BTreeSet<Channel>,
}

impl ChannelState {
    pub fn is_enabled(&self, channel: Channel) -> bool {
        !self.disabled.contains(&channel)
    }

    /// Returns true the first time a channel is disabled.
    pub fn disable(&mut self, channel: Channel) -> bool {
        self.disabled.insert(channel)
    }

    pub fn disabled(&self) -> impl Iterator<Item = Channel> + '_ {
        self.disabled.iter().copied()
    }
}
