use thiserror::Error;

use crate::date::DateKey;

/// Malformed input. Nothing was mutated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("entry text is empty")]
    EmptyEntry,
    #[error("entry text is {chars} characters, limit is {max}")]
    EntryTooLong { chars: usize, max: usize },
    #[error("entry has no subject")]
    MissingSubject,
    #[error("rating {0} is outside 0..=5")]
    InvalidRating(f32),
    #[error("invite code '{0}' is not valid")]
    InvalidInviteCode(String),
    #[error("moderation rejected entry ({reason_code})")]
    Moderation {
        reason_code: String,
        message: Option<String>,
    },
    #[error("unknown mark '{0}'")]
    UnknownMark(String),
    #[error("mark '{0}' is not unlocked")]
    MarkNotUnlocked(String),
    #[error("{count} featured marks requested, limit is {max}")]
    TooManyFeatured { count: usize, max: usize },
    #[error("amount must be greater than zero")]
    ZeroAmount,
}

/// Request conflicts with existing state. Nothing was mutated; retrying is a no-op.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("'{subject_id}' already journaled on {date}")]
    DuplicateEntryToday { subject_id: String, date: DateKey },
    #[error("account already claimed an invite")]
    AlreadyClaimedOnAccount,
    #[error("cannot claim own invite code")]
    SelfInvite,
    #[error("device reached {limit} invite claims today")]
    DeviceLimit { limit: u32 },
    #[error("invite code already claimed on this device")]
    DeviceCodeReuse,
    #[error("invite code not found")]
    InviteNotFound,
    #[error("claim for this code is already in flight")]
    ClaimInFlight,
    #[error("share reward already granted on {0}")]
    ShareAlreadyRewarded(DateKey),
    #[error("remote refused the row (code {code})")]
    RowRejected { code: String },
}

/// Union of rule failures returned by state transitions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

impl ValidationError {
    pub fn reason_code(&self) -> &str {
        match self {
            ValidationError::EmptyEntry => "entry_empty",
            ValidationError::EntryTooLong { .. } => "entry_too_long",
            ValidationError::MissingSubject => "entry_missing_subject",
            ValidationError::InvalidRating(_) => "entry_invalid_rating",
            ValidationError::InvalidInviteCode(_) => "invite_invalid",
            ValidationError::Moderation { reason_code, .. } => reason_code,
            ValidationError::UnknownMark(_) => "mark_unknown",
            ValidationError::MarkNotUnlocked(_) => "mark_locked",
            ValidationError::TooManyFeatured { .. } => "featured_too_many",
            ValidationError::ZeroAmount => "amount_zero",
        }
    }
}

impl ConflictError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ConflictError::DuplicateEntryToday { .. } => "entry_duplicate_today",
            ConflictError::AlreadyClaimedOnAccount => "invite_already_claimed",
            ConflictError::SelfInvite => "invite_self",
            ConflictError::DeviceLimit { .. } => "invite_device_limit",
            ConflictError::DeviceCodeReuse => "invite_device_reuse",
            ConflictError::InviteNotFound => "invite_not_found",
            ConflictError::ClaimInFlight => "invite_in_flight",
            ConflictError::ShareAlreadyRewarded(_) => "share_already_rewarded",
            ConflictError::RowRejected { .. } => "remote_rejected",
        }
    }
}

impl RuleError {
    pub fn reason_code(&self) -> &str {
        match self {
            RuleError::Validation(err) => err.reason_code(),
            RuleError::Conflict(err) => err.reason_code(),
        }
    }

    /// Whether a pending invite code that produced this error should be
    /// dropped. Deterministic rejections clear it; the per-day device limit
    /// and in-flight collisions may succeed later, so they keep it.
    pub fn clears_pending_invite(&self) -> bool {
        match self {
            RuleError::Validation(ValidationError::InvalidInviteCode(_)) => true,
            RuleError::Validation(_) => false,
            RuleError::Conflict(err) => matches!(
                err,
                ConflictError::AlreadyClaimedOnAccount
                    | ConflictError::SelfInvite
                    | ConflictError::DeviceCodeReuse
                    | ConflictError::InviteNotFound
            ),
        }
    }
}
