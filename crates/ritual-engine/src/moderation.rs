//! Content moderation seam. Wordlists and classifiers live outside the engine.

use ritual_core::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationLimits {
    pub max_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModerationVerdict {
    pub ok: bool,
    pub reason_code: Option<String>,
    pub message: Option<String>,
}

impl ModerationVerdict {
    pub fn allow() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn reject(reason_code: impl Into<String>, message: Option<String>) -> Self {
        Self {
            ok: false,
            reason_code: Some(reason_code.into()),
            message,
        }
    }

    pub(crate) fn into_result(self) -> Result<(), ValidationError> {
        if self.ok {
            return Ok(());
        }
        Err(ValidationError::Moderation {
            reason_code: self.reason_code.unwrap_or_else(|| "moderation_rejected".into()),
            message: self.message,
        })
    }
}

pub trait Moderator: Send + Sync {
    fn moderate(&self, text: &str, limits: &ModerationLimits) -> ModerationVerdict;
}

impl<F> Moderator for F
where
    F: Fn(&str, &ModerationLimits) -> ModerationVerdict + Send + Sync,
{
    fn moderate(&self, text: &str, limits: &ModerationLimits) -> ModerationVerdict {
        self(text, limits)
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Moderator for AllowAll {
    fn moderate(&self, _text: &str, _limits: &ModerationLimits) -> ModerationVerdict {
        ModerationVerdict::allow()
    }
}
