use std::fmt;

/// Errors returned by [MessageGroupStore](crate::MessageGroupStore) and
/// [MessageGroup](crate::MessageGroup) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The correlation key failed [CorrelationKey::is_valid](crate::CorrelationKey::is_valid).
    #[error("invalid correlation key: {key}")]
    InvalidKey { key: String },

    /// A message was requested from a group without messages.
    #[error("message group {key} is empty")]
    EmptyGroup { key: String },

    /// One or more expiry callbacks failed during a sweep.
    #[error(transparent)]
    Sweep(#[from] SweepError),
}

impl StoreError {
    pub(crate) fn invalid_key(key: &impl fmt::Debug) -> Self {
        Self::InvalidKey {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn empty_group(key: &impl fmt::Debug) -> Self {
        Self::EmptyGroup {
            key: format!("{key:?}"),
        }
    }
}

/// The failures collected by a sweep that ran to completion.
///
/// Groups whose callbacks failed are still removed, so `expired` counts
/// them as well.
#[derive(Debug, thiserror::Error)]
#[error("{} expiry callback(s) failed while expiring {expired} group(s)", .failures.len())]
pub struct SweepError {
    pub expired: usize,
    pub failures: Vec<CallbackFailure>,
}

/// A single callback error raised while expiring a group.
#[derive(Debug, thiserror::Error)]
#[error("expiry callback #{callback_index} failed for group {key}: {error:#}")]
pub struct CallbackFailure {
    /// Debug rendering of the group's correlation key.
    pub key: String,
    /// Position of the callback in registration order.
    pub callback_index: usize,
    pub error: eyre::Report,
}
