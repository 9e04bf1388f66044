//! Policies deciding which groups an expiry sweep selects.

use crate::{
    group::MessageGroup,
    types::{CorrelationKey, Timestamp},
};
use serde::Deserialize;

/// Decides whether a group is expired at `now`.
pub trait ExpiryPolicy<K, T>: Send + Sync
where
    K: CorrelationKey,
{
    fn is_expired(&self, group: &MessageGroup<K, T>, timeout_millis: i64, now: Timestamp) -> bool;
}

/// Returns true when `now - last_modified >= timeout_millis`.
///
/// The comparison is taken literally. A zero or negative timeout selects
/// every group modified at or before `now`, which makes
/// `expire_message_groups(-1)` an "expire everything" request.
pub fn is_expired<K, T>(group: &MessageGroup<K, T>, timeout_millis: i64, now: Timestamp) -> bool
where
    K: CorrelationKey,
{
    let age = now.signed_duration_since(group.last_modified());
    age.num_milliseconds() >= timeout_millis
}

/// Time based expiry. This is the store's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutPolicy;

impl<K, T> ExpiryPolicy<K, T> for TimeoutPolicy
where
    K: CorrelationKey,
{
    fn is_expired(&self, group: &MessageGroup<K, T>, timeout_millis: i64, now: Timestamp) -> bool {
        is_expired(group, timeout_millis, now)
    }
}

/// Selects groups that were marked complete. The timeout is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionPolicy;

impl<K, T> ExpiryPolicy<K, T> for CompletionPolicy
where
    K: CorrelationKey,
{
    fn is_expired(&self, group: &MessageGroup<K, T>, _timeout_millis: i64, _now: Timestamp) -> bool {
        group.is_complete()
    }
}

/// Selects groups holding at least `max` messages. The timeout is ignored.
#[derive(Debug, Clone, Copy)]
pub struct SizePolicy {
    pub max: usize,
}

impl<K, T> ExpiryPolicy<K, T> for SizePolicy
where
    K: CorrelationKey,
{
    fn is_expired(&self, group: &MessageGroup<K, T>, _timeout_millis: i64, _now: Timestamp) -> bool {
        group.size() >= self.max
    }
}

/// Policy selection as it appears in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Timeout,
    Completion,
    Size { max: usize },
}

impl<K, T> ExpiryPolicy<K, T> for PolicyKind
where
    K: CorrelationKey,
{
    fn is_expired(&self, group: &MessageGroup<K, T>, timeout_millis: i64, now: Timestamp) -> bool {
        match *self {
            PolicyKind::Timeout => TimeoutPolicy.is_expired(group, timeout_millis, now),
            PolicyKind::Completion => CompletionPolicy.is_expired(group, timeout_millis, now),
            PolicyKind::Size { max } => SizePolicy { max }.is_expired(group, timeout_millis, now),
        }
    }
}
