use crate::{group::MessageGroup, types::CorrelationKey};
use eyre::Result;
use std::sync::Arc;

/// Notified with a group when the store expires it.
///
/// Callbacks run synchronously inside
/// [expire_message_groups](crate::MessageGroupStore::expire_message_groups)
/// and receive a read-only view. Removing the group afterwards is the
/// store's job.
pub trait MessageGroupCallback<K, T>: Send + Sync
where
    K: CorrelationKey,
{
    fn execute(&self, group: &MessageGroup<K, T>) -> Result<()>;
}

impl<K, T, F> MessageGroupCallback<K, T> for F
where
    K: CorrelationKey,
    F: Fn(&MessageGroup<K, T>) -> Result<()> + Send + Sync,
{
    fn execute(&self, group: &MessageGroup<K, T>) -> Result<()> {
        self(group)
    }
}

/// A shared handle to a registered callback.
pub type SharedCallback<K, T> = Arc<dyn MessageGroupCallback<K, T>>;
