//! Backing storage for message groups.
//!
//! A [GroupStorage] is an abstract key-value medium holding one
//! [MessageGroup] per correlation key. The store layers callbacks, expiry
//! policies and key validation on top of it.

use crate::{
    group::MessageGroup,
    message::Message,
    types::{CorrelationKey, Timestamp},
};
use dashmap::{DashMap, mapref::entry::Entry};

/// Key-value storage of message groups.
///
/// Implementations must make every mutation of one key mutually
/// exclusive. Operations on different keys should not block each other.
pub trait GroupStorage<K, T>: Send + Sync
where
    K: CorrelationKey,
{
    /// Appends `message` to the group of `key`, creating the group when
    /// absent. Returns true if a new group was created.
    fn append(&self, key: K, message: Message<T>, now: Timestamp) -> bool;

    /// Returns a detached copy of the group, if any.
    fn get(&self, key: &K) -> Option<MessageGroup<K, T>>;

    /// Persists the completion flag of a group previously obtained from
    /// [get](Self::get).
    fn mark(&self, group: &MessageGroup<K, T>);

    /// Removes one message from the group of `key`. Returns true if it was
    /// found.
    fn remove_message(&self, key: &K, message: &Message<T>, now: Timestamp) -> bool;

    /// Removes the group of `key` and returns it.
    fn remove(&self, key: &K) -> Option<MessageGroup<K, T>>;

    /// Removes the messages of an expired snapshot from the stored group.
    ///
    /// Messages added after the snapshot was taken stay in the store. The
    /// group itself is removed once nothing is left. Returns the number of
    /// messages kept.
    fn remove_expired(&self, expired: &MessageGroup<K, T>) -> usize;

    /// A point-in-time copy of the stored keys.
    fn keys(&self) -> Vec<K>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Total number of stored messages.
    fn message_count(&self) -> usize {
        self.keys()
            .iter()
            .filter_map(|key| self.get(key))
            .map(|group| group.size())
            .sum()
    }
}

/// In-memory storage sharded by key hash.
///
/// Each shard carries its own lock, so mutations on keys in different
/// shards run in parallel and mutations on the same key are serialized.
///
/// Reads are copy-on-read: [get](GroupStorage::get) clones the group
/// (messages are reference counted, so this copies pointers only).
/// [mark](GroupStorage::mark) writes the completion flag of the snapshot
/// back. Membership only changes under the key lock, through `append`,
/// `remove_message`, `remove` and `remove_expired`, so a stale snapshot
/// cannot drop messages added after it was taken.
#[derive(Debug)]
pub struct MemoryStorage<K, T>
where
    K: CorrelationKey,
{
    groups: DashMap<K, MessageGroup<K, T>>,
}

impl<K, T> MemoryStorage<K, T>
where
    K: CorrelationKey,
{
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Creates a storage with a custom shard count. The count is rounded
    /// up to a power of two no smaller than 2.
    pub fn with_shard_amount(shard_amount: usize) -> Self {
        let shard_amount = shard_amount.max(2).next_power_of_two();
        Self {
            groups: DashMap::with_shard_amount(shard_amount),
        }
    }
}

impl<K, T> Default for MemoryStorage<K, T>
where
    K: CorrelationKey,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> GroupStorage<K, T> for MemoryStorage<K, T>
where
    K: CorrelationKey,
    T: Send + Sync,
{
    fn append(&self, key: K, message: Message<T>, now: Timestamp) -> bool {
        match self.groups.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().add(message, now);
                false
            }
            Entry::Vacant(entry) => {
                let mut group = MessageGroup::new(entry.key().clone(), now);
                group.add(message, now);
                entry.insert(group);
                true
            }
        }
    }

    fn get(&self, key: &K) -> Option<MessageGroup<K, T>> {
        self.groups.get(key).map(|group| group.value().clone())
    }

    fn mark(&self, group: &MessageGroup<K, T>) {
        if let Some(mut stored) = self.groups.get_mut(group.correlation_key()) {
            stored.set_complete(group.is_complete());
        }
    }

    fn remove_message(&self, key: &K, message: &Message<T>, now: Timestamp) -> bool {
        self.groups
            .get_mut(key)
            .is_some_and(|mut group| group.remove(message, now))
    }

    fn remove(&self, key: &K) -> Option<MessageGroup<K, T>> {
        self.groups.remove(key).map(|(_key, group)| group)
    }

    fn remove_expired(&self, expired: &MessageGroup<K, T>) -> usize {
        let Entry::Occupied(mut entry) = self.groups.entry(expired.correlation_key().clone())
        else {
            return 0;
        };

        entry.get_mut().discard_seen(expired);
        let kept = entry.get().size();
        if kept == 0 {
            entry.remove();
        }
        kept
    }

    fn keys(&self) -> Vec<K> {
        self.groups.iter().map(|entry| entry.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.groups.len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.groups.contains_key(key)
    }

    fn message_count(&self) -> usize {
        self.groups.iter().map(|entry| entry.value().size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: i64) -> Timestamp {
        Timestamp::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn test_append_creates_then_extends() {
        let storage = MemoryStorage::new();
        assert!(storage.append("k", Message::new(1), ts(0)));
        assert!(!storage.append("k", Message::new(2), ts(5)));

        let group = storage.get(&"k").unwrap();
        assert_eq!(group.size(), 2);
        assert_eq!(group.last_modified(), ts(5));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let storage = MemoryStorage::new();
        storage.append(1u64, Message::new("a"), ts(0));

        let mut snapshot = storage.get(&1).unwrap();
        snapshot.add(Message::new("b"), ts(1));
        assert_eq!(storage.get(&1).unwrap().size(), 1);
    }

    #[test]
    fn test_mark_writes_completion_back() {
        let storage = MemoryStorage::new();
        storage.append(1u64, Message::new("a"), ts(0));

        let mut snapshot = storage.get(&1).unwrap();
        storage.append(1u64, Message::new("b"), ts(1));
        snapshot.mark_complete();
        storage.mark(&snapshot);

        let stored = storage.get(&1).unwrap();
        assert!(stored.is_complete());
        assert_eq!(stored.size(), 2);
    }

    #[test]
    fn test_mark_after_remove_is_noop() {
        let storage = MemoryStorage::new();
        storage.append(1u64, Message::new("a"), ts(0));
        let snapshot = storage.get(&1).unwrap();
        storage.remove(&1);
        storage.mark(&snapshot);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_remove_expired_keeps_later_messages() {
        let storage = MemoryStorage::new();
        storage.append(1u64, Message::new("early"), ts(0));
        let expired = storage.get(&1).unwrap();

        storage.append(1u64, Message::new("late"), ts(3));
        assert_eq!(storage.remove_expired(&expired), 1);

        let kept = storage.get(&1).unwrap();
        assert_eq!(*kept.one().unwrap().payload(), "late");
        assert_eq!(kept.last_modified(), ts(3));

        let expired = kept;
        assert_eq!(storage.remove_expired(&expired), 0);
        assert!(storage.is_empty());
        assert_eq!(storage.remove_expired(&expired), 0);
    }

    #[test]
    fn test_remove_expired_spares_recreated_group() {
        let storage = MemoryStorage::new();
        storage.append(1u64, Message::new("old"), ts(0));
        let expired = storage.get(&1).unwrap();

        storage.remove(&1);
        storage.append(1u64, Message::new("new"), ts(1));
        assert_eq!(storage.remove_expired(&expired), 1);
        assert_eq!(*storage.get(&1).unwrap().one().unwrap().payload(), "new");
    }

    #[test]
    fn test_remove_message_under_key_lock() {
        let storage = MemoryStorage::new();
        let first = Message::new("a");
        storage.append(1u64, first.clone(), ts(0));
        storage.append(1u64, Message::new("b"), ts(1));

        assert!(storage.remove_message(&1, &first, ts(2)));
        assert!(!storage.remove_message(&1, &first, ts(3)));
        assert!(!storage.remove_message(&2, &first, ts(3)));

        let group = storage.get(&1).unwrap();
        assert_eq!(*group.one().unwrap().payload(), "b");
        assert_eq!(group.last_modified(), ts(2));
    }

    #[test]
    fn test_size_queries_do_not_need_snapshots() {
        let storage = MemoryStorage::new();
        storage.append("a", Message::new(()), ts(0));
        storage.append("a", Message::new(()), ts(0));
        storage.append("b", Message::new(()), ts(0));

        assert!(storage.contains_key(&"a"));
        assert!(!storage.contains_key(&"c"));
        assert_eq!(storage.message_count(), 3);
    }

    #[test]
    fn test_odd_shard_amount_is_accepted() {
        let storage = MemoryStorage::with_shard_amount(3);
        for key in 0u64..16 {
            storage.append(key, Message::new(()), ts(0));
        }
        assert_eq!(storage.len(), 16);
        assert_eq!(storage.keys().len(), 16);
    }
}
