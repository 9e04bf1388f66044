use crate::{
    callback::{MessageGroupCallback, SharedCallback},
    clock::{Clock, SystemClock},
    config::StoreConfig,
    error::{CallbackFailure, StoreError, SweepError},
    group::MessageGroup,
    message::Message,
    policy::{ExpiryPolicy, TimeoutPolicy},
    storage::{GroupStorage, MemoryStorage},
    types::CorrelationKey,
};
use eyre::eyre;
use parking_lot::RwLock;
use std::{
    fmt,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    vec,
};
use tracing::{debug, info, trace, warn};

/// Outcome of a sweep that finished without callback failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of groups the policy was evaluated on.
    pub inspected: usize,
    /// Number of groups handed to the callbacks and removed.
    pub expired: usize,
}

/// A correlation-keyed store of message groups.
///
/// Messages added under the same key are aggregated into one
/// [MessageGroup]. Expiry sweeps select groups through an
/// [ExpiryPolicy], run every registered [MessageGroupCallback] on each
/// selected group in registration order and then remove it.
///
/// Groups are read as snapshots. Per-key exclusion is delegated to the
/// [GroupStorage]; no lock is held across iteration or callbacks.
pub struct MessageGroupStore<K, T, S = MemoryStorage<K, T>>
where
    K: CorrelationKey,
    T: Send + Sync + 'static,
    S: GroupStorage<K, T>,
{
    storage: S,
    expiry_callbacks: RwLock<Arc<Vec<SharedCallback<K, T>>>>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn ExpiryPolicy<K, T>>,
}

impl<K, T> MessageGroupStore<K, T>
where
    K: CorrelationKey,
    T: Send + Sync + 'static,
{
    /// An in-memory store using the system clock and time based expiry.
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::new())
    }

    /// An in-memory store set up from `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        let storage = match config.shard_amount {
            Some(shard_amount) => MemoryStorage::with_shard_amount(shard_amount),
            None => MemoryStorage::new(),
        };
        Self::with_storage(storage).with_policy(config.policy)
    }
}

impl<K, T> Default for MessageGroupStore<K, T>
where
    K: CorrelationKey,
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, S> MessageGroupStore<K, T, S>
where
    K: CorrelationKey,
    T: Send + Sync + 'static,
    S: GroupStorage<K, T>,
{
    pub fn with_storage(storage: S) -> Self {
        Self {
            storage,
            expiry_callbacks: RwLock::new(Arc::new(Vec::new())),
            clock: Arc::new(SystemClock),
            policy: Arc::new(TimeoutPolicy),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replace the time source with a shared one.
    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the policy used by [expire_message_groups](Self::expire_message_groups).
    pub fn with_policy(mut self, policy: impl ExpiryPolicy<K, T> + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Append a message to the group of `key`, creating the group if needed.
    pub fn add_message_to_group(&self, key: K, message: Message<T>) -> Result<(), StoreError> {
        ensure_valid(&key)?;

        let now = self.clock.now();
        trace!(?key, id = %message.id(), "adding message to group");
        if self.storage.append(key.clone(), message, now) {
            debug!(?key, "created message group");
        }
        Ok(())
    }

    /// Returns the current group of `key`, or an empty group that is not
    /// stored if there is none.
    pub fn message_group(&self, key: &K) -> MessageGroup<K, T> {
        self.storage
            .get(key)
            .unwrap_or_else(|| MessageGroup::new(key.clone(), self.clock.now()))
    }

    /// Remove the group of `key`. Removing an absent group is a no-op.
    pub fn remove_message_group(&self, key: &K) -> Result<Option<MessageGroup<K, T>>, StoreError> {
        ensure_valid(key)?;

        let removed = self.storage.remove(key);
        if let Some(group) = &removed {
            debug!(?key, size = group.size(), "removed message group");
        }
        Ok(removed)
    }

    /// Remove one message from the group of `key`. Returns true if the
    /// message was found. The group stays, even when it becomes empty.
    pub fn remove_message_from_group(
        &self,
        key: &K,
        message: &Message<T>,
    ) -> Result<bool, StoreError> {
        ensure_valid(key)?;

        let removed = self.storage.remove_message(key, message, self.clock.now());
        if removed {
            trace!(?key, id = %message.id(), "removed message from group");
        }
        Ok(removed)
    }

    /// Persist the completion flag of a group snapshot, as set by
    /// [mark_complete](MessageGroup::mark_complete).
    ///
    /// Membership is not written back. Messages are added and removed with
    /// [add_message_to_group](Self::add_message_to_group) and
    /// [remove_message_from_group](Self::remove_message_from_group).
    pub fn mark_message_group(&self, group: &MessageGroup<K, T>) -> Result<(), StoreError> {
        let key = group.correlation_key();
        ensure_valid(key)?;

        trace!(?key, complete = group.is_complete(), "marking message group");
        self.storage.mark(group);
        Ok(())
    }

    /// Append a callback to the list run on expired groups.
    pub fn register_expiry_callback(&self, callback: impl MessageGroupCallback<K, T> + 'static) {
        self.register_shared_expiry_callback(Arc::new(callback));
    }

    pub fn register_shared_expiry_callback(&self, callback: SharedCallback<K, T>) {
        let mut callbacks = self.expiry_callbacks.write();
        Arc::make_mut(&mut *callbacks).push(callback);
    }

    /// Replace the whole callback list.
    pub fn set_expiry_callbacks<I>(&self, callbacks: I)
    where
        I: IntoIterator<Item = SharedCallback<K, T>>,
    {
        let callbacks: Vec<_> = callbacks.into_iter().collect();
        *self.expiry_callbacks.write() = Arc::new(callbacks);
    }

    pub fn expiry_callback_count(&self) -> usize {
        self.expiry_callbacks.read().len()
    }

    /// Iterate over snapshots of all groups.
    ///
    /// The key set is copied when the iterator is created and each group
    /// is read when reached. Groups removed in between are skipped, groups
    /// created in between are not visited.
    pub fn iter(&self) -> Groups<'_, K, T, S> {
        Groups {
            storage: &self.storage,
            keys: self.storage.keys().into_iter(),
            _phantom: PhantomData,
        }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.storage.contains_key(key)
    }

    /// Total number of messages across all groups.
    pub fn message_count(&self) -> usize {
        self.storage.message_count()
    }

    /// Expire groups selected by the store's policy.
    ///
    /// With the default [TimeoutPolicy] a group is selected when
    /// `now - last_modified >= timeout_millis`, so a negative timeout
    /// expires every group.
    ///
    /// Only the messages the callbacks were given are removed. Messages
    /// added to an expiring group while its callbacks run stay in the
    /// store as the group's new content and are judged by later sweeps.
    ///
    /// Callback failures do not stop the sweep. A group with a failing
    /// callback still reaches its remaining callbacks and is still
    /// removed. All failures are returned in [StoreError::Sweep] once the
    /// sweep is over.
    pub fn expire_message_groups(&self, timeout_millis: i64) -> Result<SweepReport, StoreError> {
        self.expire_with(self.policy.as_ref(), timeout_millis)
    }

    /// Expire groups selected by `policy` instead of the store's own.
    pub fn expire_with<P>(&self, policy: &P, timeout_millis: i64) -> Result<SweepReport, StoreError>
    where
        P: ExpiryPolicy<K, T> + ?Sized,
    {
        let callbacks = self.expiry_callbacks.read().clone();
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut failures = Vec::new();

        for group in self.iter() {
            report.inspected += 1;
            if !policy.is_expired(&group, timeout_millis, now) {
                continue;
            }

            let key = group.correlation_key();
            debug!(?key, size = group.size(), "expiring message group");

            for (callback_index, callback) in callbacks.iter().enumerate() {
                if let Err(error) = run_callback(callback.as_ref(), &group) {
                    warn!(?key, callback_index, "expiry callback failed: {error:#}");
                    failures.push(CallbackFailure {
                        key: format!("{key:?}"),
                        callback_index,
                        error,
                    });
                }
            }

            let kept = self.storage.remove_expired(&group);
            if kept > 0 {
                debug!(?key, kept, "messages arrived during expiry, group kept");
            }
            report.expired += 1;
        }

        if report.expired > 0 {
            info!(
                inspected = report.inspected,
                expired = report.expired,
                failures = failures.len(),
                "expiry sweep finished"
            );
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SweepError {
                expired: report.expired,
                failures,
            }
            .into())
        }
    }
}

impl<K, T, S> fmt::Debug for MessageGroupStore<K, T, S>
where
    K: CorrelationKey,
    T: Send + Sync + 'static,
    S: GroupStorage<K, T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageGroupStore")
            .field("groups", &self.storage.len())
            .field("expiry_callbacks", &self.expiry_callback_count())
            .finish_non_exhaustive()
    }
}

impl<'a, K, T, S> IntoIterator for &'a MessageGroupStore<K, T, S>
where
    K: CorrelationKey,
    T: Send + Sync + 'static,
    S: GroupStorage<K, T>,
{
    type Item = MessageGroup<K, T>;
    type IntoIter = Groups<'a, K, T, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [MessageGroupStore::iter].
pub struct Groups<'a, K, T, S>
where
    K: CorrelationKey,
    S: GroupStorage<K, T>,
{
    storage: &'a S,
    keys: vec::IntoIter<K>,
    _phantom: PhantomData<fn() -> T>,
}

impl<K, T, S> Iterator for Groups<'_, K, T, S>
where
    K: CorrelationKey,
    S: GroupStorage<K, T>,
{
    type Item = MessageGroup<K, T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys.by_ref().find_map(|key| self.storage.get(&key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.keys.len()))
    }
}

fn ensure_valid<K>(key: &K) -> Result<(), StoreError>
where
    K: CorrelationKey,
{
    if key.is_valid() {
        Ok(())
    } else {
        Err(StoreError::invalid_key(key))
    }
}

/// Run a callback, turning a panic into an error.
fn run_callback<K, T>(
    callback: &dyn MessageGroupCallback<K, T>,
    group: &MessageGroup<K, T>,
) -> eyre::Result<()>
where
    K: CorrelationKey,
{
    match panic::catch_unwind(AssertUnwindSafe(|| callback.execute(group))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(eyre!("callback panicked: {reason}"))
        }
    }
}
