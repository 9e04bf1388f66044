use crate::{
    error::StoreError,
    message::Message,
    types::{CorrelationKey, Timestamp},
};
use std::collections::HashSet;

/// An ordered collection of messages sharing a correlation key.
///
/// Groups handed out by the store are detached snapshots. Only the
/// completion flag of a snapshot reaches the store, through
/// [mark_message_group](crate::MessageGroupStore::mark_message_group).
/// Membership changes go through the store itself.
#[derive(Debug)]
pub struct MessageGroup<K, T>
where
    K: CorrelationKey,
{
    correlation_key: K,
    messages: Vec<Message<T>>,
    last_modified: Timestamp,
    complete: bool,
}

impl<K, T> Clone for MessageGroup<K, T>
where
    K: CorrelationKey,
{
    fn clone(&self) -> Self {
        Self {
            correlation_key: self.correlation_key.clone(),
            messages: self.messages.clone(),
            last_modified: self.last_modified,
            complete: self.complete,
        }
    }
}

impl<K, T> MessageGroup<K, T>
where
    K: CorrelationKey,
{
    /// Creates an empty group last modified at `now`.
    pub fn new(correlation_key: K, now: Timestamp) -> Self {
        Self {
            correlation_key,
            messages: Vec::new(),
            last_modified: now,
            complete: false,
        }
    }

    /// Creates a group that already holds `messages`.
    pub fn with_messages<I>(correlation_key: K, messages: I, now: Timestamp) -> Self
    where
        I: IntoIterator<Item = Message<T>>,
    {
        Self {
            correlation_key,
            messages: messages.into_iter().collect(),
            last_modified: now,
            complete: false,
        }
    }

    /// Appends a message and bumps the modification time.
    pub fn add(&mut self, message: Message<T>, now: Timestamp) {
        self.messages.push(message);
        self.last_modified = now;
    }

    /// Removes the message with the given id. Returns true if it was found.
    pub(crate) fn remove(&mut self, message: &Message<T>, now: Timestamp) -> bool {
        let Some(pos) = self.messages.iter().position(|m| m.id() == message.id()) else {
            return false;
        };
        self.messages.remove(pos);
        self.last_modified = now;
        true
    }

    /// Drops every message that is also held by `seen`, comparing
    /// envelopes rather than ids. Messages added after `seen` was taken
    /// stay, and so does the modification time.
    pub(crate) fn discard_seen(&mut self, seen: &MessageGroup<K, T>) {
        let seen: HashSet<usize> = seen.messages.iter().map(Message::envelope_addr).collect();
        self.messages
            .retain(|message| !seen.contains(&message.envelope_addr()));
    }

    pub fn size(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the first message in the group.
    pub fn one(&self) -> Result<&Message<T>, StoreError> {
        self.messages
            .first()
            .ok_or_else(|| StoreError::empty_group(&self.correlation_key))
    }

    /// The messages in insertion order.
    pub fn messages(&self) -> &[Message<T>] {
        &self.messages
    }

    pub fn correlation_key(&self) -> &K {
        &self.correlation_key
    }

    pub fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub(crate) fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    pub fn into_messages(self) -> Vec<Message<T>> {
        self.messages
    }
}
