use indexmap::IndexMap;
use serde_json::Value;
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Header names mapped to arbitrary values.
pub type Headers = IndexMap<String, Value>;

/// An immutable message envelope.
///
/// Cloning a message is cheap: the id, payload and headers are shared
/// behind an [Arc] and never mutated after construction.
pub struct Message<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    id: Uuid,
    payload: T,
    headers: Headers,
}

impl<T> Message<T> {
    /// Creates a message with a random id and no headers.
    pub fn new(payload: T) -> Self {
        Self::builder(payload).build()
    }

    pub fn builder(payload: T) -> MessageBuilder<T> {
        MessageBuilder {
            id: None,
            payload,
            headers: Headers::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn payload(&self) -> &T {
        &self.inner.payload
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.inner.headers.get(name)
    }

    /// Returns true if both handles point to the same envelope.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the shared envelope. Equal for clones of one message.
    pub(crate) fn envelope_addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl<T> Clone for Message<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Message<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.inner.id == other.inner.id
                && self.inner.payload == other.inner.payload
                && self.inner.headers == other.inner.headers)
    }
}

impl<T> fmt::Debug for Message<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.inner.id)
            .field("payload", &self.inner.payload)
            .field("headers", &self.inner.headers)
            .finish()
    }
}

impl<T> From<T> for Message<T> {
    fn from(payload: T) -> Self {
        Self::new(payload)
    }
}

/// Builds a [Message] with an explicit id or headers.
#[derive(Debug)]
pub struct MessageBuilder<T> {
    id: Option<Uuid>,
    payload: T,
    headers: Headers,
}

impl<T> MessageBuilder<T> {
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers<I, N, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<Value>,
    {
        self.headers
            .extend(headers.into_iter().map(|(name, value)| (name.into(), value.into())));
        self
    }

    pub fn build(self) -> Message<T> {
        Message {
            inner: Arc::new(Inner {
                id: self.id.unwrap_or_else(Uuid::new_v4),
                payload: self.payload,
                headers: self.headers,
            }),
        }
    }
}
