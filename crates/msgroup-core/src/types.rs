use chrono::{DateTime, Utc};
use std::{fmt::Debug, hash::Hash, sync::Arc};

/// The point in time attached to group modifications.
pub type Timestamp = DateTime<Utc>;

/// The key that identifies a message group in the store.
///
/// Every mutating store operation checks [is_valid](CorrelationKey::is_valid)
/// before touching the backing storage and fails with
/// [StoreError::InvalidKey](crate::StoreError::InvalidKey) otherwise.
pub trait CorrelationKey: Clone + PartialEq + Eq + Hash + Debug + Sync + Send + 'static {
    /// Returns false for keys that must never name a group.
    fn is_valid(&self) -> bool {
        true
    }
}

impl CorrelationKey for String {
    fn is_valid(&self) -> bool {
        !self.is_empty()
    }
}

impl CorrelationKey for &'static str {
    fn is_valid(&self) -> bool {
        !self.is_empty()
    }
}

impl CorrelationKey for Arc<str> {
    fn is_valid(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! impl_integer_key {
    ($($ty:ty),*) => {
        $(impl CorrelationKey for $ty {})*
    };
}

impl_integer_key!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl CorrelationKey for uuid::Uuid {
    fn is_valid(&self) -> bool {
        !self.is_nil()
    }
}

impl<A, B> CorrelationKey for (A, B)
where
    A: CorrelationKey,
    B: CorrelationKey,
{
    fn is_valid(&self) -> bool {
        self.0.is_valid() && self.1.is_valid()
    }
}
