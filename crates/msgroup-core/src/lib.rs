//! This library aggregates messages that share a correlation key into
//! message groups and expires idle groups through registered callbacks.
//!
//! # Usage
//!
//! ```rust
//! use msgroup_core::{Message, MessageGroup, MessageGroupStore};
//! use std::sync::{Arc, Mutex};
//!
//! # fn main() -> eyre::Result<()> {
//! let store: MessageGroupStore<&'static str, String> = MessageGroupStore::new();
//!
//! // Collect the first payload of every expired group.
//! let expired = Arc::new(Mutex::new(Vec::new()));
//! let sink = expired.clone();
//! store.register_expiry_callback(
//!     move |group: &MessageGroup<&'static str, String>| -> eyre::Result<()> {
//!         sink.lock().unwrap().push(group.one()?.payload().clone());
//!         Ok(())
//!     },
//! );
//!
//! store.add_message_to_group("bar", Message::new("foo".to_string()))?;
//! assert_eq!(store.message_group(&"bar").size(), 1);
//!
//! // A negative timeout selects every group.
//! store.expire_message_groups(-10_000)?;
//! assert_eq!(*expired.lock().unwrap(), ["foo"]);
//! assert_eq!(store.message_group(&"bar").size(), 0);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod clock;
mod config;
mod error;
mod group;
mod message;
pub mod policy;
#[cfg(feature = "tokio")]
pub mod reaper;
pub mod storage;
mod store;
mod types;

pub use callback::{MessageGroupCallback, SharedCallback};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{CallbackFailure, StoreError, SweepError};
pub use group::MessageGroup;
pub use message::{Headers, Message, MessageBuilder};
pub use policy::{CompletionPolicy, ExpiryPolicy, PolicyKind, SizePolicy, TimeoutPolicy};
#[cfg(feature = "tokio")]
pub use reaper::{Reaper, ReaperHandle, SweepOutcome};
pub use storage::{GroupStorage, MemoryStorage};
pub use store::{Groups, MessageGroupStore, SweepReport};
pub use types::*;
