use msgroup_core::{ManualClock, Message, MessageGroup, MessageGroupStore, SharedCallback};
use parking_lot::Mutex;
use std::sync::Arc;

#[allow(dead_code)]
pub type TestStore = MessageGroupStore<String, String>;

/// Create a store driven by a manual clock starting at `start_ms`.
#[allow(dead_code)]
pub fn store_with_clock(start_ms: i64) -> (TestStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::from_millis(start_ms));
    let store = MessageGroupStore::new().with_shared_clock(clock.clone());
    (store, clock)
}

pub fn key(name: &str) -> String {
    name.to_string()
}

pub fn msg(payload: &str) -> Message<String> {
    Message::new(payload.to_string())
}

#[allow(dead_code)]
pub fn payloads(group: &MessageGroup<String, String>) -> Vec<String> {
    group
        .messages()
        .iter()
        .map(|message| message.payload().clone())
        .collect()
}

/// Records every callback invocation as `(label, correlation key)`.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(String, String)>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that records `label` for every expired group.
    pub fn callback(&self, label: &str) -> SharedCallback<String, String> {
        let events = self.events.clone();
        let label = label.to_string();
        Arc::new(
            move |group: &MessageGroup<String, String>| -> eyre::Result<()> {
                events
                    .lock()
                    .push((label.clone(), group.correlation_key().clone()));
                Ok(())
            },
        )
    }

    /// A callback that records `label` and then fails for `failing_key`.
    pub fn failing_callback(&self, label: &str, failing_key: &str) -> SharedCallback<String, String> {
        let events = self.events.clone();
        let label = label.to_string();
        let failing_key = failing_key.to_string();
        Arc::new(
            move |group: &MessageGroup<String, String>| -> eyre::Result<()> {
                let key = group.correlation_key().clone();
                events.lock().push((label.clone(), key.clone()));
                eyre::ensure!(key != failing_key, "refusing to expire {key}");
                Ok(())
            },
        )
    }

    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().clone()
    }

    pub fn labels_for(&self, key: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(_, k)| k == key)
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn expired_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.events.lock().iter().map(|(_, k)| k.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
