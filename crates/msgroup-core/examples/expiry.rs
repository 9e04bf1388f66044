use msgroup_core::{Message, MessageGroup, MessageGroupStore, Reaper, StoreConfig};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = StoreConfig::from_yaml_str(
        "expiry_timeout: 200ms\n\
         reap_interval: 50ms\n",
    )?;

    let store: Arc<MessageGroupStore<String, u32>> =
        Arc::new(MessageGroupStore::from_config(&config));

    // Publish the sum of every expired group.
    store.register_expiry_callback(|group: &MessageGroup<String, u32>| -> eyre::Result<()> {
        let sum: u32 = group.messages().iter().map(|msg| *msg.payload()).sum();
        info!(key = %group.correlation_key(), size = group.size(), sum, "group expired");
        Ok(())
    });

    let (reaper, outcomes) = Reaper::from_config(&config).spawn(store.clone());

    for (i, sensor) in ["left", "right", "left", "rear", "right"].iter().enumerate() {
        let message = Message::builder(i as u32 * 10)
            .header("sequence_number", i)
            .build();
        store.add_message_to_group(sensor.to_string(), message)?;
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    while !store.is_empty() {
        match outcomes.recv_async().await? {
            Ok(report) if report.expired > 0 => info!(?report, "sweep"),
            Ok(_) => {}
            Err(err) => warn!("sweep reported failures: {err}"),
        }
    }

    reaper.shutdown().await?;
    Ok(())
}
