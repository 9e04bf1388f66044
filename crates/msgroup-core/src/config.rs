use crate::policy::PolicyKind;
use eyre::{Result, WrapErr, ensure};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Configuration for a [MessageGroupStore](crate::MessageGroupStore) and
/// its scheduled expiry sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Groups idle for at least this long are expired by scheduled sweeps.
    #[serde(with = "humantime_serde")]
    pub expiry_timeout: Duration,

    /// The period between two scheduled sweeps.
    #[serde(with = "humantime_serde")]
    pub reap_interval: Duration,

    /// Number of lock shards of the in-memory storage. None picks a
    /// default based on the number of CPUs.
    pub shard_amount: Option<usize>,

    /// The policy deciding which groups a sweep selects.
    pub policy: PolicyKind,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            expiry_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(1),
            shard_amount: None,
            policy: PolicyKind::Timeout,
        }
    }
}

impl StoreConfig {
    /// Expire groups idle for `expiry_timeout`, checking every `reap_interval`.
    pub fn timed(expiry_timeout: Duration, reap_interval: Duration) -> Self {
        Self {
            expiry_timeout,
            reap_interval,
            ..Self::default()
        }
    }

    /// Expire groups as soon as they are marked complete.
    pub fn on_completion(reap_interval: Duration) -> Self {
        Self {
            reap_interval,
            policy: PolicyKind::Completion,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_shard_amount(mut self, shard_amount: usize) -> Self {
        self.shard_amount = Some(shard_amount);
        self
    }

    /// The expiry timeout in the millisecond unit taken by
    /// [expire_message_groups](crate::MessageGroupStore::expire_message_groups).
    pub fn expiry_timeout_millis(&self) -> i64 {
        i64::try_from(self.expiry_timeout.as_millis()).unwrap_or(i64::MAX)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StoreConfig =
            serde_yaml::from_str(yaml).wrap_err("Failed to parse store config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml_str(&contents)
            .wrap_err_with(|| format!("Invalid config file: {}", path.display()))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.reap_interval.is_zero(),
            "reap_interval must be greater than zero"
        );

        if let Some(shard_amount) = self.shard_amount {
            ensure!(shard_amount > 0, "shard_amount must be greater than zero");
        }

        if let PolicyKind::Size { max } = self.policy {
            ensure!(max > 0, "size policy requires max > 0");
        }

        Ok(())
    }
}
