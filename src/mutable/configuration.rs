use parking_lot::Mutex;
use tracing::{debug, info};

use super::{ChangePropagationPolicy, ConfigChangeRequest, MutablePropertySource};
use crate::config::{ConfigError, Configuration};

/// A [`Configuration`] that can be written to.
///
/// Writes outside a transaction are applied immediately when auto-commit is
/// on (the default) and rejected otherwise. Inside a transaction they are
/// collected and applied together on [`commit`](Self::commit).
///
/// ```
/// use dragon_conf::mutable::{MutableConfiguration, MutableMapSource};
/// use dragon_conf::Configuration;
///
/// let config = Configuration::builder()
///     .add_source(MutableMapSource::new("runtime"))
///     .build()?;
/// let mutable = MutableConfiguration::new(config.clone());
///
/// mutable.start_transaction()?;
/// mutable.put("feature.enabled", "true")?;
/// assert!(config.get("feature.enabled")?.is_none());
///
/// mutable.commit()?;
/// assert_eq!(config.get_as::<bool>("feature.enabled")?, Some(true));
/// # Ok::<(), dragon_conf::ConfigError>(())
/// ```
#[derive(Debug)]
pub struct MutableConfiguration {
    config: Configuration,
    policy: ChangePropagationPolicy,
    auto_commit: bool,
    transaction: Mutex<Option<ConfigChangeRequest>>,
}

impl MutableConfiguration {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            policy: ChangePropagationPolicy::default(),
            auto_commit: true,
            transaction: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: ChangePropagationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn policy(&self) -> &ChangePropagationPolicy {
        &self.policy
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// The writable sources of the configuration, least significant first.
    pub fn mutable_sources(&self) -> Vec<&dyn MutablePropertySource> {
        self.config
            .context()
            .property_sources()
            .iter()
            .filter_map(|s| s.as_mutable())
            .collect()
    }

    /// Starts a transaction and returns its id.
    pub fn start_transaction(&self) -> Result<String, ConfigError> {
        let mut transaction = self.transaction.lock();
        if let Some(active) = transaction.as_ref() {
            return Err(ConfigError::TransactionActive(active.id().to_string()));
        }
        let change = ConfigChangeRequest::with_generated_id();
        let id = change.id().to_string();
        debug!(transaction = %id, "transaction started");
        *transaction = Some(change);
        Ok(id)
    }

    pub fn transaction_id(&self) -> Option<String> {
        self.transaction.lock().as_ref().map(|t| t.id().to_string())
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction.lock().is_some()
    }

    pub fn put(&self, key: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        check_key(key)?;
        let value = value.into();
        self.stage(|change| change.put(key, value))
    }

    pub fn put_all<I, K, V>(&self, entries: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (key, _) in &entries {
            check_key(key)?;
        }
        self.stage(|change| change.put_all(entries))
    }

    pub fn remove<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
        let keys: Vec<&str> = keys.into_iter().collect();
        for key in &keys {
            check_key(key)?;
        }
        self.stage(|change| {
            for key in keys {
                change.remove(key);
            }
        })
    }

    /// Applies the pending changes and ends the transaction.
    ///
    /// The transaction ends even if applying fails.
    pub fn commit(&self) -> Result<(), ConfigError> {
        let change = self.transaction.lock().take().ok_or(ConfigError::NoTransaction)?;
        self.apply(&change)?;
        info!(transaction = change.id(), "transaction committed");
        Ok(())
    }

    /// Discards the pending changes and ends the transaction.
    pub fn rollback(&self) -> Result<(), ConfigError> {
        let change = self.transaction.lock().take().ok_or(ConfigError::NoTransaction)?;
        debug!(transaction = change.id(), "transaction rolled back");
        Ok(())
    }

    fn stage(&self, update: impl FnOnce(&mut ConfigChangeRequest)) -> Result<(), ConfigError> {
        let mut transaction = self.transaction.lock();
        if let Some(change) = transaction.as_mut() {
            update(change);
            return Ok(());
        }
        drop(transaction);

        if !self.auto_commit {
            return Err(ConfigError::NoTransaction);
        }
        let mut change = ConfigChangeRequest::with_generated_id();
        update(&mut change);
        self.apply(&change)
    }

    fn apply(&self, change: &ConfigChangeRequest) -> Result<(), ConfigError> {
        if change.is_empty() {
            return Ok(());
        }
        if self.policy == ChangePropagationPolicy::None {
            debug!(transaction = change.id(), "change discarded by propagation policy");
            return Ok(());
        }
        let applied = self.policy.apply(&self.mutable_sources(), change)?;
        if applied == 0 {
            return Err(ConfigError::NoMutableTarget);
        }
        Ok(())
    }
}

fn check_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::InvalidArgument("key must not be empty".into()));
    }
    Ok(())
}
