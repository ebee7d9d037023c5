use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A set of pending puts and removals, identified by a transaction id.
///
/// Putting a key cancels a pending removal of it and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeRequest {
    id: String,
    started_at: SystemTime,
    added: BTreeMap<String, String>,
    removed: BTreeSet<String>,
}

impl ConfigChangeRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: SystemTime::now(),
            added: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    /// A request with a process-unique id (`tx-1`, `tx-2`, ...).
    pub fn with_generated_id() -> Self {
        Self::new(format!("tx-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.removed.remove(&key);
        self.added.insert(key, value.into());
    }

    pub fn put_all<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.added.remove(&key);
        self.removed.insert(key);
    }

    pub fn added(&self) -> &BTreeMap<String, String> {
        &self.added
    }

    pub fn removed(&self) -> &BTreeSet<String> {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Applies the request to a flat map.
    pub fn apply_to(&self, entries: &mut BTreeMap<String, String>) {
        for key in &self.removed {
            entries.remove(key);
        }
        entries.extend(self.added.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}
