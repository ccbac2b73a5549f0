use std::collections::BTreeMap;

use anyhow::Result;
use dir_storage::KeyValueStore;
use serde::{Deserialize, Serialize};

use crate::labels::Label;

/// Index key the metrics blob is stored under.
pub const METRICS_KEY: &str = "/metrics";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct MetricEntry {
    name: String,
    total: u64,
}

/// Frequency counts for locally-published labels, persisted as a single JSON
/// blob. Metrics are operational hints, not invariants: the true counts are
/// always recoverable by a full index scan, so a lost concurrent update is
/// tolerated.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LabelMetrics {
    entries: BTreeMap<String, MetricEntry>,
}

impl LabelMetrics {
    /// Read the metrics blob from `store`; absent means empty.
    pub async fn load<S: KeyValueStore>(store: &S) -> Result<Self> {
        let entries: BTreeMap<String, MetricEntry> =
            store.get_key(METRICS_KEY).await?.unwrap_or_default();
        Ok(LabelMetrics { entries })
    }

    /// Write the whole map back in one update.
    pub async fn update<S: KeyValueStore>(&self, store: &mut S) -> Result<()> {
        store.set_key(METRICS_KEY, &self.entries).await
    }

    /// Count one more published instance of `label`.
    pub fn increment(&mut self, label: &Label) {
        let name = label.to_string();
        self.entries
            .entry(name.clone())
            .or_insert(MetricEntry { name, total: 0 })
            .total += 1;
    }

    /// Count one fewer published instance of `label`. Entries at zero are
    /// removed; decrementing an absent entry is a no-op.
    pub fn decrement(&mut self, label: &Label) {
        let name = label.to_string();
        if let Some(entry) = self.entries.get_mut(&name) {
            entry.total = entry.total.saturating_sub(1);
            if entry.total == 0 {
                self.entries.remove(&name);
            }
        }
    }

    /// The published count for `label`, zero when untracked.
    pub fn total(&self, label: &Label) -> u64 {
        self.entries
            .get(&label.to_string())
            .map(|entry| entry.total)
            .unwrap_or(0)
    }

    /// Number of distinct labels currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no labels are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dir_storage::MemoryStore;

    #[tokio::test]
    async fn it_counts_and_persists_labels() -> Result<()> {
        let mut store = MemoryStore::default();
        let skill = Label::skill("AI/ML");

        let mut metrics = LabelMetrics::load(&store).await?;
        assert!(metrics.is_empty());

        metrics.increment(&skill);
        metrics.increment(&skill);
        metrics.update(&mut store).await?;

        let reloaded = LabelMetrics::load(&store).await?;
        assert_eq!(reloaded.total(&skill), 2);
        Ok(())
    }

    #[test]
    fn it_removes_entries_at_zero() {
        let skill = Label::skill("AI");
        let mut metrics = LabelMetrics::default();

        metrics.increment(&skill);
        metrics.decrement(&skill);
        assert!(metrics.is_empty());

        // Below zero is a no-op.
        metrics.decrement(&skill);
        assert!(metrics.is_empty());
        assert_eq!(metrics.total(&skill), 0);
    }
}
