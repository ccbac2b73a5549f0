use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::{BatchOperation, Store};

/// An in-memory [Store] over an ordered map. Scans and batches take the same
/// lock, so a batch is observed all-or-nothing.
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// All keys currently present, in ascending order
    pub async fn stored_keys(&self) -> Vec<Vec<u8>> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Produce an independent copy of this store's current contents
    pub async fn fork(&self) -> Self {
        MemoryStore {
            entries: Arc::new(Mutex::new(self.entries.lock().await.clone())),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn write(&mut self, key: &[u8], bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        Ok(entries.insert(key.to_vec(), bytes.to_vec()))
    }

    async fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key))
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.lock().await;
        let range = (Bound::Included(prefix.to_vec()), Bound::Unbounded);
        Ok(entries
            .range(range)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn apply_batch(&mut self, operations: Vec<BatchOperation>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for operation in operations {
            match operation {
                BatchOperation::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
