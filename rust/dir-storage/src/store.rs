use anyhow::Result;
use async_trait::async_trait;

/// A single mutation inside an atomic [Store::apply_batch] call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BatchOperation {
    /// Write `value` against `key`, replacing any prior value.
    Put {
        /// The key to write to
        key: Vec<u8>,
        /// The bytes to store
        value: Vec<u8>,
    },
    /// Remove the value stored against `key`, if any.
    Delete {
        /// The key to remove
        key: Vec<u8>,
    },
}

impl BatchOperation {
    /// Shorthand for a [BatchOperation::Put]
    pub fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(key: K, value: V) -> Self {
        BatchOperation::Put {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        }
    }

    /// Shorthand for a [BatchOperation::Delete]
    pub fn delete<K: AsRef<[u8]>>(key: K) -> Self {
        BatchOperation::Delete {
            key: key.as_ref().to_vec(),
        }
    }
}

/// A primitive interface for storage backends. Backends are expected to
/// support concurrent readers and writers; a batch submitted through
/// [Store::apply_batch] must become visible to readers all-or-nothing.
#[async_trait]
pub trait Store: Clone + Send + Sync {
    /// Read the bytes stored against a given key
    async fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes bytes to storage against a given key, and returns the previous
    /// value stored against that key if any
    async fn write(&mut self, key: &[u8], bytes: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove a value given a key, returning the removed value if any
    async fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Enumerate every entry whose key starts with `prefix`, in ascending
    /// key order
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply a set of mutations atomically
    async fn apply_batch(&mut self, operations: Vec<BatchOperation>) -> Result<()>;

    /// Flushes pending writes if there are any
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
