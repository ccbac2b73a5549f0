use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use sled::{Db, Tree};

use crate::store::{BatchOperation, Store};

/// Describes how to initialize a [SledStore]
pub enum SledStoreInit {
    /// Open (creating if necessary) a database at the given directory
    Path(PathBuf),
    /// Reuse an already-opened database handle
    Db(Db),
}

/// A disk-persisted [Store] over a single [sled::Tree].
#[derive(Clone, Debug)]
pub struct SledStore {
    db: Db,
    tree: Tree,
    #[allow(unused)]
    path: Option<PathBuf>,
}

impl SledStore {
    /// Initialize a [SledStore], keeping entries in the tree named `name`
    pub fn new(init: SledStoreInit, name: &str) -> Result<Self> {
        let mut db_path = None;
        let db: Db = match init {
            SledStoreInit::Path(path) => {
                std::fs::create_dir_all(&path)?;
                db_path = Some(path.clone().canonicalize()?);
                sled::open(path)?
            }
            SledStoreInit::Db(db) => db,
        };
        let tree = db.open_tree(name)?;

        Ok(SledStore {
            db,
            tree,
            path: db_path,
        })
    }
}

#[async_trait]
impl Store for SledStore {
    async fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|entry| entry.to_vec()))
    }

    async fn write(&mut self, key: &[u8], bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        let old_bytes = self
            .tree
            .insert(key, bytes)?
            .map(|old_entry| old_entry.to_vec());
        Ok(old_bytes)
    }

    async fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .tree
            .remove(key)
            .map(|maybe_entry| maybe_entry.map(|entry| entry.to_vec()))?)
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    async fn apply_batch(&mut self, operations: Vec<BatchOperation>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for operation in operations {
            match operation {
                BatchOperation::Put { key, value } => batch.insert(key, value),
                BatchOperation::Delete { key } => batch.remove(key),
            }
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    /// Flushes pending writes if there are any
    async fn flush(&self) -> Result<()> {
        // `flush_async()` can deadlock when simultaneous calls are performed.
        // This occurs often in tests and fixed in `sled`'s main branch,
        // but no cargo release since 2021.
        // https://github.com/spacejam/sled/issues/1308
        self.tree.flush()?;
        Ok(())
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        if let Err(error) = self.db.flush() {
            warn!("sled flush on drop failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> Result<(tempfile::TempDir, SledStore)> {
        let dir = tempfile::TempDir::new()?;
        let store = SledStore::new(SledStoreInit::Path(dir.path().to_path_buf()), "index")?;
        Ok((dir, store))
    }

    #[tokio::test]
    async fn it_persists_and_scans_entries() -> Result<()> {
        let (_dir, mut store) = temp_store()?;
        store.write(b"/records/abc", b"").await?;
        store.write(b"/skills/AI/abc/peer", b"{}").await?;

        let entries = store.scan_prefix(b"/records/").await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, b"/records/abc".to_vec());

        store
            .apply_batch(vec![BatchOperation::delete(b"/records/abc")])
            .await?;
        assert!(store.scan_prefix(b"/records/").await?.is_empty());
        Ok(())
    }
}
