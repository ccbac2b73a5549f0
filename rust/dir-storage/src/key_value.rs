use std::fmt::Display;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::store::Store;

/// A [KeyValueStore] is a construct that is suitable for persisting generic
/// key/value data to a storage backend. Values are encoded as JSON, which is
/// also the wire form the directory uses for everything it persists.
#[async_trait]
pub trait KeyValueStore: Clone + Send + Sync {
    /// Given some key that can be realized as bytes, persist a serializable
    /// value to storage so that it can later be retrieved by that key
    async fn set_key<K, V>(&mut self, key: K, value: V) -> Result<()>
    where
        K: AsRef<[u8]> + Send,
        V: Serialize + Send;

    /// Given some key that can be realized as bytes, retrieve some data that
    /// can be deserialized as the intended data structure
    async fn get_key<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]> + Send,
        V: DeserializeOwned + Send;

    /// Given some key that can be realized as bytes, unset the value stored
    /// against that key (if any)
    async fn unset_key<K>(&mut self, key: K) -> Result<()>
    where
        K: AsRef<[u8]> + Send;

    /// Same as get_key, but returns an error if no value is found to be
    /// stored against the key
    async fn require_key<K, V>(&self, key: K) -> Result<V>
    where
        K: AsRef<[u8]> + Send + Display,
        V: DeserializeOwned + Send,
    {
        let required = key.to_string();

        match self.get_key(key).await? {
            Some(value) => Ok(value),
            None => Err(anyhow!("No value found for '{required}'")),
        }
    }
}

#[async_trait]
impl<S> KeyValueStore for S
where
    S: Store,
{
    async fn set_key<K, V>(&mut self, key: K, value: V) -> Result<()>
    where
        K: AsRef<[u8]> + Send,
        V: Serialize + Send,
    {
        let bytes = serde_json::to_vec(&value)?;
        self.write(key.as_ref(), &bytes).await?;
        Ok(())
    }

    async fn get_key<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]> + Send,
        V: DeserializeOwned + Send,
    {
        Ok(match self.read(key.as_ref()).await? {
            Some(bytes) => Some(serde_json::from_slice(&bytes)?),
            None => None,
        })
    }

    async fn unset_key<K>(&mut self, key: K) -> Result<()>
    where
        K: AsRef<[u8]> + Send,
    {
        self.remove(key.as_ref()).await?;
        Ok(())
    }
}
