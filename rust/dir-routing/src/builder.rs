use std::{path::PathBuf, sync::Arc};

use dir_storage::Store;
use libp2p::Multiaddr;

use crate::{
    config::RoutingConfig,
    dht::{load_or_generate_keypair, DhtClient, DhtConfig, DhtNode},
    error::RoutingError,
    record::StoreApi,
    router::Router,
};

/// [RouterBuilder] is the primary external interface for creating a new
/// [Router]. An index store and a record store must be provided; everything
/// else has working defaults.
///
/// # Examples
///
/// ```no_run
/// use dir_routing::{helpers::MemoryRecordStore, RouterBuilder};
/// use dir_storage::MemoryStore;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), dir_routing::RoutingError> {
/// let router = RouterBuilder::default()
///     .index(&MemoryStore::default())
///     .store(Arc::new(MemoryRecordStore::default()))
///     .listen_address("/ip4/127.0.0.1/tcp/0".parse().expect("parseable"))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct RouterBuilder<S>
where
    S: Store,
{
    config: RoutingConfig,
    index: Option<S>,
    store: Option<Arc<dyn StoreApi>>,
    dht: Option<Arc<dyn DhtClient>>,
}

impl<S> RouterBuilder<S>
where
    S: Store + 'static,
{
    /// The key/value store backing the local index.
    pub fn index(mut self, index: &S) -> Self {
        self.index = Some(index.clone());
        self
    }

    /// The external record store holding record bytes.
    pub fn store(mut self, store: Arc<dyn StoreApi>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Address to listen on for incoming peer connections.
    pub fn listen_address(mut self, address: Multiaddr) -> Self {
        self.config.listen_address = Some(address);
        self
    }

    /// Peer addresses to join the network through. A standalone bootstrap
    /// node leaves this empty.
    pub fn bootstrap_peers(mut self, peers: &[Multiaddr]) -> Self {
        self.config.bootstrap_peers = peers.to_owned();
        self
    }

    /// Where the long-lived identity key lives on disk.
    pub fn identity_key_path(mut self, path: PathBuf) -> Self {
        self.config.identity_key_path = Some(path);
        self
    }

    /// Whether mDNS local-network discovery participates.
    pub fn enable_mdns(mut self, enabled: bool) -> Self {
        self.config.enable_mdns = enabled;
        self
    }

    /// Substitute the network adapter; used by tests.
    pub fn dht_client(mut self, dht: Arc<dyn DhtClient>) -> Self {
        self.dht = Some(dht);
        self
    }

    /// Build a [Router] based off of the provided configuration.
    pub async fn build(mut self) -> Result<Router<S>, RoutingError> {
        let index = self
            .index
            .take()
            .ok_or_else(|| RoutingError::invalid_argument("index store required"))?;
        let store = self
            .store
            .take()
            .ok_or_else(|| RoutingError::invalid_argument("record store required"))?;

        let dht: Arc<dyn DhtClient> = match self.dht.take() {
            Some(dht) => dht,
            None => {
                let keypair =
                    load_or_generate_keypair(self.config.identity_key_path.as_deref()).await?;
                let dht_config = DhtConfig {
                    bootstrap_interval: self.config.refresh_interval.as_secs(),
                    enable_mdns: self.config.enable_mdns,
                    ..DhtConfig::default()
                };

                let node = DhtNode::new(&keypair, dht_config, store.clone())
                    .map_err(|error| RoutingError::internal(error.to_string()))?;

                if let Some(address) = self.config.listen_address.clone() {
                    node.listen(address)
                        .await
                        .map_err(|error| RoutingError::internal(error.to_string()))?;
                }
                if !self.config.bootstrap_peers.is_empty() {
                    node.add_peers(self.config.bootstrap_peers.clone())
                        .await
                        .map_err(|error| RoutingError::internal(error.to_string()))?;
                    node.bootstrap()
                        .await
                        .map_err(|error| RoutingError::internal(error.to_string()))?;
                }

                Arc::new(node)
            }
        };

        Ok(Router::new(index, store, dht, &self.config))
    }
}

impl<S> Default for RouterBuilder<S>
where
    S: Store,
{
    fn default() -> Self {
        Self {
            config: RoutingConfig::default(),
            index: None,
            store: None,
            dht: None,
        }
    }
}
