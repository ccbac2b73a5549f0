use std::sync::Arc;

use async_trait::async_trait;
use dir_storage::Store;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::RoutingConfig,
    dht::DhtClient,
    error::RoutingError,
    local::LocalRouting,
    maintenance::{Maintenance, RecordAnnouncer},
    record::{Record, StoreApi},
    remote::RemoteRouting,
    types::{
        ListRequest, ListResponse, ProviderResponse, RecordRef, RoutingApi, SearchRequest,
        SearchResponse,
    },
};

/// The full publish path: local state first, then a best-effort network
/// announcement gated on the routing table having peers. Shared between
/// [Router::publish] and the republish loop.
struct PublishPath<S: Store> {
    local: LocalRouting<S>,
    remote: RemoteRouting<S>,
    dht: Arc<dyn DhtClient>,
}

#[async_trait]
impl<S: Store + 'static> RecordAnnouncer for PublishPath<S> {
    async fn announce(&self, record: &Record) -> Result<(), RoutingError> {
        // A local failure aborts before the network leg; a network failure
        // surfaces but leaves local state in place for the next republish.
        self.local.publish(record).await?;

        let has_peers = self
            .dht
            .has_peers()
            .await
            .map_err(|error| RoutingError::internal(error.to_string()))?;
        if !has_peers {
            debug!(
                "No peers in the routing table; record {} stays local for now",
                record.cid()
            );
            return Ok(());
        }

        self.remote.publish(&record.reference()).await
    }
}

/// The record routing engine: composes the local index surface, pull-based
/// remote discovery and the background maintenance suite.
///
/// `list` consults only local state and `search` only the pull-cached
/// remote state; `publish` writes locally and announces when the network
/// is reachable; `unpublish` is local-only, leaving provider records to
/// expire via their DHT TTL.
pub struct Router<S: Store> {
    index: S,
    local: LocalRouting<S>,
    remote: RemoteRouting<S>,
    dht: Arc<dyn DhtClient>,
    publish_path: Arc<PublishPath<S>>,
    token: CancellationToken,
}

impl<S: Store + 'static> Router<S> {
    pub(crate) fn new(
        index: S,
        store: Arc<dyn StoreApi>,
        dht: Arc<dyn DhtClient>,
        config: &RoutingConfig,
    ) -> Self {
        let local_peer_id = dht.peer_id().to_base58();
        let local = LocalRouting::new(index.clone(), local_peer_id.clone());
        let remote = RemoteRouting::new(index.clone(), dht.clone(), store.clone());
        let publish_path = Arc::new(PublishPath {
            local: local.clone(),
            remote: remote.clone(),
            dht: dht.clone(),
        });

        let token = CancellationToken::new();

        if let Some(notifications) = dht.take_provider_events() {
            remote.spawn_notification_consumer(notifications, token.child_token());
        } else {
            warn!("Provider notifications unavailable; remote discovery is disabled");
        }

        Maintenance::new(
            index.clone(),
            store,
            publish_path.clone(),
            local_peer_id,
            config,
        )
        .spawn(token.child_token());

        Router {
            index,
            local,
            remote,
            dht,
            publish_path,
            token,
        }
    }

    /// The network adapter this router runs on
    pub fn dht(&self) -> &Arc<dyn DhtClient> {
        &self.dht
    }

    /// Enumerate the network's providers of one specific record, pulling
    /// each provider's copy for its labels
    pub async fn lookup_providers(
        &self,
        record_ref: &RecordRef,
    ) -> Result<mpsc::Receiver<ProviderResponse>, RoutingError> {
        self.remote.list_by_cid(record_ref).await
    }

    /// Stop the background loops and the notification consumer, then flush
    /// pending index writes
    pub async fn shutdown(&self) -> Result<(), RoutingError> {
        self.token.cancel();
        self.index.flush().await?;
        Ok(())
    }
}

impl<S: Store> Drop for Router<S> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[async_trait]
impl<S: Store + 'static> RoutingApi for Router<S> {
    async fn publish(&self, record: &Record) -> Result<(), RoutingError> {
        self.publish_path.announce(record).await
    }

    async fn unpublish(&self, record: &Record) -> Result<(), RoutingError> {
        // No network retraction: provider records expire on their own.
        self.local.unpublish(record).await
    }

    async fn list(
        &self,
        request: ListRequest,
    ) -> Result<mpsc::Receiver<ListResponse>, RoutingError> {
        self.local.list(request).await
    }

    async fn search(
        &self,
        request: SearchRequest,
    ) -> Result<mpsc::Receiver<SearchResponse>, RoutingError> {
        self.remote.search(request).await
    }
}
