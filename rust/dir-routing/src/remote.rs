use std::{collections::HashSet, str::FromStr, sync::Arc};

use cid::Cid;
use dir_storage::{KeyValueStore, Store};
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::DEFAULT_MIN_MATCH_SCORE,
    dht::{DhtClient, ProviderNotification},
    error::RoutingError,
    labels::{extract_labels, Label, LabelKey, LABEL_PREFIXES},
    local::{labels_for, STREAM_BUFFER},
    metadata::LabelMetadata,
    query::{deduplicate_queries, score},
    record::StoreApi,
    types::{
        PeerInfo, ProviderResponse, RecordRef, SearchRequest, SearchResponse,
    },
};

/// Discovery and search over records advertised by other peers.
///
/// Publishing announces a provider record on the DHT and nothing else; the
/// labels of remote records enter the local index exclusively through the
/// pull-based notification path, where search queries then find them.
#[derive(Clone)]
pub struct RemoteRouting<S: Store> {
    index: S,
    dht: Arc<dyn DhtClient>,
    store: Arc<dyn StoreApi>,
    local_peer_id: String,
}

impl<S: Store + 'static> RemoteRouting<S> {
    /// A remote routing surface over `index` and the given network adapter.
    /// `store` is only consulted to report whether announced records are
    /// already held locally.
    pub fn new(index: S, dht: Arc<dyn DhtClient>, store: Arc<dyn StoreApi>) -> Self {
        let local_peer_id = dht.peer_id().to_base58();
        RemoteRouting {
            index,
            dht,
            store,
            local_peer_id,
        }
    }

    /// Announce `record_ref` as provided by this peer. Callers gate this on
    /// the routing table being non-empty.
    pub async fn publish(&self, record_ref: &RecordRef) -> Result<(), RoutingError> {
        let cid = Cid::from_str(&record_ref.cid).map_err(|error| {
            RoutingError::invalid_argument(format!(
                "'{}' is not a valid CID: {error}",
                record_ref.cid
            ))
        })?;

        self.dht
            .provide(&cid)
            .await
            .map_err(|error| RoutingError::internal(error.to_string()))?;

        debug!("Announced record {record_ref} to the network");
        Ok(())
    }

    /// Stream remotely-cached records matching at least
    /// `request.min_match_score` query terms (0 promotes to 1). Each CID is
    /// emitted at most once; locally-published entries never appear.
    pub async fn search(
        &self,
        request: SearchRequest,
    ) -> Result<mpsc::Receiver<SearchResponse>, RoutingError> {
        let queries = deduplicate_queries(request.queries);
        let limit = request.limit;
        let min_match_score = request.min_match_score.max(DEFAULT_MIN_MATCH_SCORE);
        let index = self.index.clone();
        let local_peer_id = self.local_peer_id.clone();

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut emitted_cids: HashSet<String> = HashSet::new();
            let mut emitted: u32 = 0;

            for prefix in LABEL_PREFIXES {
                let entries = match index.scan_prefix(prefix.as_bytes()).await {
                    Ok(entries) => entries,
                    Err(error) => {
                        error!("Label enumeration failed: {error}");
                        return;
                    }
                };

                for (key, _) in entries {
                    let key = match String::from_utf8(key) {
                        Ok(key) => key,
                        Err(_) => continue,
                    };
                    let parsed = match LabelKey::parse(&key) {
                        Ok(parsed) => parsed,
                        Err(error) => {
                            warn!("Skipping malformed label key '{key}': {error}");
                            continue;
                        }
                    };

                    // Remote entries only; local records belong to List.
                    if parsed.peer_id() == local_peer_id {
                        continue;
                    }
                    if emitted_cids.contains(parsed.cid()) {
                        continue;
                    }
                    emitted_cids.insert(parsed.cid().to_string());

                    let labels = match labels_for(&index, parsed.cid(), parsed.peer_id()).await
                    {
                        Ok(labels) => labels,
                        Err(error) => {
                            warn!("Skipping record {}: {error}", parsed.cid());
                            continue;
                        }
                    };

                    // An empty query set matches every remote record; with
                    // queries present, enough of them must match.
                    let (match_queries, match_score) = score(&queries, &labels);
                    if !queries.is_empty() && match_score < min_match_score {
                        continue;
                    }

                    let response = SearchResponse {
                        record_ref: RecordRef::new(parsed.cid()),
                        peer: PeerInfo {
                            id: parsed.peer_id().to_string(),
                            addrs: Vec::new(),
                        },
                        match_queries,
                        match_score,
                    };
                    if tx.send(response).await.is_err() {
                        return;
                    }

                    emitted += 1;
                    if limit > 0 && emitted >= limit {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Enumerate the network's providers for one specific record: find them
    /// via the DHT, pull the record from each and stream back its labels.
    /// Fails with [RoutingError::NotFound] when nobody provides the CID.
    pub async fn list_by_cid(
        &self,
        record_ref: &RecordRef,
    ) -> Result<mpsc::Receiver<ProviderResponse>, RoutingError> {
        let cid = Cid::from_str(&record_ref.cid).map_err(|error| {
            RoutingError::invalid_argument(format!(
                "'{}' is not a valid CID: {error}",
                record_ref.cid
            ))
        })?;

        let providers = self.dht.providers(&cid).await.map_err(RoutingError::from)?;
        if providers.is_empty() {
            return Err(RoutingError::not_found(format!(
                "no providers found for {record_ref}"
            )));
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let dht = self.dht.clone();
        let record_ref = record_ref.clone();

        tokio::spawn(async move {
            let pulls = providers.iter().map(|provider| {
                let dht = dht.clone();
                let record_ref = record_ref.clone();
                let tx = tx.clone();
                let provider = provider.clone();
                async move {
                    match dht.pull(provider.peer_id, &record_ref).await {
                        Ok(record) => {
                            let labels = extract_labels(&record)
                                .iter()
                                .map(Label::to_string)
                                .collect();
                            let _ = tx
                                .send(ProviderResponse {
                                    record_ref,
                                    peer: PeerInfo::from(&provider),
                                    labels,
                                })
                                .await;
                        }
                        Err(error) => {
                            warn!(
                                "Provider {} failed to serve {record_ref}: {error}",
                                provider.peer_id
                            );
                        }
                    }
                }
            });
            join_all(pulls).await;
        });

        Ok(rx)
    }

    /// Consume provider notifications until `token` is cancelled.
    pub fn spawn_notification_consumer(
        &self,
        mut notifications: mpsc::Receiver<ProviderNotification>,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let remote = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    notification = notifications.recv() => match notification {
                        Some(notification) => {
                            remote.handle_provider_notification(notification).await;
                        }
                        None => break,
                    }
                }
            }
            debug!("Provider notification consumer stopped");
        })
    }

    /// React to one provider announcement: fetch the record from the
    /// announcing peer and cache its labels keyed by (label, CID, peer).
    /// Failures abandon this announcement; they never propagate.
    pub async fn handle_provider_notification(&self, notification: ProviderNotification) {
        let record_ref = notification.record_ref;
        let peer_id = notification.peer.peer_id;

        match self.store.lookup(&record_ref).await {
            Ok(_) => debug!("Announced record {record_ref} is already held locally"),
            Err(_) => debug!("Announced record {record_ref} is not held locally"),
        }

        let meta = match self.dht.lookup(peer_id, &record_ref).await {
            Ok(meta) => meta,
            Err(error) => {
                error!("Peer {peer_id} announced {record_ref} but lookup failed: {error}");
                return;
            }
        };
        debug!(
            "Peer {peer_id} provides {record_ref} (schema {})",
            meta.schema_version
        );

        let record = match self.dht.pull(peer_id, &record_ref).await {
            Ok(record) => record,
            Err(error) => {
                error!("Pulling {record_ref} from {peer_id} failed: {error}");
                return;
            }
        };

        let peer = peer_id.to_base58();
        let mut index = self.index.clone();
        for label in extract_labels(&record) {
            let key = LabelKey::new(label, &record_ref.cid, &peer).to_string();

            let metadata = match index.get_key::<_, LabelMetadata>(&key).await {
                Ok(Some(mut existing)) if existing.validate().is_ok() => {
                    existing.update();
                    existing
                }
                _ => LabelMetadata::now(),
            };

            if let Err(error) = index.set_key(&key, metadata).await {
                warn!("Failed to cache label '{key}': {error}");
            }
        }

        info!("Cached labels of {record_ref} announced by {peer}");
    }
}
