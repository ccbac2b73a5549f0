use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cid::Cid;
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use tokio::sync::mpsc;

use crate::{
    dht::{
        channel::message_channel,
        errors::DhtError,
        processor::DhtProcessor,
        provider::provider_key,
        rpc::{DhtMessageClient, DhtRequest, DhtResponse},
        types::{NetworkInfo, Peer, ProviderNotification},
        DhtConfig,
    },
    record::{Record, StoreApi},
    types::{RecordMeta, RecordRef},
};

macro_rules! ensure_response {
    ($response:expr, $matcher:pat => $statement:expr) => {
        match $response {
            $matcher => $statement,
            _ => Err(DhtError::Error("Unexpected".into())),
        }
    };
}

/// The overlay-network surface the routing layer depends on. [DhtNode] is
/// the production implementation; tests substitute recording fakes.
#[async_trait]
pub trait DhtClient: Send + Sync {
    /// The local peer's identity
    fn peer_id(&self) -> &PeerId;

    /// Snapshot current connectivity
    async fn network_info(&self) -> Result<NetworkInfo, DhtError>;

    /// Whether the routing table holds at least one peer
    async fn has_peers(&self) -> Result<bool, DhtError>;

    /// Insert peers into the routing table. At least one peer is needed to
    /// join an existing network
    async fn add_peers(&self, peers: Vec<Multiaddr>) -> Result<(), DhtError>;

    /// Listen for incoming connections on `address`, returning the bound
    /// p2p address
    async fn listen(&self, address: Multiaddr) -> Result<Multiaddr, DhtError>;

    /// Refresh the routing table against known peers
    async fn bootstrap(&self) -> Result<(), DhtError>;

    /// The node's first listening address as a `/p2p/`-suffixed address,
    /// if it is listening at all
    async fn p2p_address(&self) -> Result<Option<Multiaddr>, DhtError>;

    /// Currently connected peers
    async fn peers(&self) -> Result<Vec<Peer>, DhtError>;

    /// Announce this node as a provider of `cid`
    async fn provide(&self, cid: &Cid) -> Result<(), DhtError>;

    /// Find peers providing `cid`
    async fn providers(&self, cid: &Cid) -> Result<Vec<Peer>, DhtError>;

    /// Ask `peer` for a record's metadata
    async fn lookup(&self, peer: PeerId, record_ref: &RecordRef)
        -> Result<RecordMeta, DhtError>;

    /// Ask `peer` for a record's full content
    async fn pull(&self, peer: PeerId, record_ref: &RecordRef) -> Result<Record, DhtError>;

    /// Hand out the provider-notification stream. Yields [None] after the
    /// first call; there is exactly one consumer
    fn take_provider_events(&self) -> Option<mpsc::Receiver<ProviderNotification>>;
}

/// A node that participates in the directory overlay network.
///
/// Wraps a [DhtProcessor] running on its own task; all interaction happens
/// over a message channel, so the handle is cheap to share.
pub struct DhtNode {
    config: DhtConfig,
    client: DhtMessageClient,
    provider_events: Mutex<Option<mpsc::Receiver<ProviderNotification>>>,
    thread_handle: tokio::task::JoinHandle<Result<(), DhtError>>,
    peer_id: PeerId,
}

impl DhtNode {
    /// Spawn a node from its identity keypair. `store` answers record
    /// lookup/pull RPCs issued by other peers.
    pub fn new(
        keypair: &libp2p::identity::Keypair,
        config: DhtConfig,
        store: Arc<dyn StoreApi>,
    ) -> Result<Self, DhtError> {
        let peer_id = PeerId::from(keypair.public());

        let (notification_tx, notification_rx) =
            mpsc::channel(config.notification_channel_size);
        let channels = message_channel();
        let thread_handle = DhtProcessor::spawn(
            keypair,
            peer_id,
            config.clone(),
            store,
            notification_tx,
            channels.1,
        )?;

        Ok(DhtNode {
            peer_id,
            config,
            client: channels.0,
            provider_events: Mutex::new(Some(notification_rx)),
            thread_handle,
        })
    }

    /// Returns a reference to the [DhtConfig] used to initialize this node.
    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    async fn send_request(&self, request: DhtRequest) -> Result<DhtResponse, DhtError> {
        self.client
            .send(request)
            .await
            .map_err(DhtError::from)
            .and_then(|res| res)
    }
}

#[async_trait]
impl DhtClient for DhtNode {
    fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    async fn network_info(&self) -> Result<NetworkInfo, DhtError> {
        let response = self.send_request(DhtRequest::GetNetworkInfo).await?;
        ensure_response!(response, DhtResponse::GetNetworkInfo(info) => Ok(info))
    }

    async fn has_peers(&self) -> Result<bool, DhtError> {
        let info = self.network_info().await?;
        Ok(info.num_in_routing_table > 0)
    }

    async fn add_peers(&self, peers: Vec<Multiaddr>) -> Result<(), DhtError> {
        let response = self.send_request(DhtRequest::AddPeers { peers }).await?;
        ensure_response!(response, DhtResponse::Success => Ok(()))
    }

    async fn listen(&self, address: Multiaddr) -> Result<Multiaddr, DhtError> {
        let response = self
            .send_request(DhtRequest::StartListening { address })
            .await?;
        ensure_response!(response, DhtResponse::Address(addr) => Ok(addr))
    }

    async fn bootstrap(&self) -> Result<(), DhtError> {
        let response = self.send_request(DhtRequest::Bootstrap).await?;
        ensure_response!(response, DhtResponse::Success => Ok(()))
    }

    async fn p2p_address(&self) -> Result<Option<Multiaddr>, DhtError> {
        let response = self.send_request(DhtRequest::GetAddresses).await?;
        let mut addresses =
            ensure_response!(response, DhtResponse::GetAddresses(addresses) => Ok(addresses))?;
        if addresses.is_empty() {
            Ok(None)
        } else {
            Ok(Some(make_p2p_address(
                addresses.swap_remove(0),
                self.peer_id,
            )))
        }
    }

    async fn peers(&self) -> Result<Vec<Peer>, DhtError> {
        let response = self.send_request(DhtRequest::GetPeers).await?;
        ensure_response!(response, DhtResponse::GetPeers(peers) => Ok(peers))
    }

    async fn provide(&self, cid: &Cid) -> Result<(), DhtError> {
        let response = self
            .send_request(DhtRequest::StartProviding {
                key: provider_key(cid),
            })
            .await?;
        ensure_response!(response, DhtResponse::Success => Ok(()))
    }

    async fn providers(&self, cid: &Cid) -> Result<Vec<Peer>, DhtError> {
        let response = self
            .send_request(DhtRequest::GetProviders {
                key: provider_key(cid),
            })
            .await?;
        ensure_response!(response, DhtResponse::Providers { providers } => Ok(providers))
    }

    async fn lookup(
        &self,
        peer: PeerId,
        record_ref: &RecordRef,
    ) -> Result<RecordMeta, DhtError> {
        let response = self
            .send_request(DhtRequest::LookupRecord {
                peer,
                record_ref: record_ref.clone(),
            })
            .await?;
        ensure_response!(response, DhtResponse::RecordMeta(meta) => Ok(meta))
    }

    async fn pull(&self, peer: PeerId, record_ref: &RecordRef) -> Result<Record, DhtError> {
        let response = self
            .send_request(DhtRequest::PullRecord {
                peer,
                record_ref: record_ref.clone(),
            })
            .await?;
        ensure_response!(response, DhtResponse::Record(record) => Ok(record))
    }

    fn take_provider_events(&self) -> Option<mpsc::Receiver<ProviderNotification>> {
        self.provider_events
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or(None)
    }
}

/// Append the `/p2p/<peer-id>` suffix to a listening address.
pub fn make_p2p_address(mut addr: Multiaddr, peer_id: PeerId) -> Multiaddr {
    addr.push(Protocol::P2p(peer_id));
    addr
}

impl Drop for DhtNode {
    fn drop(&mut self) {
        self.thread_handle.abort();
    }
}
