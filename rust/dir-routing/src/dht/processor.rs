use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use libp2p::{
    futures::StreamExt,
    identify,
    kad::{self, store::RecordStore, RecordKey},
    mdns,
    multiaddr::Protocol,
    request_response::{self, OutboundRequestId},
    swarm::{
        dial_opts::{DialOpts, PeerCondition},
        SwarmEvent,
    },
    Multiaddr, PeerId,
};
use tokio::sync::mpsc::Sender;

use crate::{
    dht::{
        errors::DhtError,
        provider::ProviderEventHandler,
        rpc::{DhtMessage, DhtMessageProcessor, DhtRequest, DhtResponse, RpcRequest, RpcResponse},
        swarm::{build_swarm, DirBehaviourEvent, DirSwarm},
        types::{NetworkInfo, Peer, ProviderNotification},
        DhtConfig,
    },
    record::StoreApi,
};

/// The processing component of a [crate::dht::DhtNode]/[DhtProcessor] pair.
/// Consumers should only interface with a [DhtProcessor] via
/// [crate::dht::DhtNode].
pub struct DhtProcessor {
    config: DhtConfig,
    peer_id: PeerId,
    processor: DhtMessageProcessor,
    swarm: DirSwarm,
    kad_requests: HashMap<kad::QueryId, DhtMessage>,
    rpc_requests: HashMap<OutboundRequestId, DhtMessage>,
    last_dialed_peer: Option<PeerId>,
    provider_events: ProviderEventHandler,
    store: Arc<dyn StoreApi>,
    active_listener: Option<libp2p::core::transport::ListenerId>,
    pending_listener_request: Option<DhtMessage>,
}

// Requests that map to kad queries are parked here until the query result
// arrives; synchronous failures respond immediately.
macro_rules! store_request {
    ($self:expr, $message:expr, $result:expr) => {
        let result: Result<kad::QueryId, DhtError> = $result.map_err(|e| e.into());
        match result {
            Ok(query_id) => {
                $self.kad_requests.insert(query_id, $message);
            }
            Err(e) => {
                $message.respond(Err(e));
            }
        };
    };
}

impl DhtProcessor {
    /// Creates a new [DhtProcessor] and spawns a networking task for
    /// processing. The processor can only be accessed through channels via
    /// the corresponding [crate::dht::DhtNode].
    pub(crate) fn spawn(
        keypair: &libp2p::identity::Keypair,
        peer_id: PeerId,
        config: DhtConfig,
        store: Arc<dyn StoreApi>,
        notifications: Sender<ProviderNotification>,
        processor: DhtMessageProcessor,
    ) -> Result<tokio::task::JoinHandle<Result<(), DhtError>>, DhtError> {
        let mut swarm = build_swarm(keypair, &config)?;
        // Directory nodes always answer queries and accept provider
        // records; without this, kad stays in client mode until an
        // external address is confirmed.
        swarm
            .behaviour_mut()
            .kad
            .set_mode(Some(kad::Mode::Server));
        let provider_events = ProviderEventHandler::new(peer_id, notifications);

        let mut node = DhtProcessor {
            peer_id,
            config,
            processor,
            swarm,
            kad_requests: HashMap::default(),
            rpc_requests: HashMap::default(),
            last_dialed_peer: None,
            provider_events,
            store,
            active_listener: None,
            pending_listener_request: None,
        };

        Ok(tokio::spawn(async move { node.process().await }))
    }

    /// Begin processing requests and connections on the network in the
    /// current task. Executes until all clients are dropped.
    async fn process(&mut self) -> Result<(), DhtError> {
        // Queue up bootstrapping this node both immediately, and every
        // `bootstrap_interval` seconds.
        let mut bootstrap_tick =
            tokio::time::interval(Duration::from_secs(self.config.bootstrap_interval));

        // Traverse and potentially dial peers on this interval.
        let mut peer_dialing_tick =
            tokio::time::interval(Duration::from_secs(self.config.peer_dialing_interval));

        loop {
            tokio::select! {
                message = self.processor.pull_message() => {
                    match message {
                        Some(m) => self.process_message(m).await,
                        // This occurs when sender is closed (client dropped).
                        // Exit the process loop for task clean up.
                        None => {
                            debug!("DHT processing loop closed");
                            break
                        },
                    }
                }
                event = self.swarm.select_next_some() => {
                    self.process_swarm_event(event).await
                }
                _ = bootstrap_tick.tick() => self.execute_bootstrap(),
                _ = peer_dialing_tick.tick() => self.dial_next_peer(),
            }
        }
        Ok(())
    }

    /// Processes an incoming [DhtMessage]. Will attempt to respond
    /// immediately if possible, otherwise the message is parked against its
    /// query or RPC id and fulfilled when the result arrives.
    async fn process_message(&mut self, message: DhtMessage) {
        trace!("dht request: {}", message.request);

        match message.request {
            DhtRequest::AddPeers { ref peers } => {
                self.add_peers(peers);
                message.respond(Ok(DhtResponse::Success));
            }
            DhtRequest::StartListening { ref address } => {
                if let Err(e) = self.listen(address) {
                    message.respond(Err(e));
                } else {
                    if let Some(current_pending) = self.pending_listener_request.take() {
                        current_pending.respond(Err(DhtError::Error(String::from(
                            "Subsequent listener request overrides previous request.",
                        ))));
                    }
                    self.pending_listener_request = Some(message);
                }
            }
            DhtRequest::Bootstrap => {
                self.execute_bootstrap();
                message.respond(Ok(DhtResponse::Success));
            }
            DhtRequest::GetAddresses => {
                let listeners: Vec<Multiaddr> =
                    self.swarm.listeners().map(|addr| addr.to_owned()).collect();
                message.respond(Ok(DhtResponse::GetAddresses(listeners)));
            }
            DhtRequest::GetNetworkInfo => {
                let info = self.swarm.network_info();
                let num_in_routing_table = self.routing_table_size();
                message.respond(Ok(DhtResponse::GetNetworkInfo(NetworkInfo::new(
                    info,
                    num_in_routing_table,
                ))));
            }
            DhtRequest::GetPeers => {
                let peers = self
                    .swarm
                    .connected_peers()
                    .map(|peer_id| Peer {
                        peer_id: peer_id.to_owned(),
                        addrs: Vec::new(),
                    })
                    .collect();
                message.respond(Ok(DhtResponse::GetPeers(peers)));
            }
            DhtRequest::StartProviding { ref key } => {
                store_request!(
                    self,
                    message,
                    self.swarm
                        .behaviour_mut()
                        .kad
                        .start_providing(RecordKey::new(key))
                );
            }
            DhtRequest::GetProviders { ref key } => {
                store_request!(
                    self,
                    message,
                    Ok::<kad::QueryId, DhtError>(
                        self.swarm
                            .behaviour_mut()
                            .kad
                            .get_providers(RecordKey::new(key))
                    )
                );
            }
            DhtRequest::LookupRecord {
                peer,
                ref record_ref,
            } => {
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .rpc
                    .send_request(&peer, RpcRequest::Lookup(record_ref.clone()));
                self.rpc_requests.insert(request_id, message);
            }
            DhtRequest::PullRecord {
                peer,
                ref record_ref,
            } => {
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .rpc
                    .send_request(&peer, RpcRequest::Pull(record_ref.clone()));
                self.rpc_requests.insert(request_id, message);
            }
        };
    }

    /// Processes an incoming swarm event, fulfilling any parked request the
    /// event completes.
    async fn process_swarm_event(&mut self, event: SwarmEvent<DirBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(DirBehaviourEvent::Kad(e)) => self.process_kad_event(e),
            SwarmEvent::Behaviour(DirBehaviourEvent::Identify(e)) => {
                self.process_identify_event(e)
            }
            SwarmEvent::Behaviour(DirBehaviourEvent::Mdns(e)) => self.process_mdns_event(e),
            SwarmEvent::Behaviour(DirBehaviourEvent::Rpc(e)) => self.process_rpc_event(e).await,
            // Uninhabited: the limiter emits no events.
            SwarmEvent::Behaviour(DirBehaviourEvent::Limits(_)) => {}
            SwarmEvent::NewListenAddr {
                address: new_address,
                listener_id: new_listener_id,
            } => {
                let matches_pending = match (
                    self.active_listener.as_ref(),
                    self.pending_listener_request.as_ref(),
                ) {
                    (Some(active_listener), Some(_)) => &new_listener_id == active_listener,
                    _ => false,
                };

                if matches_pending {
                    if let Some(pending) = self.pending_listener_request.take() {
                        let mut address = new_address.clone();
                        address.push(Protocol::P2p(self.peer_id));
                        pending.respond(Ok(DhtResponse::Address(address)));
                    }
                }
            }
            _ => {}
        }
    }

    fn process_kad_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed { id, result, .. } => match result {
                kad::QueryResult::StartProviding(Ok(kad::AddProviderOk { .. })) => {
                    if let Some(message) = self.kad_requests.remove(&id) {
                        message.respond(Ok(DhtResponse::Success));
                    }
                }
                kad::QueryResult::StartProviding(Err(e)) => {
                    if let Some(message) = self.kad_requests.remove(&id) {
                        message.respond(Err(DhtError::from(e)));
                    }
                }
                kad::QueryResult::GetProviders(Ok(result)) => match result {
                    kad::GetProvidersOk::FoundProviders { providers, .. } => {
                        // Respond once we find any providers for now.
                        if !providers.is_empty() {
                            if let Some(message) = self.kad_requests.remove(&id) {
                                message.respond(Ok(DhtResponse::Providers {
                                    providers: providers
                                        .into_iter()
                                        .map(|peer_id| Peer {
                                            peer_id,
                                            addrs: Vec::new(),
                                        })
                                        .collect(),
                                }));
                            }
                        }
                    }
                    kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. } => {
                        // If this message has not been responded to yet, then
                        // no providers have been discovered.
                        if let Some(message) = self.kad_requests.remove(&id) {
                            message.respond(Ok(DhtResponse::Providers {
                                providers: Vec::new(),
                            }));
                        }
                    }
                },
                kad::QueryResult::GetProviders(Err(e)) => {
                    if let Some(message) = self.kad_requests.remove(&id) {
                        message.respond(Err(DhtError::from(e)));
                    }
                }
                kad::QueryResult::Bootstrap(Ok(kad::BootstrapOk { .. })) => {}
                kad::QueryResult::Bootstrap(Err(kad::BootstrapError::Timeout { .. })) => {}
                _ => {}
            },
            kad::Event::InboundRequest { request } => {
                if let kad::InboundRequest::AddProvider { record } = request {
                    // Record filtering is enabled, so announcements arrive
                    // here for manual handling: store the provider record,
                    // then surface the announcement as a notification.
                    match record {
                        Some(record) => {
                            self.provider_events.handle(&record);
                            if let Err(e) =
                                self.swarm.behaviour_mut().kad.store_mut().add_provider(record)
                            {
                                warn!("InboundRequest::AddProvider write failed: {e}");
                            }
                        }
                        None => warn!("InboundRequest::AddProvider failed; empty record"),
                    }
                }
            }
            _ => {}
        }
    }

    fn process_identify_event(&mut self, event: identify::Event) {
        if let identify::Event::Received { peer_id, info } = event {
            if info
                .protocols
                .iter()
                .any(|p| p.as_ref() == crate::config::KAD_PROTOCOL)
            {
                for addr in &info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .kad
                        .add_address(&peer_id, addr.clone());
                }
            }
        }
    }

    fn process_mdns_event(&mut self, event: mdns::Event) {
        if let mdns::Event::Discovered(peers) = event {
            for (peer_id, address) in peers {
                if peer_id != self.peer_id {
                    self.swarm.behaviour_mut().kad.add_address(&peer_id, address);
                }
            }
        }
    }

    async fn process_rpc_event(
        &mut self,
        event: request_response::Event<RpcRequest, RpcResponse>,
    ) {
        match event {
            request_response::Event::Message { peer, message } => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    let response = self.serve_rpc_request(request).await;
                    if self
                        .swarm
                        .behaviour_mut()
                        .rpc
                        .send_response(channel, response)
                        .is_err()
                    {
                        warn!("RPC response to {peer} dropped; channel closed");
                    }
                }
                request_response::Message::Response {
                    request_id,
                    response,
                } => {
                    if let Some(message) = self.rpc_requests.remove(&request_id) {
                        message.respond(match response {
                            RpcResponse::Meta(meta) => Ok(DhtResponse::RecordMeta(meta)),
                            RpcResponse::Record(record) => Ok(DhtResponse::Record(record)),
                            RpcResponse::NotFound(m) => Err(DhtError::NotFound(m)),
                            RpcResponse::Error(m) => Err(DhtError::RpcFailure(m)),
                        });
                    }
                }
            },
            request_response::Event::OutboundFailure {
                request_id, error, ..
            } => {
                if let Some(message) = self.rpc_requests.remove(&request_id) {
                    message.respond(Err(DhtError::from(error)));
                }
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                debug!("inbound RPC from {peer} failed: {error}");
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }

    /// Answer a peer's record request from the local store.
    async fn serve_rpc_request(&mut self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::Lookup(record_ref) => match self.store.lookup(&record_ref).await {
                Ok(meta) => RpcResponse::Meta(meta),
                Err(crate::RoutingError::NotFound(m)) => RpcResponse::NotFound(m),
                Err(e) => RpcResponse::Error(e.to_string()),
            },
            RpcRequest::Pull(record_ref) => match self.store.pull(&record_ref).await {
                Ok(record) => RpcResponse::Record(record),
                Err(crate::RoutingError::NotFound(m)) => RpcResponse::NotFound(m),
                Err(e) => RpcResponse::Error(e.to_string()),
            },
        }
    }

    /// Traverses the kbuckets to dial potential peers that
    /// are not yet connected.
    fn dial_next_peer(&mut self) {
        let connected: HashSet<PeerId> = self.swarm.connected_peers().cloned().collect();

        let mut to_dial = None;
        'outer: for kbucket in self.swarm.behaviour_mut().kad.kbuckets() {
            // find the first disconnected node not dialed last round
            for entry in kbucket.iter() {
                let peer_id = *entry.node.key.preimage();
                if !connected.contains(&peer_id) && self.last_dialed_peer != Some(peer_id) {
                    to_dial = Some((peer_id, entry.node.value.clone().into_vec()));
                    break 'outer;
                }
            }
        }

        if let Some((peer_id, addresses)) = to_dial {
            let dial_opts = DialOpts::peer_id(peer_id)
                .condition(PeerCondition::Disconnected)
                .addresses(addresses)
                .extend_addresses_through_behaviour()
                .build();
            if let Err(e) = self.swarm.dial(dial_opts) {
                warn!("failed to dial: {:?}", e);
            }
            self.last_dialed_peer = Some(peer_id);
        }
    }

    /// Starts listening on the provided address.
    fn listen(&mut self, address: &Multiaddr) -> Result<(), DhtError> {
        self.stop_listening();
        let listener_id = self.swarm.listen_on(address.to_owned())?;
        self.active_listener = Some(listener_id);
        Ok(())
    }

    fn stop_listening(&mut self) {
        if let Some(active_listener) = self.active_listener.take() {
            self.swarm.remove_listener(active_listener);
        }
    }

    /// Adds peers to the routing table.
    fn add_peers(&mut self, peers: &[Multiaddr]) {
        for multiaddress in peers {
            let mut addr = multiaddress.to_owned();
            if let Some(Protocol::P2p(peer_id)) = addr.pop() {
                // Do not add a peer with the same peer id, for example
                // a set of N bootstrap nodes using a static list of
                // N addresses/peer IDs.
                if peer_id != self.peer_id {
                    self.swarm.behaviour_mut().kad.add_address(&peer_id, addr);
                }
            }
        }
    }

    fn routing_table_size(&mut self) -> usize {
        self.swarm
            .behaviour_mut()
            .kad
            .kbuckets()
            .map(|kbucket| kbucket.num_entries())
            .sum()
    }

    fn execute_bootstrap(&mut self) {
        // `NoKnownPeers` is expected without any bootstrap peers.
        let _ = self.swarm.behaviour_mut().kad.bootstrap();
    }
}

impl std::fmt::Debug for DhtProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtProcessor")
            .field("peer_id", &self.peer_id)
            .field("config", &self.config)
            .finish()
    }
}
