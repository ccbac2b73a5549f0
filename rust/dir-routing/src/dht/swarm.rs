use std::time::Duration;

use libp2p::{
    connection_limits::{self, ConnectionLimits},
    identify,
    identity::Keypair,
    kad, mdns, noise,
    request_response::{self, ProtocolSupport},
    swarm::behaviour::toggle::Toggle,
    swarm::NetworkBehaviour,
    tcp, yamux, PeerId, StreamProtocol,
};

use crate::{
    config::{KAD_PROTOCOL, RENDEZVOUS_STRING, RPC_PROTOCOL},
    dht::{
        errors::DhtError,
        rpc::{RpcRequest, RpcResponse},
        DhtConfig,
    },
};

/// The composed network behaviour of a directory node: Kademlia provider
/// routing, identify-based address exchange, optional local-network mDNS
/// discovery, the record RPC, and connection limiting.
#[derive(NetworkBehaviour)]
pub struct DirBehaviour {
    pub identify: identify::Behaviour,
    pub kad: kad::Behaviour<kad::store::MemoryStore>,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub rpc: request_response::cbor::Behaviour<RpcRequest, RpcResponse>,
    pub limits: connection_limits::Behaviour,
}

impl DirBehaviour {
    pub fn new(
        keypair: &Keypair,
        local_peer_id: PeerId,
        config: &DhtConfig,
    ) -> Result<Self, std::io::Error> {
        let kad = {
            let mut cfg = kad::Config::default();
            cfg.set_protocol_names(vec![StreamProtocol::new(KAD_PROTOCOL)]);
            cfg.set_query_timeout(Duration::from_secs(config.query_timeout.into()));
            // Surface inbound provider records to the processor instead of
            // silently accepting them into the store.
            cfg.set_record_filtering(kad::StoreInserts::FilterBoth);
            cfg.set_provider_record_ttl(Some(config.provider_record_ttl));
            // Re-announcement is owned by the maintenance suite.
            cfg.set_provider_publication_interval(None);

            let store = kad::store::MemoryStore::new(local_peer_id);
            kad::Behaviour::with_config(local_peer_id, store, cfg)
        };

        let identify = {
            let config = identify::Config::new(RENDEZVOUS_STRING.into(), keypair.public())
                .with_agent_version(format!("dir/{}", env!("CARGO_PKG_VERSION")));
            identify::Behaviour::new(config)
        };

        let mdns = if config.enable_mdns {
            Some(mdns::tokio::Behaviour::new(
                mdns::Config::default(),
                local_peer_id,
            )?)
        } else {
            None
        };

        let rpc = request_response::cbor::Behaviour::new(
            [(StreamProtocol::new(RPC_PROTOCOL), ProtocolSupport::Full)],
            request_response::Config::default(),
        );

        let limits = connection_limits::Behaviour::new(
            ConnectionLimits::default().with_max_established(Some(config.max_connections)),
        );

        Ok(DirBehaviour {
            identify,
            kad,
            mdns: Toggle::from(mdns),
            rpc,
            limits,
        })
    }
}

pub type DirSwarm = libp2p::swarm::Swarm<DirBehaviour>;

/// Builds a configured [libp2p::swarm::Swarm] instance on the tokio runtime.
pub fn build_swarm(keypair: &Keypair, config: &DhtConfig) -> Result<DirSwarm, DhtError> {
    let local_peer_id = PeerId::from(keypair.public());
    let behaviour = DirBehaviour::new(keypair, local_peer_id, config)?;

    let swarm = libp2p::SwarmBuilder::with_existing_identity(keypair.clone())
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|error| DhtError::Error(error.to_string()))?
        .with_dns()
        .map_err(|error| DhtError::Error(error.to_string()))?
        .with_behaviour(move |_| behaviour)
        .map_err(|error| DhtError::Error(error.to_string()))?
        .with_swarm_config(|swarm_config| {
            swarm_config.with_idle_connection_timeout(config.connection_grace_period)
        })
        .build();

    Ok(swarm)
}
