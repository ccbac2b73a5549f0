use libp2p::{swarm::NetworkInfo as LibP2pNetworkInfo, Multiaddr, PeerId};
use serde::{Deserialize, Serialize};

use crate::types::{PeerInfo, RecordRef};

/// A snapshot of the node's connectivity.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Number of distinct connected peers
    pub num_peers: usize,
    /// Number of connections, pending and established
    pub num_connections: u32,
    /// Number of connections being established
    pub num_pending: u32,
    /// Number of fully established connections
    pub num_established: u32,
    /// Number of peers present in the routing table
    pub num_in_routing_table: usize,
}

impl NetworkInfo {
    pub(crate) fn new(info: LibP2pNetworkInfo, num_in_routing_table: usize) -> Self {
        let c = info.connection_counters();
        NetworkInfo {
            num_peers: info.num_peers(),
            num_connections: c.num_connections(),
            num_pending: c.num_pending(),
            num_established: c.num_established(),
            num_in_routing_table,
        }
    }
}

/// A peer on the overlay network.
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize, Clone)]
pub struct Peer {
    /// The peer's identity
    pub peer_id: PeerId,
    /// Addresses the peer is known to be reachable at
    pub addrs: Vec<Multiaddr>,
}

impl From<&Peer> for PeerInfo {
    fn from(peer: &Peer) -> Self {
        PeerInfo {
            id: peer.peer_id.to_base58(),
            addrs: peer.addrs.iter().map(|addr| addr.to_string()).collect(),
        }
    }
}

/// An internal notification that a remote peer announced itself as a
/// provider of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderNotification {
    /// The record being provided
    pub record_ref: RecordRef,
    /// The announcing peer
    pub peer: Peer,
}
