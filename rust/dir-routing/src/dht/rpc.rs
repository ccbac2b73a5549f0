use std::fmt;

use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};

use crate::{
    dht::{
        channel::{Message, MessageClient, MessageProcessor},
        errors::DhtError,
        types::{NetworkInfo, Peer},
    },
    record::Record,
    types::{RecordMeta, RecordRef},
};

/// Requests accepted by the [crate::dht::DhtProcessor].
#[derive(Debug)]
pub enum DhtRequest {
    /// Insert peers into the routing table
    AddPeers {
        /// p2p multiaddresses, peer ID suffix included
        peers: Vec<Multiaddr>,
    },
    /// Listen for incoming connections on an address
    StartListening {
        /// The address to listen on
        address: Multiaddr,
    },
    /// Refresh the routing table against known peers
    Bootstrap,
    /// Enumerate the node's listening addresses
    GetAddresses,
    /// Snapshot current connectivity
    GetNetworkInfo,
    /// Enumerate connected peers
    GetPeers,
    /// Announce this node as a provider for `key`
    StartProviding {
        /// Provider key (a record CID's multihash bytes)
        key: Vec<u8>,
    },
    /// Find peers providing `key`
    GetProviders {
        /// Provider key (a record CID's multihash bytes)
        key: Vec<u8>,
    },
    /// Ask `peer` for a record's metadata
    LookupRecord {
        /// The peer to ask
        peer: PeerId,
        /// The record to look up
        record_ref: RecordRef,
    },
    /// Ask `peer` for a record's full content
    PullRecord {
        /// The peer to ask
        peer: PeerId,
        /// The record to pull
        record_ref: RecordRef,
    },
}

impl fmt::Display for DhtRequest {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhtRequest::AddPeers { peers } => {
                write!(fmt, "DhtRequest::AddPeers {{ peers={peers:?} }}")
            }
            DhtRequest::StartListening { address } => {
                write!(fmt, "DhtRequest::StartListening {{ address={address:?} }}")
            }
            DhtRequest::Bootstrap => write!(fmt, "DhtRequest::Bootstrap"),
            DhtRequest::GetAddresses => write!(fmt, "DhtRequest::GetAddresses"),
            DhtRequest::GetNetworkInfo => write!(fmt, "DhtRequest::GetNetworkInfo"),
            DhtRequest::GetPeers => write!(fmt, "DhtRequest::GetPeers"),
            DhtRequest::StartProviding { key } => {
                write!(fmt, "DhtRequest::StartProviding {{ key={key:?} }}")
            }
            DhtRequest::GetProviders { key } => {
                write!(fmt, "DhtRequest::GetProviders {{ key={key:?} }}")
            }
            DhtRequest::LookupRecord { peer, record_ref } => write!(
                fmt,
                "DhtRequest::LookupRecord {{ peer={peer}, cid={record_ref} }}"
            ),
            DhtRequest::PullRecord { peer, record_ref } => write!(
                fmt,
                "DhtRequest::PullRecord {{ peer={peer}, cid={record_ref} }}"
            ),
        }
    }
}

/// Responses emitted by the [crate::dht::DhtProcessor].
#[derive(Debug)]
pub enum DhtResponse {
    /// The request completed with nothing to report
    Success,
    /// The address the node is now listening on
    Address(Multiaddr),
    /// The node's current listening addresses
    GetAddresses(Vec<Multiaddr>),
    /// Current connectivity
    GetNetworkInfo(NetworkInfo),
    /// Connected peers
    GetPeers(Vec<Peer>),
    /// Providers found for a key
    Providers {
        /// The providing peers
        providers: Vec<Peer>,
    },
    /// A record's metadata, as served by a remote peer
    RecordMeta(RecordMeta),
    /// A record's full content, as served by a remote peer
    Record(Record),
}

impl fmt::Display for DhtResponse {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhtResponse::Success => write!(fmt, "DhtResponse::Success"),
            DhtResponse::Address(address) => {
                write!(fmt, "DhtResponse::Address {{ {address:?} }}")
            }
            DhtResponse::GetAddresses(addresses) => {
                write!(fmt, "DhtResponse::GetAddresses {{ {addresses:?} }}")
            }
            DhtResponse::GetNetworkInfo(info) => {
                write!(fmt, "DhtResponse::GetNetworkInfo {info:?}")
            }
            DhtResponse::GetPeers(peers) => write!(fmt, "DhtResponse::GetPeers {peers:?}"),
            DhtResponse::Providers { providers } => {
                write!(fmt, "DhtResponse::Providers {{ providers={providers:?} }}")
            }
            DhtResponse::RecordMeta(meta) => {
                write!(fmt, "DhtResponse::RecordMeta {{ cid={} }}", meta.cid)
            }
            DhtResponse::Record(record) => {
                write!(fmt, "DhtResponse::Record {{ cid={} }}", record.cid())
            }
        }
    }
}

pub type DhtMessage = Message<DhtRequest, DhtResponse, DhtError>;
pub type DhtMessageProcessor = MessageProcessor<DhtRequest, DhtResponse, DhtError>;
pub type DhtMessageClient = MessageClient<DhtRequest, DhtResponse, DhtError>;

/// The peer RPC wire request, exchanged over the directory RPC protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Request a record's metadata
    Lookup(RecordRef),
    /// Request a record's full content
    Pull(RecordRef),
}

/// The peer RPC wire response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcResponse {
    /// Metadata for a looked-up record
    Meta(RecordMeta),
    /// A pulled record
    Record(Record),
    /// The serving peer does not hold the record
    NotFound(String),
    /// The serving peer failed to answer
    Error(String),
}
