use std::fmt;
use std::io;

use libp2p::{kad, request_response::OutboundFailure, TransportError};

use crate::dht::channel::ChannelError;

/// Failures surfaced by the DHT adapter.
#[derive(Debug)]
pub enum DhtError {
    /// Generic adapter failure
    Error(String),
    /// An I/O failure beneath the transport
    Io(io::ErrorKind),
    /// A record or provider set could not be found on the network
    NotFound(String),
    /// A transport-level dial or listen failure
    LibP2pTransportError(Option<libp2p::Multiaddr>),
    /// The kad provider store refused a record
    LibP2pStorageError(kad::store::Error),
    /// A provider announcement query failed
    LibP2pAddProviderError(kad::AddProviderError),
    /// A provider enumeration query failed
    LibP2pGetProvidersError(kad::GetProvidersError),
    /// A peer RPC could not be delivered or answered
    RpcFailure(String),
    /// The node has no peers to issue the request against
    NoKnownPeers,
}

impl std::error::Error for DhtError {}
impl fmt::Display for DhtError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhtError::NoKnownPeers => write!(fmt, "no known peers"),
            DhtError::NotFound(m) => write!(fmt, "not found: {m}"),
            DhtError::LibP2pTransportError(e) => write!(fmt, "{e:#?}"),
            DhtError::LibP2pStorageError(e) => write!(fmt, "{e:#?}"),
            DhtError::LibP2pAddProviderError(e) => write!(fmt, "{e:#?}"),
            DhtError::LibP2pGetProvidersError(e) => write!(fmt, "{e:#?}"),
            DhtError::RpcFailure(m) => write!(fmt, "rpc failure: {m}"),
            DhtError::Io(k) => write!(fmt, "{k:#?}"),
            DhtError::Error(m) => write!(fmt, "{m}"),
        }
    }
}

impl From<ChannelError> for DhtError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::RecvError => DhtError::Error("RecvError".into()),
            ChannelError::SendError => DhtError::Error("SendError".into()),
        }
    }
}

impl From<anyhow::Error> for DhtError {
    fn from(e: anyhow::Error) -> Self {
        DhtError::Error(e.to_string())
    }
}

impl From<io::Error> for DhtError {
    fn from(e: io::Error) -> Self {
        DhtError::Io(e.kind())
    }
}

impl<TErr> From<TransportError<TErr>> for DhtError {
    fn from(e: TransportError<TErr>) -> Self {
        match e {
            TransportError::MultiaddrNotSupported(addr) => {
                DhtError::LibP2pTransportError(Some(addr))
            }
            TransportError::Other(_) => DhtError::LibP2pTransportError(None),
        }
    }
}

impl From<kad::store::Error> for DhtError {
    fn from(e: kad::store::Error) -> Self {
        DhtError::LibP2pStorageError(e)
    }
}

impl From<kad::AddProviderError> for DhtError {
    fn from(e: kad::AddProviderError) -> Self {
        DhtError::LibP2pAddProviderError(e)
    }
}

impl From<kad::GetProvidersError> for DhtError {
    fn from(e: kad::GetProvidersError) -> Self {
        DhtError::LibP2pGetProvidersError(e)
    }
}

impl From<OutboundFailure> for DhtError {
    fn from(e: OutboundFailure) -> Self {
        DhtError::RpcFailure(e.to_string())
    }
}
