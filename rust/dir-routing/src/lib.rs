//! Peer-to-peer record discovery for the distributed record directory.
//!
//! Records are immutable, JSON-described artifacts addressed by CID. A peer
//! [publishes](RoutingApi::publish) a record so others may discover it,
//! [lists](RoutingApi::list) records known locally,
//! [searches](RoutingApi::search) for records cached from remote peers, and
//! [unpublishes](RoutingApi::unpublish) records it no longer advertises.
//!
//! Discovery is pull-based: announcing a record writes nothing but a
//! provider entry to the Kademlia DHT. Peers that observe the announcement
//! fetch the record over RPC, extract its labels (skills, domains, modules,
//! locators) and cache them in their own local index, where queries are
//! evaluated.

#[macro_use]
extern crate tracing;

mod builder;
mod config;
pub mod dht;
mod error;
pub mod helpers;
mod labels;
mod local;
mod maintenance;
mod metadata;
mod metrics;
mod query;
mod record;
mod remote;
mod router;
mod types;

pub use builder::RouterBuilder;
pub use config::*;
pub use dht::{DhtClient, DhtConfig, NetworkInfo, Peer};
pub use error::RoutingError;
pub use labels::{Label, LabelKind, LabelKey};
pub use libp2p::{multiaddr::Multiaddr, PeerId};
pub use local::LocalRouting;
pub use maintenance::{Maintenance, RecordAnnouncer};
pub use metadata::LabelMetadata;
pub use metrics::LabelMetrics;
pub use query::deduplicate_queries;
pub use record::{Record, RecordContent, StoreApi};
pub use remote::RemoteRouting;
pub use router::Router;
pub use types::{
    ListRequest, ListResponse, PeerInfo, ProviderResponse, QueryKind, RecordMeta, RecordQuery,
    RecordRef, RoutingApi, SearchRequest, SearchResponse,
};
