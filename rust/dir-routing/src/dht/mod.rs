//! The overlay-network adapter: a Kademlia DHT host providing record
//! announcements, provider discovery and the peer record RPC.

mod channel;
mod config;
mod errors;
mod keys;
mod node;
mod processor;
mod provider;
mod rpc;
mod swarm;
mod types;

pub use config::DhtConfig;
pub use errors::DhtError;
pub use keys::load_or_generate_keypair;
pub use node::{make_p2p_address, DhtClient, DhtNode};
pub use provider::{cid_from_provider_key, provider_key, ProviderEventHandler};
pub use types::{NetworkInfo, Peer, ProviderNotification};
