use std::{path::PathBuf, time::Duration};

use libp2p::Multiaddr;

/// How long a provider record stays alive on the DHT before peers expire it.
pub const RECORD_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// How often locally-advertised records are re-announced. Kept at 75% of
/// [RECORD_TTL] so a missed cycle does not let provider records lapse.
pub const REPUBLISH_INTERVAL: Duration = Duration::from_secs(36 * 60 * 60);

/// How often stale remote labels are swept from the local index.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(48 * 60 * 60);

/// A remote label not re-announced within this window is stale.
pub const MAX_LABEL_AGE: Duration = Duration::from_secs(72 * 60 * 60);

/// How often the DHT refreshes its routing table against bootstrap peers.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the provider-notification channel. Announcements beyond this
/// backlog are dropped; provider records are best-effort and re-announced.
pub const NOTIFICATION_CHANNEL_SIZE: usize = 1000;

/// Hop budget carried by recursive peer crawls. Reserved in the protocol
/// surface; the search path does not currently recurse.
pub const MAX_HOPS: u32 = 20;

/// Minimum number of `/`-separated parts in a well-formed label key.
pub const MIN_LABEL_KEY_PARTS: usize = 5;

/// Score threshold applied when a search request leaves it unset.
pub const DEFAULT_MIN_MATCH_SCORE: u32 = 1;

/// Connection-manager low watermark.
pub const CONN_MGR_LOW_WATER: u32 = 50;

/// Connection-manager high watermark; connections beyond it are refused.
pub const CONN_MGR_HIGH_WATER: u32 = 200;

/// Grace period before a young connection is eligible for pruning.
pub const CONN_MGR_GRACE_PERIOD: Duration = Duration::from_secs(2 * 60);

/// Priority tag applied to bootstrap peers so they survive pruning.
pub const PEER_PRIORITY_BOOTSTRAP: u32 = 100;

/// Protocol prefix shared by every directory protocol identifier.
pub const PROTOCOL_PREFIX: &str = "dir";

/// Rendezvous string exchanged during identify.
pub const RENDEZVOUS_STRING: &str = "dir/connect";

/// Service name advertised for local-network discovery.
pub const MDNS_SERVICE_NAME: &str = "agntcy-dir-local-discovery";

/// Kademlia protocol identifier.
pub const KAD_PROTOCOL: &str = "/dir/kad/1.0.0";

/// Peer RPC protocol identifier (record lookup and pull).
pub const RPC_PROTOCOL: &str = "/dir/rpc/1.0.0";

/// Top-level configuration for a [crate::Router].
#[derive(Clone, Debug)]
pub struct RoutingConfig {
    /// Address to listen on for incoming peer connections. `None` leaves the
    /// node in client-only mode.
    pub listen_address: Option<Multiaddr>,
    /// Addresses of peers used to join the network.
    pub bootstrap_peers: Vec<Multiaddr>,
    /// Where the long-lived Ed25519 identity key is persisted. A fresh key
    /// is generated (and written here) when the file does not exist; with no
    /// path configured the identity is ephemeral.
    pub identity_key_path: Option<PathBuf>,
    /// How often the DHT routing table is refreshed.
    pub refresh_interval: Duration,
    /// How often locally-advertised records are re-announced.
    pub republish_interval: Duration,
    /// How often stale remote labels are swept.
    pub cleanup_interval: Duration,
    /// Age beyond which a remote label is considered stale.
    pub max_label_age: Duration,
    /// Whether mDNS local-network discovery is enabled.
    pub enable_mdns: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            bootstrap_peers: Vec::new(),
            identity_key_path: None,
            refresh_interval: REFRESH_INTERVAL,
            republish_interval: REPUBLISH_INTERVAL,
            cleanup_interval: CLEANUP_INTERVAL,
            max_label_age: MAX_LABEL_AGE,
            enable_mdns: true,
        }
    }
}
