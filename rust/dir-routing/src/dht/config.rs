use std::time::Duration;

use crate::config::{
    CONN_MGR_GRACE_PERIOD, CONN_MGR_HIGH_WATER, CONN_MGR_LOW_WATER, NOTIFICATION_CHANNEL_SIZE,
    RECORD_TTL, REFRESH_INTERVAL,
};

/// Configuration for the overlay-network adapter. Listening addresses and
/// bootstrap peers are driven through the node API by whoever owns the
/// node (see [crate::RouterBuilder]).
#[derive(Clone, Debug)]
pub struct DhtConfig {
    /// How often, in seconds, the routing table is refreshed against
    /// bootstrap peers.
    pub bootstrap_interval: u64,
    /// How frequently, in seconds, disconnected peers found in the kbuckets
    /// are dialed. Outside of tests, should not be lower than 5 seconds.
    pub peer_dialing_interval: u64,
    /// How long, in seconds, until an unsuccessful query times out.
    pub query_timeout: u32,
    /// How long provider records remain valid on peers.
    pub provider_record_ttl: Duration,
    /// Capacity of the provider-notification channel.
    pub notification_channel_size: usize,
    /// Whether local-network mDNS discovery participates.
    pub enable_mdns: bool,
    /// Upper bound on established connections.
    pub max_connections: u32,
    /// Target the connection count is trimmed back towards.
    pub min_connections: u32,
    /// How long an idle connection is held before being closed.
    pub connection_grace_period: Duration,
}

impl Default for DhtConfig {
    /// Creates a new [DhtConfig] with defaults applied.
    fn default() -> Self {
        Self {
            bootstrap_interval: REFRESH_INTERVAL.as_secs(),
            peer_dialing_interval: 5,
            query_timeout: 5 * 60,
            provider_record_ttl: RECORD_TTL,
            notification_channel_size: NOTIFICATION_CHANNEL_SIZE,
            enable_mdns: true,
            max_connections: CONN_MGR_HIGH_WATER,
            min_connections: CONN_MGR_LOW_WATER,
            connection_grace_period: CONN_MGR_GRACE_PERIOD,
        }
    }
}
