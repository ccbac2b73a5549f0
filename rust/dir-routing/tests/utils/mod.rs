#![cfg(test)]
use std::{future::Future, sync::Arc, time::Duration};

use dir_routing::{
    helpers::MemoryRecordStore, Multiaddr, Router, RouterBuilder, RoutingConfig,
};
use dir_storage::MemoryStore;
use rand::{thread_rng, Rng};

pub fn generate_listening_addr() -> Multiaddr {
    format!(
        "/ip4/127.0.0.1/tcp/{}",
        thread_rng().gen_range(49152..65535)
    )
    .parse()
    .expect("parseable")
}

pub async fn wait_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub async fn await_or_timeout<T>(
    timeout_ms: u64,
    future: impl Future<Output = T>,
    message: String,
) -> T {
    tokio::select! {
        _ = wait_ms(timeout_ms) => { panic!("timed out: {}", message); }
        result = future => { result }
    }
}

pub struct TestNode {
    pub router: Router<MemoryStore>,
    pub index: MemoryStore,
    pub store: MemoryRecordStore,
    pub address: Multiaddr,
}

/// Build a network-enabled router listening on a random loopback port.
/// mDNS is disabled so tests only see the peers they wire up explicitly.
pub async fn create_test_node(bootstrap_peers: &[Multiaddr]) -> TestNode {
    let index = MemoryStore::default();
    let store = MemoryRecordStore::default();
    let config = RoutingConfig {
        enable_mdns: false,
        ..RoutingConfig::default()
    };

    let router = RouterBuilder::default()
        .config(config)
        .index(&index)
        .store(Arc::new(store.clone()))
        .listen_address(generate_listening_addr())
        .bootstrap_peers(bootstrap_peers)
        .build()
        .await
        .expect("router builds");

    let address = router
        .dht()
        .p2p_address()
        .await
        .expect("addresses readable")
        .expect("node is listening");

    TestNode {
        router,
        index,
        store,
        address,
    }
}

/// Async function returns once the node's routing table holds at least
/// `requested_peers` peers.
pub async fn wait_for_peers(node: &TestNode, requested_peers: usize) {
    loop {
        let info = node
            .router
            .dht()
            .network_info()
            .await
            .expect("network info");
        if info.num_in_routing_table >= requested_peers {
            return;
        }
        wait_ms(200).await;
    }
}
