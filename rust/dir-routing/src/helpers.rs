//! Utilities shared by unit and integration tests: an in-memory record
//! store, a recording network fake and record fixtures.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use cid::Cid;
use dir_storage::{KeyValueStore, Store};
use libp2p::{Multiaddr, PeerId};
use multihash::{Code, MultihashDigest};
use serde_json::json;
use tokio::sync::mpsc;

use crate::{
    dht::{DhtClient, DhtError, NetworkInfo, Peer, ProviderNotification},
    error::RoutingError,
    labels::{extract_labels, LabelKey},
    metadata::LabelMetadata,
    record::{Record, StoreApi},
    types::{RecordMeta, RecordRef},
};

/// Raw codec, matching how record bytes are content-addressed.
const RAW_CODEC: u64 = 0x55;

/// A content-addressed record whose payload advertises the given skills.
pub fn record_with_skills(name: &str, skills: &[&str]) -> Record {
    let data = json!({
        "schema_version": "v1",
        "name": name,
        "skills": skills.iter().map(|skill| json!({ "name": skill })).collect::<Vec<_>>(),
    });
    let bytes = serde_json::to_vec(&data).expect("serializable payload");
    let cid = Cid::new_v1(RAW_CODEC, Code::Sha2_256.digest(&bytes));
    Record::new(cid.to_string(), data)
}

/// Collect every item from a result stream.
pub async fn drain<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    items
}

/// Write `record`'s labels into `index` as if they had been pull-cached
/// from `peer_id`.
pub async fn seed_remote_labels<S: Store>(
    index: &S,
    record: &Record,
    peer_id: &str,
) -> anyhow::Result<()> {
    seed_remote_labels_with(index, record, peer_id, LabelMetadata::now()).await
}

/// Like [seed_remote_labels], with caller-controlled metadata.
pub async fn seed_remote_labels_with<S: Store>(
    index: &S,
    record: &Record,
    peer_id: &str,
    metadata: LabelMetadata,
) -> anyhow::Result<()> {
    let mut index = index.clone();
    for label in extract_labels(record) {
        let key = LabelKey::new(label, record.cid(), peer_id).to_string();
        index.set_key(&key, metadata).await?;
    }
    Ok(())
}

/// An in-memory [StoreApi], standing in for the external record store.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<HashMap<String, Record>>>,
}

impl MemoryRecordStore {
    /// A store already holding the given records
    pub fn with_records(records: &[Record]) -> Self {
        let store = MemoryRecordStore::default();
        {
            let mut held = store.records.lock().expect("lock poisoned");
            for record in records {
                held.insert(record.cid().to_string(), record.clone());
            }
        }
        store
    }

    /// Drop a record, simulating out-of-band deletion
    pub fn delete(&self, cid: &str) {
        self.records.lock().expect("lock poisoned").remove(cid);
    }
}

#[async_trait]
impl StoreApi for MemoryRecordStore {
    async fn lookup(&self, record_ref: &RecordRef) -> Result<RecordMeta, RoutingError> {
        self.records
            .lock()
            .expect("lock poisoned")
            .get(&record_ref.cid)
            .map(Record::meta)
            .ok_or_else(|| RoutingError::not_found(format!("record {record_ref} not stored")))
    }

    async fn pull(&self, record_ref: &RecordRef) -> Result<Record, RoutingError> {
        self.records
            .lock()
            .expect("lock poisoned")
            .get(&record_ref.cid)
            .cloned()
            .ok_or_else(|| RoutingError::not_found(format!("record {record_ref} not stored")))
    }

    async fn push(&self, record: &Record) -> Result<RecordRef, RoutingError> {
        self.records
            .lock()
            .expect("lock poisoned")
            .insert(record.cid().to_string(), record.clone());
        Ok(record.reference())
    }
}

/// A [DhtClient] fake that records provider announcements and serves
/// configured records over the RPC surface.
pub struct RecordingDht {
    peer_id: PeerId,
    has_peers: bool,
    provided: Mutex<Vec<String>>,
    served: Mutex<HashMap<String, Record>>,
    providers: Mutex<Vec<Peer>>,
}

impl RecordingDht {
    /// A fake whose routing table reports peers iff `has_peers`
    pub fn new(has_peers: bool) -> Self {
        RecordingDht {
            peer_id: PeerId::random(),
            has_peers,
            provided: Mutex::new(Vec::new()),
            served: Mutex::new(HashMap::new()),
            providers: Mutex::new(Vec::new()),
        }
    }

    /// Serve `record` on the lookup/pull RPC surface
    pub fn serving(self, record: Record) -> Self {
        self.served
            .lock()
            .expect("lock poisoned")
            .insert(record.cid().to_string(), record);
        self
    }

    /// Report `peers` as providers of every CID
    pub fn with_providers(self, peers: Vec<Peer>) -> Self {
        *self.providers.lock().expect("lock poisoned") = peers;
        self
    }

    /// CIDs announced through [DhtClient::provide], in order
    pub fn provided(&self) -> Vec<String> {
        self.provided.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl DhtClient for RecordingDht {
    fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    async fn network_info(&self) -> Result<NetworkInfo, DhtError> {
        Ok(NetworkInfo {
            num_in_routing_table: usize::from(self.has_peers),
            ..NetworkInfo::default()
        })
    }

    async fn has_peers(&self) -> Result<bool, DhtError> {
        Ok(self.has_peers)
    }

    async fn add_peers(&self, _peers: Vec<Multiaddr>) -> Result<(), DhtError> {
        Ok(())
    }

    async fn listen(&self, address: Multiaddr) -> Result<Multiaddr, DhtError> {
        Ok(address)
    }

    async fn bootstrap(&self) -> Result<(), DhtError> {
        Ok(())
    }

    async fn p2p_address(&self) -> Result<Option<Multiaddr>, DhtError> {
        Ok(None)
    }

    async fn peers(&self) -> Result<Vec<Peer>, DhtError> {
        Ok(Vec::new())
    }

    async fn provide(&self, cid: &Cid) -> Result<(), DhtError> {
        self.provided
            .lock()
            .expect("lock poisoned")
            .push(cid.to_string());
        Ok(())
    }

    async fn providers(&self, _cid: &Cid) -> Result<Vec<Peer>, DhtError> {
        Ok(self.providers.lock().expect("lock poisoned").clone())
    }

    async fn lookup(
        &self,
        _peer: PeerId,
        record_ref: &RecordRef,
    ) -> Result<RecordMeta, DhtError> {
        self.served
            .lock()
            .expect("lock poisoned")
            .get(&record_ref.cid)
            .map(Record::meta)
            .ok_or_else(|| DhtError::NotFound(format!("record {record_ref} not served")))
    }

    async fn pull(&self, _peer: PeerId, record_ref: &RecordRef) -> Result<Record, DhtError> {
        self.served
            .lock()
            .expect("lock poisoned")
            .get(&record_ref.cid)
            .cloned()
            .ok_or_else(|| DhtError::NotFound(format!("record {record_ref} not served")))
    }

    fn take_provider_events(&self) -> Option<mpsc::Receiver<ProviderNotification>> {
        None
    }
}
