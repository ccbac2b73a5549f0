use cid::Cid;
use libp2p::{kad::ProviderRecord, PeerId};
use multihash::Multihash;
use tokio::sync::mpsc::{error::TrySendError, Sender};

use crate::{
    dht::types::{Peer, ProviderNotification},
    types::RecordRef,
};

/// Raw codec, the multicodec records are addressed under.
const RAW_CODEC: u64 = 0x55;

/// Translates provider announcements surfaced by the DHT into internal
/// notifications on a bounded channel.
///
/// The DHT delivers announcements on its own processing loop, which must not
/// block; when the channel is full the announcement is dropped. Providers
/// re-announce on their republish cadence, so a dropped notification only
/// delays discovery.
pub struct ProviderEventHandler {
    local_peer_id: PeerId,
    sender: Sender<ProviderNotification>,
}

impl ProviderEventHandler {
    pub fn new(local_peer_id: PeerId, sender: Sender<ProviderNotification>) -> Self {
        ProviderEventHandler {
            local_peer_id,
            sender,
        }
    }

    /// Process one provider record received from the DHT.
    pub fn handle(&self, record: &ProviderRecord) {
        if record.provider == self.local_peer_id {
            return;
        }

        let cid = match cid_from_provider_key(record.key.as_ref()) {
            Some(cid) => cid,
            None => {
                debug!(
                    "Ignoring provider announcement with undecodable key from {}",
                    record.provider
                );
                return;
            }
        };
        if cid.is_empty() {
            return;
        }

        let notification = ProviderNotification {
            record_ref: RecordRef::new(cid),
            peer: Peer {
                peer_id: record.provider,
                addrs: record.addresses.clone(),
            },
        };

        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(notification)) => {
                warn!(
                    "Provider notification channel full; dropping announcement of {} from {}",
                    notification.record_ref, notification.peer.peer_id
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Provider notification channel closed");
            }
        }
    }
}

/// Provider keys carry the record CID's multihash; rebuild the CID string
/// from it. Records are addressed as CIDv1/raw.
pub fn cid_from_provider_key(key: &[u8]) -> Option<String> {
    let hash = Multihash::from_bytes(key).ok()?;
    Some(Cid::new_v1(RAW_CODEC, hash).to_string())
}

/// The provider key a record CID is announced under.
pub fn provider_key(cid: &Cid) -> Vec<u8> {
    cid.hash().to_bytes()
}
