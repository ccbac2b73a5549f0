use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dir_storage::{BatchOperation, Store};
use tokio_util::sync::CancellationToken;

use crate::{
    config::RoutingConfig,
    error::RoutingError,
    labels::{LabelKey, LABEL_PREFIXES},
    local::{record_key, RECORDS_PREFIX},
    metadata::LabelMetadata,
    record::{Record, StoreApi},
    types::RecordRef,
};

/// The publish path injected into [Maintenance], breaking the dependency
/// cycle between re-announcement and the router that owns publishing.
#[async_trait]
pub trait RecordAnnouncer: Send + Sync {
    /// Re-run the publish path for an already-stored record
    async fn announce(&self, record: &Record) -> Result<(), RoutingError>;
}

/// The background upkeep suite: periodic provider republishing, stale
/// remote-label cleanup, and orphan-record cleanup (invoked from the
/// republish pass when the external store has lost a record).
///
/// Every loop survives per-iteration errors; the only exit is cancellation.
pub struct Maintenance<S: Store> {
    index: S,
    store: Arc<dyn StoreApi>,
    announcer: Arc<dyn RecordAnnouncer>,
    local_peer_id: String,
    republish_interval: Duration,
    cleanup_interval: Duration,
    max_label_age: Duration,
}

impl<S: Store + 'static> Maintenance<S> {
    /// Assemble the suite; nothing runs until [Maintenance::spawn]
    pub fn new(
        index: S,
        store: Arc<dyn StoreApi>,
        announcer: Arc<dyn RecordAnnouncer>,
        local_peer_id: String,
        config: &RoutingConfig,
    ) -> Self {
        Maintenance {
            index,
            store,
            announcer,
            local_peer_id,
            republish_interval: config.republish_interval,
            cleanup_interval: config.cleanup_interval,
            max_label_age: config.max_label_age,
        }
    }

    /// Start the republish and cleanup loops, both tied to `token`.
    pub fn spawn(self, token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let this = Arc::new(self);

        let republish = {
            let this = this.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(this.republish_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tick.tick() => {
                            if let Err(error) = this.republish_once().await {
                                warn!("Republish pass failed: {error}");
                            }
                        }
                    }
                }
                debug!("Republish loop stopped");
            })
        };

        let cleanup = {
            let this = this.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(this.cleanup_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tick.tick() => {
                            if let Err(error) = this.cleanup_once().await {
                                warn!("Stale-label cleanup failed: {error}");
                            }
                        }
                    }
                }
                debug!("Cleanup loop stopped");
            })
        };

        vec![republish, cleanup]
    }

    /// One republish pass: verify each advertised record still exists in
    /// the external store, clean up the ones that do not, re-announce the
    /// rest.
    pub async fn republish_once(&self) -> Result<(), RoutingError> {
        let records = self.index.scan_prefix(RECORDS_PREFIX.as_bytes()).await?;
        debug!("Republishing {} records", records.len());

        for (key, _) in records {
            let cid = match String::from_utf8(key)
                .ok()
                .and_then(|key| key.strip_prefix(RECORDS_PREFIX).map(str::to_string))
            {
                Some(cid) if !cid.is_empty() => cid,
                _ => {
                    warn!("Skipping malformed record key during republish");
                    continue;
                }
            };
            let record_ref = RecordRef::new(&cid);

            match self.store.lookup(&record_ref).await {
                Err(RoutingError::NotFound(_)) => {
                    info!("Record {cid} vanished from the store; cleaning up");
                    if let Err(error) = self.cleanup_orphan(&cid).await {
                        warn!("Orphan cleanup for {cid} failed: {error}");
                    }
                    continue;
                }
                Err(error) => {
                    warn!("Could not verify record {cid}: {error}");
                    continue;
                }
                Ok(_) => {}
            }

            let record = match self.store.pull(&record_ref).await {
                Ok(record) => record,
                Err(error) => {
                    warn!("Could not load record {cid} for republish: {error}");
                    continue;
                }
            };

            if let Err(error) = self.announcer.announce(&record).await {
                warn!("Re-announcing record {cid} failed: {error}");
            }
        }

        Ok(())
    }

    /// One cleanup pass over the pull-cached remote labels: drop entries
    /// that are stale, malformed, or carry invalid metadata. Locally-owned
    /// labels are never touched here.
    pub async fn cleanup_once(&self) -> Result<(), RoutingError> {
        let mut expired: Vec<BatchOperation> = Vec::new();

        for prefix in LABEL_PREFIXES {
            for (key_bytes, value) in self.index.scan_prefix(prefix.as_bytes()).await? {
                let key = match String::from_utf8(key_bytes.clone()) {
                    Ok(key) => key,
                    Err(_) => {
                        expired.push(BatchOperation::Delete { key: key_bytes });
                        continue;
                    }
                };

                let parsed = match LabelKey::parse(&key) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        warn!("Deleting malformed label key '{key}': {error}");
                        expired.push(BatchOperation::delete(key.as_bytes()));
                        continue;
                    }
                };
                if parsed.peer_id() == self.local_peer_id {
                    continue;
                }

                let stale = match serde_json::from_slice::<LabelMetadata>(&value) {
                    Ok(metadata) => {
                        metadata.validate().is_err() || metadata.is_stale(self.max_label_age)
                    }
                    Err(_) => true,
                };
                if stale {
                    debug!("Deleting stale remote label '{key}'");
                    expired.push(BatchOperation::delete(key.as_bytes()));
                }
            }
        }

        if !expired.is_empty() {
            info!("Removing {} stale remote labels", expired.len());
            let mut index = self.index.clone();
            index.apply_batch(expired).await?;
        }

        Ok(())
    }

    /// Remove every trace of a record whose bytes the store has lost: its
    /// advertisement marker and all of its locally-owned label keys, in one
    /// batch.
    async fn cleanup_orphan(&self, cid: &str) -> Result<(), RoutingError> {
        let mut batch = vec![BatchOperation::delete(record_key(cid).as_bytes())];

        for prefix in LABEL_PREFIXES {
            for (key_bytes, _) in self.index.scan_prefix(prefix.as_bytes()).await? {
                let key = match String::from_utf8(key_bytes) {
                    Ok(key) => key,
                    Err(_) => continue,
                };
                if let Ok(parsed) = LabelKey::parse(&key) {
                    if parsed.cid() == cid && parsed.peer_id() == self.local_peer_id {
                        batch.push(BatchOperation::delete(key.as_bytes()));
                    }
                }
            }
        }

        let mut index = self.index.clone();
        index.apply_batch(batch).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        helpers::{record_with_skills, seed_remote_labels_with, MemoryRecordStore},
        local::LocalRouting,
    };
    use dir_storage::MemoryStore;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    const LOCAL_PEER: &str = "12D3KooWLocalPeer";

    #[derive(Default)]
    struct RecordingAnnouncer {
        announced: Mutex<Vec<String>>,
    }

    impl RecordingAnnouncer {
        fn announced(&self) -> Vec<String> {
            self.announced.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl RecordAnnouncer for RecordingAnnouncer {
        async fn announce(&self, record: &Record) -> Result<(), RoutingError> {
            self.announced
                .lock()
                .expect("lock poisoned")
                .push(record.cid().to_string());
            Ok(())
        }
    }

    fn maintenance(
        index: &MemoryStore,
        store: &MemoryRecordStore,
        announcer: &Arc<RecordingAnnouncer>,
    ) -> Maintenance<MemoryStore> {
        Maintenance::new(
            index.clone(),
            Arc::new(store.clone()),
            announcer.clone(),
            LOCAL_PEER.to_string(),
            &RoutingConfig::default(),
        )
    }

    fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs()
    }

    #[test_log::test(tokio::test)]
    async fn republish_reannounces_surviving_records() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let record = record_with_skills("kept", &["AI/ML"]);
        let store = MemoryRecordStore::with_records(&[record.clone()]);
        let local = LocalRouting::new(index.clone(), LOCAL_PEER.to_string());
        local.publish(&record).await?;

        let announcer = Arc::new(RecordingAnnouncer::default());
        maintenance(&index, &store, &announcer)
            .republish_once()
            .await?;

        assert_eq!(announcer.announced(), vec![record.cid().to_string()]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn republish_cleans_up_orphaned_records() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let orphan = record_with_skills("orphan", &["AI/ML", "NLP"]);
        let kept = record_with_skills("kept", &["Vision"]);
        let store = MemoryRecordStore::with_records(&[orphan.clone(), kept.clone()]);

        let local = LocalRouting::new(index.clone(), LOCAL_PEER.to_string());
        local.publish(&orphan).await?;
        local.publish(&kept).await?;

        // The record's bytes vanish out-of-band.
        store.delete(orphan.cid());

        let announcer = Arc::new(RecordingAnnouncer::default());
        maintenance(&index, &store, &announcer)
            .republish_once()
            .await?;

        // No advertisement marker, no label keys, no announcement.
        assert!(index
            .read(record_key(orphan.cid()).as_bytes())
            .await?
            .is_none());
        for key in index.stored_keys().await {
            let key = String::from_utf8(key)?;
            assert!(!key.contains(orphan.cid()), "index still contains '{key}'");
        }
        assert_eq!(announcer.announced(), vec![kept.cid().to_string()]);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn cleanup_removes_stale_remote_labels() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let store = MemoryRecordStore::default();
        let now = unix_now();

        let stale_record = record_with_skills("stale", &["Old/Skill"]);
        seed_remote_labels_with(
            &index,
            &stale_record,
            "12D3KooWRemotePeerOne",
            LabelMetadata {
                timestamp: now - 74 * 60 * 60,
                last_seen: now - 73 * 60 * 60,
            },
        )
        .await?;

        let fresh_record = record_with_skills("fresh", &["New/Skill"]);
        seed_remote_labels_with(
            &index,
            &fresh_record,
            "12D3KooWRemotePeerOne",
            LabelMetadata {
                timestamp: now - 2 * 60 * 60,
                last_seen: now - 60 * 60,
            },
        )
        .await?;

        let announcer = Arc::new(RecordingAnnouncer::default());
        maintenance(&index, &store, &announcer).cleanup_once().await?;

        let keys: Vec<String> = index
            .stored_keys()
            .await
            .into_iter()
            .filter_map(|key| String::from_utf8(key).ok())
            .collect();
        assert!(!keys.iter().any(|key| key.contains(stale_record.cid())));
        assert!(keys.iter().any(|key| key.contains(fresh_record.cid())));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn cleanup_spares_local_labels_and_drops_corruption() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let store = MemoryRecordStore::default();
        let now = unix_now();

        // A local label well past the stale window: never touched here.
        let local_record = record_with_skills("mine", &["AI"]);
        seed_remote_labels_with(
            &index,
            &local_record,
            LOCAL_PEER,
            LabelMetadata {
                timestamp: now - 200 * 60 * 60,
                last_seen: now - 199 * 60 * 60,
            },
        )
        .await?;

        // A malformed key and an unparseable metadata blob: corruption.
        let mut writable = index.clone();
        writable.write(b"/skills/orphaned-parts", b"{}").await?;
        writable
            .write(
                b"/skills/x/bafyremote/12D3KooWRemotePeerOne",
                b"not json",
            )
            .await?;

        let announcer = Arc::new(RecordingAnnouncer::default());
        maintenance(&index, &store, &announcer).cleanup_once().await?;

        let keys: Vec<String> = index
            .stored_keys()
            .await
            .into_iter()
            .filter_map(|key| String::from_utf8(key).ok())
            .collect();
        assert!(keys.iter().any(|key| key.contains(local_record.cid())));
        assert!(!keys.iter().any(|key| key == "/skills/orphaned-parts"));
        assert!(!keys
            .iter()
            .any(|key| key == "/skills/x/bafyremote/12D3KooWRemotePeerOne"));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn loops_stop_on_cancellation() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let store = MemoryRecordStore::default();
        let announcer = Arc::new(RecordingAnnouncer::default());

        let token = CancellationToken::new();
        let handles = maintenance(&index, &store, &announcer).spawn(token.clone());

        token.cancel();
        for handle in handles {
            handle.await?;
        }
        Ok(())
    }
}
