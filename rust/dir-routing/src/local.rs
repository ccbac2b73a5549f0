use dir_storage::{BatchOperation, Store};
use tokio::sync::mpsc;

use crate::{
    error::RoutingError,
    labels::{extract_labels, Label, LabelKey, LABEL_PREFIXES},
    metadata::LabelMetadata,
    metrics::LabelMetrics,
    query::{deduplicate_queries, matches_all},
    record::Record,
    types::{ListRequest, ListResponse, RecordRef},
};

/// Key prefix under which advertised record CIDs are tracked.
pub(crate) const RECORDS_PREFIX: &str = "/records/";

pub(crate) fn record_key(cid: &str) -> String {
    format!("{RECORDS_PREFIX}{cid}")
}

/// Capacity of a list/search result stream. Producers block when the
/// consumer falls this far behind.
pub(crate) const STREAM_BUFFER: usize = 32;

/// Publish, unpublish and enumerate records against the local index.
///
/// Index layout: `/records/<CID>` marks an advertised record; each of its
/// labels lives at `/<namespace>/<value>/<CID>/<local-peer>` with
/// [LabelMetadata] as the value; `/metrics` aggregates per-label counts.
#[derive(Clone)]
pub struct LocalRouting<S: Store> {
    index: S,
    local_peer_id: String,
}

impl<S: Store + 'static> LocalRouting<S> {
    /// A local routing surface writing to `index` on behalf of the peer
    /// identified by `local_peer_id`
    pub fn new(index: S, local_peer_id: String) -> Self {
        LocalRouting {
            index,
            local_peer_id,
        }
    }

    /// Advertise `record` locally: track its CID, index its labels, bump
    /// metrics. Republishing an already-advertised record is a no-op.
    pub async fn publish(&self, record: &Record) -> Result<(), RoutingError> {
        let cid = validated_cid(record)?;

        let mut index = self.index.clone();
        let mut metrics = LabelMetrics::load(&index).await?;

        if index.read(record_key(cid).as_bytes()).await?.is_some() {
            debug!("Record {cid} is already published; nothing to do");
            return Ok(());
        }

        let mut batch = vec![BatchOperation::put(record_key(cid).as_bytes(), b"")];

        let metadata = serde_json::to_vec(&LabelMetadata::now())
            .map_err(|error| RoutingError::internal(error.to_string()))?;
        for label in extract_labels(record) {
            let key = LabelKey::new(label.clone(), cid, &self.local_peer_id).to_string();
            batch.push(BatchOperation::put(key.as_bytes(), &metadata));
            metrics.increment(&label);
        }

        index.apply_batch(batch).await?;
        metrics.update(&mut index).await?;

        info!("Published record {cid}");
        Ok(())
    }

    /// Withdraw `record`: drop its CID marker, its local label keys and
    /// their metric counts. Succeeds even when keys are already absent.
    pub async fn unpublish(&self, record: &Record) -> Result<(), RoutingError> {
        let cid = validated_cid(record)?;

        let mut index = self.index.clone();
        let mut metrics = LabelMetrics::load(&index).await?;

        let mut batch = vec![BatchOperation::delete(record_key(cid).as_bytes())];
        for label in extract_labels(record) {
            let key = LabelKey::new(label.clone(), cid, &self.local_peer_id).to_string();
            batch.push(BatchOperation::delete(key.as_bytes()));
            metrics.decrement(&label);
        }

        index.apply_batch(batch).await?;
        metrics.update(&mut index).await?;

        info!("Unpublished record {cid}");
        Ok(())
    }

    /// Stream locally-published records matching every query term. Honours
    /// `request.limit` (0 means unlimited); the channel closes when
    /// enumeration completes or the receiver is dropped.
    pub async fn list(
        &self,
        request: ListRequest,
    ) -> Result<mpsc::Receiver<ListResponse>, RoutingError> {
        let queries = deduplicate_queries(request.queries);
        let limit = request.limit;
        let index = self.index.clone();
        let local_peer_id = self.local_peer_id.clone();

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let records = match index.scan_prefix(RECORDS_PREFIX.as_bytes()).await {
                Ok(records) => records,
                Err(error) => {
                    error!("Record enumeration failed: {error}");
                    return;
                }
            };

            let mut emitted: u32 = 0;
            for (key, _) in records {
                let cid = match String::from_utf8(key)
                    .ok()
                    .and_then(|key| key.strip_prefix(RECORDS_PREFIX).map(str::to_string))
                {
                    Some(cid) if !cid.is_empty() => cid,
                    _ => {
                        warn!("Skipping malformed record key during list");
                        continue;
                    }
                };

                let labels =
                    match labels_for(&index, &cid, &local_peer_id).await {
                        Ok(labels) => labels,
                        Err(error) => {
                            warn!("Skipping record {cid}: {error}");
                            continue;
                        }
                    };

                if !matches_all(&queries, &labels) {
                    continue;
                }

                let response = ListResponse {
                    record_ref: RecordRef::new(&cid),
                    labels: labels.iter().map(Label::to_string).collect(),
                };
                if tx.send(response).await.is_err() {
                    // Receiver dropped; the caller cancelled.
                    return;
                }

                emitted += 1;
                if limit > 0 && emitted >= limit {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

/// Gather the labels stored for `(cid, peer_id)` by scanning every label
/// namespace. Unreadable entries are skipped.
pub(crate) async fn labels_for<S: Store>(
    index: &S,
    cid: &str,
    peer_id: &str,
) -> Result<Vec<Label>, RoutingError> {
    let mut labels = Vec::new();
    for prefix in LABEL_PREFIXES {
        for (key, _) in index.scan_prefix(prefix.as_bytes()).await? {
            let key = match String::from_utf8(key) {
                Ok(key) => key,
                Err(_) => continue,
            };
            match LabelKey::parse(&key) {
                Ok(parsed) if parsed.cid() == cid && parsed.peer_id() == peer_id => {
                    labels.push(parsed.label().clone());
                }
                Ok(_) => {}
                Err(error) => {
                    warn!("Skipping malformed label key '{key}': {error}");
                }
            }
        }
    }
    Ok(labels)
}

fn validated_cid(record: &Record) -> Result<&str, RoutingError> {
    let cid = record.cid();
    if cid.is_empty() {
        return Err(RoutingError::invalid_argument("record CID must not be empty"));
    }
    Ok(cid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        helpers::{drain, record_with_skills},
        types::RecordQuery,
    };
    use dir_storage::MemoryStore;

    fn routing(index: &MemoryStore) -> LocalRouting<MemoryStore> {
        LocalRouting::new(index.clone(), "12D3KooWLocalPeer".to_string())
    }

    #[test_log::test(tokio::test)]
    async fn it_publishes_lists_and_unpublishes() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let local = routing(&index);
        let r1 = record_with_skills("r1", &["category1/class1"]);
        let r2 = record_with_skills("r2", &["category1/class1", "category2/class2"]);

        local.publish(&r1).await?;
        local.publish(&r2).await?;

        let responses = drain(
            local
                .list(ListRequest {
                    queries: vec![RecordQuery::skill("category1/class1")],
                    limit: 0,
                })
                .await?,
        )
        .await;
        let mut cids: Vec<_> = responses
            .iter()
            .map(|r| r.record_ref.cid.clone())
            .collect();
        cids.sort();
        let mut expected = vec![r1.cid().to_string(), r2.cid().to_string()];
        expected.sort();
        assert_eq!(cids, expected);

        let responses = drain(
            local
                .list(ListRequest {
                    queries: vec![RecordQuery::skill("category2")],
                    limit: 0,
                })
                .await?,
        )
        .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].record_ref.cid, r2.cid());

        local.unpublish(&r2).await?;
        let responses = drain(
            local
                .list(ListRequest {
                    queries: vec![RecordQuery::skill("category2")],
                    limit: 0,
                })
                .await?,
        )
        .await;
        assert!(responses.is_empty());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_applies_and_semantics_across_queries() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let local = routing(&index);
        let r2 = record_with_skills("r2", &["category1/class1", "category2/class2"]);
        local.publish(&r2).await?;

        let matched = drain(
            local
                .list(ListRequest {
                    queries: vec![
                        RecordQuery::skill("category1/class1"),
                        RecordQuery::skill("category2/class2"),
                    ],
                    limit: 0,
                })
                .await?,
        )
        .await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].record_ref.cid, r2.cid());

        let unmatched = drain(
            local
                .list(ListRequest {
                    queries: vec![
                        RecordQuery::skill("category1/class1"),
                        RecordQuery::skill("category3"),
                    ],
                    limit: 0,
                })
                .await?,
        )
        .await;
        assert!(unmatched.is_empty());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn republishing_is_idempotent() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let local = routing(&index);
        let record = record_with_skills("r", &["AI/ML"]);

        local.publish(&record).await?;
        let once = index.stored_keys().await;
        let metrics_once = LabelMetrics::load(&index).await?;

        local.publish(&record).await?;
        local.publish(&record).await?;
        assert_eq!(index.stored_keys().await, once);
        assert_eq!(LabelMetrics::load(&index).await?, metrics_once);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn publish_then_unpublish_leaves_no_trace() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let local = routing(&index);
        let record = record_with_skills("r", &["AI/ML", "NLP"]);

        local.publish(&record).await?;
        local.unpublish(&record).await?;

        let keys = index.stored_keys().await;
        for key in keys {
            let key = String::from_utf8(key)?;
            assert!(
                !key.contains(record.cid()),
                "index still contains '{key}'"
            );
        }
        assert!(LabelMetrics::load(&index).await?.is_empty());

        // Unpublishing again still succeeds.
        local.unpublish(&record).await?;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_rejects_records_without_a_cid() {
        let index = MemoryStore::default();
        let local = routing(&index);
        let record = Record::new("", serde_json::json!({}));

        let result = local.publish(&record).await;
        assert!(matches!(result, Err(RoutingError::InvalidArgument(_))));
    }

    #[test_log::test(tokio::test)]
    async fn an_empty_query_list_returns_every_record() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let local = routing(&index);
        local
            .publish(&record_with_skills("r1", &["a"]))
            .await?;
        local
            .publish(&record_with_skills("r2", &["b"]))
            .await?;

        let all = drain(local.list(ListRequest::default()).await?).await;
        assert_eq!(all.len(), 2);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn it_honours_the_limit() -> anyhow::Result<()> {
        let index = MemoryStore::default();
        let local = routing(&index);
        for n in 0..5 {
            local
                .publish(&record_with_skills(&format!("r{n}"), &["a"]))
                .await?;
        }

        let limited = drain(
            local
                .list(ListRequest {
                    queries: vec![],
                    limit: 3,
                })
                .await?,
        )
        .await;
        assert_eq!(limited.len(), 3);
        Ok(())
    }
}
