//! Router facade behavior against a recording network fake: publish
//! gating, local list, remote search and provider lookups.

use std::sync::Arc;

use dir_routing::{
    helpers::{drain, record_with_skills, seed_remote_labels, MemoryRecordStore, RecordingDht},
    DhtClient, ListRequest, RecordQuery, RecordRef, RouterBuilder, RoutingApi, RoutingError,
    SearchRequest,
};
use dir_storage::MemoryStore;

async fn build_router(
    index: &MemoryStore,
    dht: Arc<RecordingDht>,
) -> dir_routing::Router<MemoryStore> {
    RouterBuilder::default()
        .index(index)
        .store(Arc::new(MemoryRecordStore::default()))
        .dht_client(dht)
        .build()
        .await
        .expect("router builds")
}

#[test_log::test(tokio::test)]
async fn publish_stays_local_without_peers() -> anyhow::Result<()> {
    let index = MemoryStore::default();
    let dht = Arc::new(RecordingDht::new(false));
    let router = build_router(&index, dht.clone()).await;

    let record = record_with_skills("solo", &["category1/class1"]);
    router.publish(&record).await?;

    assert!(dht.provided().is_empty(), "no announcement without peers");

    let listed = drain(
        router
            .list(ListRequest {
                queries: vec![RecordQuery::skill("category1/class1")],
                limit: 0,
            })
            .await?,
    )
    .await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].record_ref.cid, record.cid());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn publish_announces_when_peers_are_present() -> anyhow::Result<()> {
    let index = MemoryStore::default();
    let dht = Arc::new(RecordingDht::new(true));
    let router = build_router(&index, dht.clone()).await;

    let record = record_with_skills("networked", &["AI/ML"]);
    router.publish(&record).await?;

    assert_eq!(dht.provided(), vec![record.cid().to_string()]);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn unpublish_issues_no_retraction() -> anyhow::Result<()> {
    let index = MemoryStore::default();
    let dht = Arc::new(RecordingDht::new(true));
    let router = build_router(&index, dht.clone()).await;

    let record = record_with_skills("fleeting", &["AI/ML"]);
    router.publish(&record).await?;
    let announcements_after_publish = dht.provided().len();

    router.unpublish(&record).await?;
    assert_eq!(dht.provided().len(), announcements_after_publish);

    let listed = drain(router.list(ListRequest::default()).await?).await;
    assert!(listed.is_empty());

    router.shutdown().await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn search_sees_only_the_remote_cache() -> anyhow::Result<()> {
    let index = MemoryStore::default();
    let dht = Arc::new(RecordingDht::new(true));
    let local_peer = dht.peer_id().to_base58();
    let router = build_router(&index, dht).await;

    // A locally-published record and a pull-cached remote one.
    let mine = record_with_skills("mine", &["AI/ML"]);
    router.publish(&mine).await?;
    let theirs = record_with_skills("theirs", &["AI/Vision"]);
    seed_remote_labels(&index, &theirs, "12D3KooWRemotePeerOne").await?;

    let found = drain(
        router
            .search(SearchRequest {
                queries: vec![RecordQuery::skill("AI")],
                limit: 0,
                min_match_score: 0,
            })
            .await?,
    )
    .await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].record_ref.cid, theirs.cid());
    assert_ne!(found[0].peer.id, local_peer);

    // And the local record remains visible to list.
    let listed = drain(router.list(ListRequest::default()).await?).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].record_ref.cid, mine.cid());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn provider_lookup_fails_when_nobody_provides() -> anyhow::Result<()> {
    let index = MemoryStore::default();
    let dht = Arc::new(RecordingDht::new(true));
    let router = build_router(&index, dht).await;

    let record = record_with_skills("unprovided", &["AI"]);
    let result = router.lookup_providers(&RecordRef::new(record.cid())).await;
    assert!(matches!(result, Err(RoutingError::NotFound(_))));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn provider_lookup_streams_labels_from_each_provider() -> anyhow::Result<()> {
    let index = MemoryStore::default();
    let record = record_with_skills("shared", &["AI/ML"]);
    let provider_peer = dir_routing::PeerId::random();
    let dht = Arc::new(
        RecordingDht::new(true)
            .serving(record.clone())
            .with_providers(vec![dir_routing::Peer {
                peer_id: provider_peer,
                addrs: vec![],
            }]),
    );
    let router = build_router(&index, dht).await;

    let providers = drain(
        router
            .lookup_providers(&RecordRef::new(record.cid()))
            .await?,
    )
    .await;
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].peer.id, provider_peer.to_base58());
    assert_eq!(providers[0].labels, vec!["/skills/AI/ML".to_string()]);
    Ok(())
}
