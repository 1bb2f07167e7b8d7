// Linker behavior against a mock knowledge-base transport: cache hits,
// rate-limit retries, and confidence gating, with outbound calls counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use vantage_common::EntityType;
use vantage_pipeline::linker::{
    EntityLinker, KbCandidate, KbDetails, KbReply, KbTransport, SharedCache,
};

struct MockTransport {
    search_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    /// Statuses returned by successive search calls; the last repeats.
    search_statuses: Vec<u16>,
    candidates: Vec<KbCandidate>,
}

impl MockTransport {
    fn with_candidate(label: &str, description: &str) -> Self {
        Self {
            search_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            search_statuses: vec![200],
            candidates: vec![KbCandidate {
                id: "Q7747".to_string(),
                label: label.to_string(),
                description: description.to_string(),
            }],
        }
    }

    fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KbTransport for MockTransport {
    async fn search(&self, _query: &str, _limit: usize) -> Result<KbReply<Vec<KbCandidate>>> {
        let call = self.search_calls.fetch_add(1, Ordering::SeqCst);
        let status = *self
            .search_statuses
            .get(call)
            .or(self.search_statuses.last())
            .unwrap_or(&200);
        Ok(KbReply {
            status,
            body: (status == 200).then(|| self.candidates.clone()),
        })
    }

    async fn fetch_details(&self, _id: &str) -> Result<KbReply<KbDetails>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(KbReply {
            status: 200,
            body: Some(KbDetails {
                aliases: vec!["Putin".to_string()],
                instance_of: vec!["Q5".to_string()],
                properties: serde_json::json!({ "instance_of": ["Q5"] }),
                external_url: Some("https://en.wikipedia.org/wiki/Vladimir_Putin".to_string()),
            }),
        })
    }
}

#[derive(Default)]
struct MemorySharedCache {
    entries: Mutex<std::collections::HashMap<String, String>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl_secs: i64) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn second_lookup_is_served_from_cache() {
    let transport = Arc::new(MockTransport::with_candidate(
        "Vladimir Putin",
        "President of Russia",
    ));
    let linker = EntityLinker::new(Arc::clone(&transport) as Arc<dyn KbTransport>);

    let first = linker
        .link_entity("Vladimir Putin", Some(EntityType::Person), 0.5)
        .await
        .expect("link")
        .expect("linked entity");
    assert_eq!(first.canonical_id, "Q7747");
    assert_eq!(first.confidence, 0.95);
    assert_eq!(first.entity_type, Some(EntityType::Person));
    assert_eq!(linker.l1_size().await, 1);

    let second = linker
        .link_entity("Vladimir Putin", Some(EntityType::Person), 0.5)
        .await
        .expect("link")
        .expect("linked entity");
    assert!(second.confidence >= 0.85);

    // Exactly one outbound search across both lookups.
    assert_eq!(transport.searches(), 1);
    assert_eq!(linker.l1_size().await, 1);
}

#[tokio::test]
async fn shared_cache_hit_repromotes_to_l1() {
    let transport = Arc::new(MockTransport::with_candidate(
        "Vladimir Putin",
        "President of Russia",
    ));
    let shared = Arc::new(MemorySharedCache::default());

    // First linker populates both tiers.
    let linker_a = EntityLinker::new(Arc::clone(&transport) as Arc<dyn KbTransport>)
        .with_shared_cache(Arc::clone(&shared) as Arc<dyn SharedCache>);
    linker_a
        .link_entity("Vladimir Putin", Some(EntityType::Person), 0.5)
        .await
        .expect("link")
        .expect("linked");
    assert_eq!(shared.sets.load(Ordering::SeqCst), 1);

    // A fresh process (empty L1) finds the entity in the shared tier
    // without another outbound call, and promotes it to L1.
    let linker_b = EntityLinker::new(Arc::clone(&transport) as Arc<dyn KbTransport>)
        .with_shared_cache(Arc::clone(&shared) as Arc<dyn SharedCache>);
    assert_eq!(linker_b.l1_size().await, 0);
    let hit = linker_b
        .link_entity("Vladimir Putin", Some(EntityType::Person), 0.5)
        .await
        .expect("link")
        .expect("linked");
    assert_eq!(hit.canonical_id, "Q7747");
    assert_eq!(transport.searches(), 1);
    assert_eq!(linker_b.l1_size().await, 1);
}

#[tokio::test]
async fn rate_limited_search_retries_with_backoff() {
    let transport = Arc::new(MockTransport {
        search_calls: AtomicUsize::new(0),
        detail_calls: AtomicUsize::new(0),
        search_statuses: vec![429, 429, 200],
        candidates: vec![KbCandidate {
            id: "Q7747".to_string(),
            label: "Vladimir Putin".to_string(),
            description: "President of Russia".to_string(),
        }],
    });
    let linker = EntityLinker::new(Arc::clone(&transport) as Arc<dyn KbTransport>);

    let linked = linker
        .link_entity("Vladimir Putin", Some(EntityType::Person), 0.5)
        .await
        .expect("link");
    assert!(linked.is_some(), "third attempt should succeed");
    assert_eq!(transport.searches(), 3);
}

#[tokio::test]
async fn upstream_rejection_yields_none() {
    let transport = Arc::new(MockTransport {
        search_calls: AtomicUsize::new(0),
        detail_calls: AtomicUsize::new(0),
        search_statuses: vec![500],
        candidates: vec![],
    });
    let linker = EntityLinker::new(Arc::clone(&transport) as Arc<dyn KbTransport>);

    let linked = linker
        .link_entity("anything", None, 0.5)
        .await
        .expect("link");
    assert!(linked.is_none());
    assert_eq!(transport.searches(), 1, "non-429 must not retry");
}

#[tokio::test]
async fn low_confidence_match_is_discarded() {
    let transport = Arc::new(MockTransport::with_candidate(
        "completely different words",
        "a politician",
    ));
    let linker = EntityLinker::new(Arc::clone(&transport) as Arc<dyn KbTransport>);

    let linked = linker
        .link_entity("Vladimir Putin", Some(EntityType::Person), 0.8)
        .await
        .expect("link");
    assert!(linked.is_none());
    // Nothing below the threshold is cached.
    assert_eq!(linker.l1_size().await, 0);
}

#[tokio::test]
async fn empty_text_short_circuits() {
    let transport = Arc::new(MockTransport::with_candidate("x", "y"));
    let linker = EntityLinker::new(Arc::clone(&transport) as Arc<dyn KbTransport>);
    let linked = linker.link_entity("   ", None, 0.5).await.expect("link");
    assert!(linked.is_none());
    assert_eq!(transport.searches(), 0);
}
