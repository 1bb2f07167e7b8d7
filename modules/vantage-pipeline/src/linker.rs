// Knowledge-base entity linking with a two-tier cache and strict rate
// limiting. Resolves an extracted entity string to a canonical identifier
// (QID) so the same real-world entity deduplicates across name variants.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use vantage_common::EntityType;

const SEARCH_LIMIT: usize = 10;
const REQUEST_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRIES: u32 = 3;
const BACKOFF_MULTIPLIER: u32 = 2;
const L1_CAPACITY: usize = 10_000;
const CACHE_TTL_HOURS: i64 = 24;
const L2_KEY_PREFIX: &str = "kb:entity:";

/// QID -> entity type, for type filtering and inference.
const TYPE_MAPPINGS: &[(&str, EntityType)] = &[
    ("Q5", EntityType::Person),
    ("Q15632617", EntityType::Person),
    ("Q43229", EntityType::Organization),
    ("Q4830453", EntityType::Organization),
    ("Q783794", EntityType::Organization),
    ("Q163740", EntityType::Organization),
    ("Q484652", EntityType::Organization),
    ("Q7278", EntityType::PoliticalParty),
    ("Q2659904", EntityType::GovernmentAgency),
    ("Q515", EntityType::Location),
    ("Q6256", EntityType::Location),
    ("Q35657", EntityType::Location),
    ("Q35120", EntityType::Location),
    ("Q82794", EntityType::Location),
    ("Q176799", EntityType::MilitaryUnit),
    ("Q15627509", EntityType::MilitaryUnit),
    ("Q1656682", EntityType::Event),
];

/// An entity resolved to the canonical knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedEntity {
    pub original_text: String,
    /// Canonical identifier, e.g. "Q7747".
    pub canonical_id: String,
    pub label: String,
    pub description: String,
    pub entity_type: Option<EntityType>,
    pub aliases: Vec<String>,
    /// Whitelisted properties: instance_of, country_qid, coordinates,
    /// inception, website.
    pub properties: serde_json::Value,
    pub confidence: f64,
    pub external_url: Option<String>,
}

/// A search candidate from the knowledge base.
#[derive(Debug, Clone, Deserialize)]
pub struct KbCandidate {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// Entity details fetched for the winning candidate.
#[derive(Debug, Clone, Default)]
pub struct KbDetails {
    pub aliases: Vec<String>,
    pub instance_of: Vec<String>,
    pub properties: serde_json::Value,
    pub external_url: Option<String>,
}

/// One transport round-trip. Status is surfaced so the linker can drive
/// 429 backoff itself.
#[derive(Debug, Clone)]
pub struct KbReply<T> {
    pub status: u16,
    pub body: Option<T>,
}

/// Outbound knowledge-base transport. Swappable so tests can count calls.
#[async_trait]
pub trait KbTransport: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<KbReply<Vec<KbCandidate>>>;
    async fn fetch_details(&self, id: &str) -> Result<KbReply<KbDetails>>;
}

/// Shared (L2) cache backend. Implementations own their TTL enforcement.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()>;
}

/// L2 cache backed by Postgres, keyed by the same digest as L1.
pub struct PostgresCache {
    pool: PgPool,
}

impl PostgresCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kb_link_cache (
                cache_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SharedCache for PostgresCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM kb_link_cache WHERE cache_key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(payload,)| payload))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO kb_link_cache (cache_key, payload, expires_at)
             VALUES ($1, $2, now() + make_interval(secs => $3))
             ON CONFLICT (cache_key)
             DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl_secs as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

struct L1Cache {
    entries: HashMap<String, (LinkedEntity, DateTime<Utc>)>,
}

impl L1Cache {
    fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<LinkedEntity> {
        match self.entries.get(key) {
            Some((entity, stored_at))
                if now - *stored_at < chrono::Duration::hours(CACHE_TTL_HOURS) =>
            {
                Some(entity.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&mut self, key: String, entity: LinkedEntity, now: DateTime<Utc>) {
        if self.entries.len() >= L1_CAPACITY {
            // Evict the oldest 10% by insertion time.
            let mut stamps: Vec<(String, DateTime<Utc>)> = self
                .entries
                .iter()
                .map(|(k, (_, t))| (k.clone(), *t))
                .collect();
            stamps.sort_by_key(|(_, t)| *t);
            for (key, _) in stamps.into_iter().take(L1_CAPACITY / 10) {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(key, (entity, now));
    }
}

pub struct EntityLinker {
    transport: Arc<dyn KbTransport>,
    shared_cache: Option<Arc<dyn SharedCache>>,
    l1: Mutex<L1Cache>,
    last_request: Mutex<Option<Instant>>,
}

impl EntityLinker {
    pub fn new(transport: Arc<dyn KbTransport>) -> Self {
        Self {
            transport,
            shared_cache: None,
            l1: Mutex::new(L1Cache {
                entries: HashMap::new(),
            }),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Digest key over the normalized lookup: `md5(lower(text)|type-or-any)`.
    pub fn cache_key(text: &str, entity_type: Option<EntityType>) -> String {
        let type_tag = entity_type.map(|t| t.as_str()).unwrap_or("any");
        let raw = format!("{}|{}", text.to_lowercase(), type_tag);
        let mut hasher = Md5::new();
        hasher.update(raw.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn l1_size(&self) -> usize {
        self.l1.lock().await.entries.len()
    }

    /// Resolve an entity string to its canonical knowledge-base record.
    /// Returns None when no candidate clears `min_confidence`.
    pub async fn link_entity(
        &self,
        text: &str,
        expected_type: Option<EntityType>,
        min_confidence: f64,
    ) -> Result<Option<LinkedEntity>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let key = Self::cache_key(text, expected_type);
        let now = Utc::now();

        if let Some(hit) = self.l1.lock().await.get(&key, now) {
            debug!(text, "L1 cache hit");
            return Ok(Some(hit));
        }

        if let Some(cache) = &self.shared_cache {
            match cache.get(&format!("{L2_KEY_PREFIX}{key}")).await {
                Ok(Some(payload)) => {
                    if let Ok(entity) = serde_json::from_str::<LinkedEntity>(&payload) {
                        debug!(text, "L2 cache hit");
                        // Re-promote to L1 for faster subsequent lookups.
                        self.l1.lock().await.put(key, entity.clone(), now);
                        return Ok(Some(entity));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "shared cache read failed"),
            }
        }

        let candidates = match self.search_with_backoff(text).await? {
            Some(candidates) if !candidates.is_empty() => candidates,
            _ => {
                debug!(text, "no knowledge-base results");
                return Ok(None);
            }
        };

        let candidates = match expected_type {
            Some(expected) => self.filter_by_type(candidates, expected).await?,
            None => candidates,
        };
        let Some(best) = candidates.first() else {
            return Ok(None);
        };

        let confidence = match_confidence(text, &best.label);
        if confidence < min_confidence {
            debug!(text, confidence, "below confidence threshold");
            return Ok(None);
        }

        self.rate_limit().await;
        let details = match self.transport.fetch_details(&best.id).await {
            Ok(reply) if reply.status == 200 => reply.body.unwrap_or_default(),
            Ok(reply) => {
                warn!(status = reply.status, "detail fetch rejected");
                KbDetails::default()
            }
            Err(e) => {
                warn!(error = %e, "detail fetch failed");
                KbDetails::default()
            }
        };

        let entity_type = infer_type(&details.instance_of).or(expected_type);
        let linked = LinkedEntity {
            original_text: text.to_string(),
            canonical_id: best.id.clone(),
            label: if best.label.is_empty() {
                text.to_string()
            } else {
                best.label.clone()
            },
            description: best.description.clone(),
            entity_type,
            aliases: details.aliases,
            properties: details.properties,
            confidence,
            external_url: details.external_url,
        };

        self.l1.lock().await.put(key.clone(), linked.clone(), now);
        if let Some(cache) = &self.shared_cache {
            match serde_json::to_string(&linked) {
                Ok(payload) => {
                    if let Err(e) = cache
                        .set(
                            &format!("{L2_KEY_PREFIX}{key}"),
                            &payload,
                            CACHE_TTL_HOURS * 3600,
                        )
                        .await
                    {
                        warn!(error = %e, "shared cache write failed");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize linked entity"),
            }
        }

        Ok(Some(linked))
    }

    /// Link a batch sequentially with a small pause between entities.
    pub async fn link_batch(
        &self,
        entities: &[(String, Option<EntityType>)],
        min_confidence: f64,
    ) -> HashMap<String, Option<LinkedEntity>> {
        let mut results = HashMap::new();
        for (text, entity_type) in entities {
            let linked = match self.link_entity(text, *entity_type, min_confidence).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(text, error = %e, "linking failed");
                    None
                }
            };
            results.insert(text.clone(), linked);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        results
    }

    /// 500 ms monotonic gap between outbound requests.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < REQUEST_DELAY {
                tokio::time::sleep(REQUEST_DELAY - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Search with exponential backoff on 429, up to `MAX_RETRIES` attempts.
    /// Any other non-2xx ends the call with no result.
    async fn search_with_backoff(&self, query: &str) -> Result<Option<Vec<KbCandidate>>> {
        for attempt in 0..MAX_RETRIES {
            self.rate_limit().await;
            let reply = self.transport.search(query, SEARCH_LIMIT).await?;
            match reply.status {
                200 => return Ok(reply.body),
                429 => {
                    let delay = REQUEST_DELAY * BACKOFF_MULTIPLIER.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited by knowledge base, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                status => {
                    warn!(status, query, "knowledge-base search rejected");
                    return Ok(None);
                }
            }
        }
        warn!(query, "search failed after {MAX_RETRIES} rate-limit retries");
        Ok(None)
    }

    /// Filter candidates by expected type. Description keywords are the
    /// cheap path; the full instance-of lookup is spent on at most three
    /// candidates. Falls back to the top three when nothing matches.
    async fn filter_by_type(
        &self,
        candidates: Vec<KbCandidate>,
        expected: EntityType,
    ) -> Result<Vec<KbCandidate>> {
        let mut filtered: Vec<KbCandidate> = Vec::new();

        for candidate in &candidates {
            if description_matches_type(&candidate.description, expected) {
                filtered.push(candidate.clone());
                continue;
            }

            if filtered.len() < 3 {
                self.rate_limit().await;
                match self.transport.fetch_details(&candidate.id).await {
                    Ok(reply) if reply.status == 200 => {
                        let details = reply.body.unwrap_or_default();
                        if infer_type(&details.instance_of) == Some(expected) {
                            filtered.push(candidate.clone());
                        }
                    }
                    Ok(_) | Err(_) => {}
                }
            }
        }

        if filtered.is_empty() {
            Ok(candidates.into_iter().take(3).collect())
        } else {
            Ok(filtered)
        }
    }
}

/// Cheap type check against the candidate's one-line description.
fn description_matches_type(description: &str, expected: EntityType) -> bool {
    let desc = description.to_lowercase();
    let keywords: &[&str] = match expected {
        EntityType::Person => &["politician", "president", "leader", "born"],
        EntityType::Organization => &["company", "organization", "agency", "group"],
        EntityType::Location => &["city", "country", "capital", "region"],
        _ => return false,
    };
    keywords.iter().any(|k| desc.contains(k))
}

/// Infer an entity type from instance-of QIDs.
fn infer_type(instance_of: &[String]) -> Option<EntityType> {
    for qid in instance_of {
        for (mapped_qid, entity_type) in TYPE_MAPPINGS {
            if qid == mapped_qid {
                return Some(*entity_type);
            }
        }
    }
    None
}

/// Confidence of a label match: exact 0.95, containment 0.85, otherwise
/// Jaccard word overlap mapped onto [0.5, 0.9].
pub fn match_confidence(query: &str, label: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let label_lower = label.to_lowercase();

    if label_lower == query_lower {
        return 0.95;
    }
    if label_lower.contains(&query_lower) || query_lower.contains(&label_lower) {
        return 0.85;
    }

    let query_words: std::collections::HashSet<&str> = query_lower.split_whitespace().collect();
    let label_words: std::collections::HashSet<&str> = label_lower.split_whitespace().collect();
    let overlap = query_words.intersection(&label_words).count();
    let total = query_words.union(&label_words).count();
    if total > 0 {
        let jaccard = overlap as f64 / total as f64;
        0.5 + jaccard * 0.4
    } else {
        0.5
    }
}

// --- Default HTTP transport over the public knowledge-base API ---

pub struct HttpKbTransport {
    client: reqwest::Client,
    search_api: String,
}

impl HttpKbTransport {
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .expect("Failed to build knowledge-base HTTP client");
        Self {
            client,
            search_api: "https://www.wikidata.org/w/api.php".to_string(),
        }
    }
}

#[async_trait]
impl KbTransport for HttpKbTransport {
    async fn search(&self, query: &str, limit: usize) -> Result<KbReply<Vec<KbCandidate>>> {
        let resp = self
            .client
            .get(&self.search_api)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", query),
                ("language", "en"),
                ("format", "json"),
                ("limit", &limit.to_string()),
                ("type", "item"),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Ok(KbReply { status, body: None });
        }

        #[derive(Deserialize)]
        struct SearchBody {
            #[serde(default)]
            search: Vec<KbCandidate>,
        }
        let body: SearchBody = resp.json().await?;
        Ok(KbReply {
            status,
            body: Some(body.search),
        })
    }

    async fn fetch_details(&self, id: &str) -> Result<KbReply<KbDetails>> {
        let resp = self
            .client
            .get(&self.search_api)
            .query(&[
                ("action", "wbgetentities"),
                ("ids", id),
                ("languages", "en"),
                ("format", "json"),
                ("props", "labels|descriptions|aliases|claims|sitelinks"),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Ok(KbReply { status, body: None });
        }

        let body: serde_json::Value = resp.json().await?;
        let entity = &body["entities"][id];

        let aliases = entity["aliases"]["en"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| a["value"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let claims = &entity["claims"];
        let claim_ids = |property: &str| -> Vec<String> {
            claims[property]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|c| {
                            c["mainsnak"]["datavalue"]["value"]["id"].as_str().map(String::from)
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let instance_of = claim_ids("P31");
        let mut properties = serde_json::Map::new();
        properties.insert(
            "instance_of".to_string(),
            serde_json::to_value(&instance_of)?,
        );
        if let Some(country) = claim_ids("P17").into_iter().next() {
            properties.insert("country_qid".to_string(), serde_json::json!(country));
        }
        if let Some(coords) = claims["P625"][0]["mainsnak"]["datavalue"]["value"].as_object() {
            properties.insert(
                "coordinates".to_string(),
                serde_json::json!({
                    "latitude": coords.get("latitude"),
                    "longitude": coords.get("longitude"),
                }),
            );
        }
        if let Some(inception) =
            claims["P571"][0]["mainsnak"]["datavalue"]["value"]["time"].as_str()
        {
            properties.insert("inception".to_string(), serde_json::json!(inception));
        }
        if let Some(website) = claims["P856"][0]["mainsnak"]["datavalue"]["value"].as_str() {
            properties.insert("website".to_string(), serde_json::json!(website));
        }

        let external_url = entity["sitelinks"]["enwiki"]["title"].as_str().map(|title| {
            format!(
                "https://en.wikipedia.org/wiki/{}",
                title.replace(' ', "_")
            )
        });

        Ok(KbReply {
            status,
            body: Some(KbDetails {
                aliases,
                instance_of,
                properties: serde_json::Value::Object(properties),
                external_url,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_label_match_is_095() {
        assert_eq!(match_confidence("Vladimir Putin", "vladimir putin"), 0.95);
    }

    #[test]
    fn containment_is_085() {
        assert_eq!(match_confidence("Putin", "Vladimir Putin"), 0.85);
    }

    #[test]
    fn word_overlap_maps_to_range() {
        // one shared word of three total -> 0.5 + (1/3)*0.4
        let confidence = match_confidence("Vladimir Putin", "Putin Khutor");
        assert!((confidence - (0.5 + 0.4 / 3.0)).abs() < 1e-9);
        // disjoint words floor at 0.5
        assert_eq!(match_confidence("alpha", "beta"), 0.5);
    }

    #[test]
    fn cache_key_is_case_insensitive_and_type_scoped() {
        let a = EntityLinker::cache_key("Putin", Some(EntityType::Person));
        let b = EntityLinker::cache_key("putin", Some(EntityType::Person));
        let c = EntityLinker::cache_key("putin", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn infer_type_from_instance_of() {
        assert_eq!(
            infer_type(&["Q5".to_string()]),
            Some(EntityType::Person)
        );
        assert_eq!(
            infer_type(&["Q999999".to_string(), "Q7278".to_string()]),
            Some(EntityType::PoliticalParty)
        );
        assert_eq!(infer_type(&[]), None);
    }

    #[test]
    fn description_keywords_cheap_path() {
        assert!(description_matches_type(
            "President of Russia",
            EntityType::Person
        ));
        assert!(description_matches_type(
            "capital of Russia",
            EntityType::Location
        ));
        assert!(!description_matches_type(
            "a 1997 film",
            EntityType::Person
        ));
    }

    #[test]
    fn l1_cache_expires_and_evicts() {
        let mut cache = L1Cache {
            entries: HashMap::new(),
        };
        let now = Utc::now();
        let entity = LinkedEntity {
            original_text: "x".to_string(),
            canonical_id: "Q1".to_string(),
            label: "x".to_string(),
            description: String::new(),
            entity_type: None,
            aliases: vec![],
            properties: serde_json::Value::Null,
            confidence: 0.9,
            external_url: None,
        };

        cache.put("fresh".to_string(), entity.clone(), now);
        cache.put(
            "stale".to_string(),
            entity,
            now - chrono::Duration::hours(25),
        );

        assert!(cache.get("fresh", now).is_some());
        assert!(cache.get("stale", now).is_none());
        assert!(!cache.entries.contains_key("stale"));
    }
}
