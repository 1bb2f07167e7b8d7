use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text::content_hash;

// --- Processing state ---

/// Processing state of a stored item. Transitions only move forward
/// (Pending -> Processed or Pending -> Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedState {
    Pending,
    Processed,
    Failed,
}

impl ProcessedState {
    pub fn as_i32(&self) -> i32 {
        match self {
            ProcessedState::Pending => 0,
            ProcessedState::Processed => 1,
            ProcessedState::Failed => 2,
        }
    }

    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => ProcessedState::Processed,
            2 => ProcessedState::Failed,
            _ => ProcessedState::Pending,
        }
    }
}

// --- Collection run lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown RunStatus: {other}")),
        }
    }
}

// --- Collector health ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl CollectorHealth {
    /// Health from consecutive failure count: 0 healthy, 1-2 degraded, 3+ unhealthy.
    pub fn from_consecutive_failures(failures: u32) -> Self {
        match failures {
            0 => CollectorHealth::Healthy,
            1..=2 => CollectorHealth::Degraded,
            _ => CollectorHealth::Unhealthy,
        }
    }
}

impl std::fmt::Display for CollectorHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorHealth::Healthy => write!(f, "healthy"),
            CollectorHealth::Degraded => write!(f, "degraded"),
            CollectorHealth::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

// --- Entity taxonomy ---

/// Closed set of entity types recognized by extraction and linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    GovernmentAgency,
    MilitaryUnit,
    WeaponSystem,
    Location,
    FinancialInstrument,
    PoliticalParty,
    CriminalOrganization,
    Event,
    Date,
}

impl EntityType {
    /// The default extraction set passed to the NER model.
    pub fn default_set() -> Vec<EntityType> {
        vec![
            EntityType::Person,
            EntityType::Organization,
            EntityType::GovernmentAgency,
            EntityType::MilitaryUnit,
            EntityType::WeaponSystem,
            EntityType::Location,
            EntityType::FinancialInstrument,
            EntityType::PoliticalParty,
            EntityType::CriminalOrganization,
            EntityType::Event,
            EntityType::Date,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Organization => "ORGANIZATION",
            EntityType::GovernmentAgency => "GOVERNMENT_AGENCY",
            EntityType::MilitaryUnit => "MILITARY_UNIT",
            EntityType::WeaponSystem => "WEAPON_SYSTEM",
            EntityType::Location => "LOCATION",
            EntityType::FinancialInstrument => "FINANCIAL_INSTRUMENT",
            EntityType::PoliticalParty => "POLITICAL_PARTY",
            EntityType::CriminalOrganization => "CRIMINAL_ORGANIZATION",
            EntityType::Event => "EVENT",
            EntityType::Date => "DATE",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PERSON" => Ok(Self::Person),
            "ORGANIZATION" => Ok(Self::Organization),
            "GOVERNMENT_AGENCY" => Ok(Self::GovernmentAgency),
            "MILITARY_UNIT" => Ok(Self::MilitaryUnit),
            "WEAPON_SYSTEM" => Ok(Self::WeaponSystem),
            "LOCATION" => Ok(Self::Location),
            "FINANCIAL_INSTRUMENT" => Ok(Self::FinancialInstrument),
            "POLITICAL_PARTY" => Ok(Self::PoliticalParty),
            "CRIMINAL_ORGANIZATION" => Ok(Self::CriminalOrganization),
            "EVENT" => Ok(Self::Event),
            "DATE" => Ok(Self::Date),
            other => Err(format!("unknown EntityType: {other}")),
        }
    }
}

// --- Relationship taxonomy ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Supports,
    Opposes,
    CollaboratesWith,
    Implements,
    Impacts,
    RespondsTo,
    PartOf,
    Leads,
    Funds,
    Regulates,
    AssociatedWith,
    CoOccurrence,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Supports => "supports",
            RelationshipType::Opposes => "opposes",
            RelationshipType::CollaboratesWith => "collaborates_with",
            RelationshipType::Implements => "implements",
            RelationshipType::Impacts => "impacts",
            RelationshipType::RespondsTo => "responds_to",
            RelationshipType::PartOf => "part_of",
            RelationshipType::Leads => "leads",
            RelationshipType::Funds => "funds",
            RelationshipType::Regulates => "regulates",
            RelationshipType::AssociatedWith => "associated_with",
            RelationshipType::CoOccurrence => "co_occurrence",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "supports" => Ok(Self::Supports),
            "opposes" => Ok(Self::Opposes),
            "collaborates_with" => Ok(Self::CollaboratesWith),
            "implements" => Ok(Self::Implements),
            "impacts" => Ok(Self::Impacts),
            "responds_to" => Ok(Self::RespondsTo),
            "part_of" => Ok(Self::PartOf),
            "leads" => Ok(Self::Leads),
            "funds" => Ok(Self::Funds),
            "regulates" => Ok(Self::Regulates),
            "associated_with" => Ok(Self::AssociatedWith),
            "co_occurrence" => Ok(Self::CoOccurrence),
            other => Err(format!("unknown RelationshipType: {other}")),
        }
    }
}

// --- Collected item (adapter output, pre-persistence) ---

/// Intermediate record produced by a source adapter before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedItem {
    /// Short source tag, e.g. "rss", "gdelt", "acled".
    pub source: String,
    /// Display name, e.g. "Reuters", "ACLED".
    pub source_name: String,
    /// Feed URL or API endpoint this item came from.
    pub source_url: String,
    /// The adapter's semantic classification for this item.
    pub category: String,
    pub title: String,
    /// Pre-extracted summary, word-boundary truncated to <=500 chars.
    pub summary: String,
    pub url: String,
    /// Publication time normalized to UTC. None when unparseable;
    /// the store stamps collection time in that case.
    pub published: Option<DateTime<Utc>>,
    pub author: String,
    pub metadata: serde_json::Value,
    /// Full body text when available.
    pub raw_content: String,
}

impl CollectedItem {
    /// SHA-256 hash over the best available body text.
    pub fn content_hash(&self) -> String {
        let body = if !self.raw_content.is_empty() {
            &self.raw_content
        } else if !self.summary.is_empty() {
            &self.summary
        } else {
            &self.title
        };
        content_hash(body)
    }
}

// --- Persistent rows ---

/// A persisted item collected from any source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: Uuid,
    pub source_type: String,
    pub source_name: String,
    pub source_url: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    /// Globally unique across the table.
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub author: String,
    pub categories: Vec<String>,
    pub processed: ProcessedState,
    pub relevance_score: f64,
    pub content_hash: String,
    /// Vector store reference. None until embedded.
    pub embedding_ref: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl NewsItem {
    /// Build a pending row from an adapter item, stamping collection time.
    pub fn from_collected(item: &CollectedItem, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_type: item.source.clone(),
            source_name: item.source_name.clone(),
            source_url: item.source_url.clone(),
            title: item.title.clone(),
            content: item.raw_content.clone(),
            summary: item.summary.clone(),
            url: item.url.clone(),
            published_at: item.published,
            collected_at: now,
            author: item.author.clone(),
            categories: if item.category.is_empty() {
                vec![]
            } else {
                vec![item.category.clone()]
            },
            processed: ProcessedState::Pending,
            relevance_score: 0.0,
            content_hash: item.content_hash(),
            embedding_ref: None,
            metadata: item.metadata.clone(),
        }
    }

    /// The best available body text, used by ranking and embedding.
    pub fn body(&self) -> &str {
        if !self.content.is_empty() {
            &self.content
        } else {
            &self.summary
        }
    }
}

/// One invocation of one adapter. Created at start, finalized once on exit,
/// never mutated thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRun {
    pub id: Uuid,
    pub collector_type: String,
    pub collector_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub items_collected: i64,
    pub items_new: i64,
    pub items_duplicate: i64,
    pub items_filtered: i64,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

impl CollectionRun {
    pub fn begin(collector_type: &str, collector_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            collector_type: collector_type.to_string(),
            collector_name: collector_name.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            items_collected: 0,
            items_new: 0,
            items_duplicate: 0,
            items_filtered: 0,
            error_message: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// A user-owned entity of interest. Mentions accumulate against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub entity_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Normalization key; `(user_id, name_lower)` is unique.
    pub name_lower: String,
    pub entity_type: EntityType,
    pub created_at: DateTime<Utc>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Carries `canonical_id` (knowledge-base QID) when linked, which is
    /// authoritative for dedup ahead of name_lower.
    pub metadata: serde_json::Value,
}

impl TrackedEntity {
    pub fn new(user_id: Uuid, name: &str, entity_type: EntityType) -> Self {
        let now = Utc::now();
        Self {
            entity_id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            name_lower: name.to_lowercase(),
            entity_type,
            created_at: now,
            first_seen: Some(now),
            last_seen: Some(now),
            metadata: serde_json::json!({}),
        }
    }

    /// The canonical knowledge-base identifier, if this entity was linked.
    pub fn canonical_id(&self) -> Option<&str> {
        self.metadata.get("canonical_id").and_then(|v| v.as_str())
    }
}

/// Which source record a mention points at. Exactly one of the three
/// columns is set; the enum makes the invariant unrepresentable in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionTarget {
    Document(Uuid),
    NewsArticle(Uuid),
    NewsItem(Uuid),
}

impl MentionTarget {
    /// Decompose into the (document_id, news_article_id, news_item_id) column triple.
    pub fn columns(&self) -> (Option<Uuid>, Option<Uuid>, Option<Uuid>) {
        match self {
            MentionTarget::Document(id) => (Some(*id), None, None),
            MentionTarget::NewsArticle(id) => (None, Some(*id), None),
            MentionTarget::NewsItem(id) => (None, None, Some(*id)),
        }
    }
}

/// An occurrence of a tracked entity in a source record. Immutable after
/// creation; cascade-deleted with its entity or source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub mention_id: Uuid,
    pub entity_id: Uuid,
    pub target: MentionTarget,
    pub user_id: Uuid,
    pub chunk_id: String,
    /// Surrounding text, capped at 500 chars.
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

/// A typed relationship between two tracked entities.
/// `(source_entity_id, target_entity_id, relationship_type)` is unique;
/// self-relationships are disallowed; updates only advance `last_seen`,
/// increment `mention_count`, and raise `confidence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: Uuid,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    pub relationship_type: RelationshipType,
    pub description: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: i64,
    pub confidence: f64,
    pub user_id: Uuid,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_state_roundtrip() {
        assert_eq!(ProcessedState::from_i32(0), ProcessedState::Pending);
        assert_eq!(ProcessedState::from_i32(1), ProcessedState::Processed);
        assert_eq!(ProcessedState::from_i32(2), ProcessedState::Failed);
        assert_eq!(ProcessedState::Failed.as_i32(), 2);
    }

    #[test]
    fn health_thresholds() {
        assert_eq!(
            CollectorHealth::from_consecutive_failures(0),
            CollectorHealth::Healthy
        );
        assert_eq!(
            CollectorHealth::from_consecutive_failures(1),
            CollectorHealth::Degraded
        );
        assert_eq!(
            CollectorHealth::from_consecutive_failures(2),
            CollectorHealth::Degraded
        );
        assert_eq!(
            CollectorHealth::from_consecutive_failures(3),
            CollectorHealth::Unhealthy
        );
    }

    #[test]
    fn relationship_type_serde_matches_wire_form() {
        let json = serde_json::to_string(&RelationshipType::CollaboratesWith).unwrap();
        assert_eq!(json, "\"collaborates_with\"");
        let parsed: RelationshipType = "part_of".parse().unwrap();
        assert_eq!(parsed, RelationshipType::PartOf);
    }

    #[test]
    fn entity_type_screaming_snake_wire_form() {
        let json = serde_json::to_string(&EntityType::GovernmentAgency).unwrap();
        assert_eq!(json, "\"GOVERNMENT_AGENCY\"");
        let parsed: EntityType = "MILITARY_UNIT".parse().unwrap();
        assert_eq!(parsed, EntityType::MilitaryUnit);
    }

    fn sample_item() -> CollectedItem {
        CollectedItem {
            source: "rss".to_string(),
            source_name: "Reuters".to_string(),
            source_url: "https://feeds.example.com/world".to_string(),
            category: "geopolitics".to_string(),
            title: "Title".to_string(),
            summary: "Summary text".to_string(),
            url: "https://example.com/a1".to_string(),
            published: None,
            author: String::new(),
            metadata: serde_json::json!({}),
            raw_content: String::new(),
        }
    }

    #[test]
    fn content_hash_prefers_raw_content_then_summary_then_title() {
        let mut item = sample_item();
        let summary_hash = item.content_hash();

        item.raw_content = "full body".to_string();
        let body_hash = item.content_hash();
        assert_ne!(summary_hash, body_hash);

        item.raw_content.clear();
        item.summary.clear();
        let title_hash = item.content_hash();
        assert_ne!(title_hash, summary_hash);
        assert_eq!(title_hash, crate::text::content_hash("Title"));
    }

    #[test]
    fn mention_target_sets_exactly_one_column() {
        let id = Uuid::new_v4();
        for target in [
            MentionTarget::Document(id),
            MentionTarget::NewsArticle(id),
            MentionTarget::NewsItem(id),
        ] {
            let (a, b, c) = target.columns();
            let set = [a, b, c].iter().filter(|v| v.is_some()).count();
            assert_eq!(set, 1);
        }
    }

    #[test]
    fn news_item_from_collected_stamps_collection_time() {
        let item = sample_item();
        let now = Utc::now();
        let row = NewsItem::from_collected(&item, now);
        assert_eq!(row.collected_at, now);
        assert_eq!(row.processed, ProcessedState::Pending);
        assert_eq!(row.categories, vec!["geopolitics".to_string()]);
        assert!(row.embedding_ref.is_none());
        assert_eq!(row.content_hash, item.content_hash());
    }
}
