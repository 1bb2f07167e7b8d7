// Relationship inference from entity co-occurrence. Entities sharing a
// sentence become candidate edges; ordered keyword lists classify the edge,
// with an entity-type-pair default when nothing matches.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use vantage_common::{EntityType, RelationshipType};
use vantage_store::EntityStore;

/// Ordered keyword lists. First list with a hit wins.
const RELATIONSHIP_PATTERNS: &[(RelationshipType, &[&str])] = &[
    // "aid"/"assist" are deliberately absent: substring matching would
    // classify every sentence containing "said" as support.
    (
        RelationshipType::Supports,
        &["supports", "endorses", "backs", "advocates for", "champions", "defends"],
    ),
    (
        RelationshipType::Opposes,
        &["opposes", "criticizes", "attack", "condemns", "rejects", "denounces", "against", "strike", "target"],
    ),
    (
        RelationshipType::CollaboratesWith,
        &["works with", "partners with", "collaborates", "together with", "alongside", "met with", "meeting", "talks"],
    ),
    (
        RelationshipType::Leads,
        &["leads", "heads", "directs", "manages", "runs", "chairs"],
    ),
    (
        RelationshipType::Funds,
        &["funds", "finances", "invests in", "sponsors", "pays for"],
    ),
    (
        RelationshipType::PartOf,
        &["member of", "part of", "belongs to", "works for", "employed by", "joined"],
    ),
    (
        RelationshipType::Impacts,
        &["affects", "impacts", "influences", "changes", "shapes"],
    ),
    (
        RelationshipType::RespondsTo,
        &["responds to", "reacted to", "answered", "replied to"],
    ),
    (
        RelationshipType::Regulates,
        &["regulates", "oversees", "monitors", "controls"],
    ),
];

/// Base confidence at first insert: pattern-matched edges start higher
/// than bare co-occurrence.
pub const PATTERN_BASE_CONFIDENCE: f64 = 0.5;
pub const CO_OCCURRENCE_BASE_CONFIDENCE: f64 = 0.3;

/// One entity participating in detection.
#[derive(Debug, Clone)]
pub struct DetectorEntity {
    pub entity_id: Uuid,
    pub name_lower: String,
    pub entity_type: EntityType,
    pub confidence: f64,
}

/// A typed relationship candidate between two entities of the input set.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipCandidate {
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    pub relationship_type: RelationshipType,
    pub confidence: f64,
    pub pattern_matched: bool,
    pub description: String,
}

pub struct RelationshipDetector;

impl RelationshipDetector {
    /// Detect relationship candidates between entities co-occurring in the
    /// same sentence of `text`.
    pub fn detect(text: &str, entities: &[DetectorEntity]) -> Vec<RelationshipCandidate> {
        if entities.len() < 2 {
            return vec![];
        }

        let sentences = split_sentences(text);
        let mut candidates = Vec::new();

        for (i, a) in entities.iter().enumerate() {
            for b in entities.iter().skip(i + 1) {
                if a.entity_id == b.entity_id {
                    continue;
                }

                let shared: Vec<&str> = sentences
                    .iter()
                    .map(String::as_str)
                    .filter(|s| {
                        let lower = s.to_lowercase();
                        lower.contains(&a.name_lower) && lower.contains(&b.name_lower)
                    })
                    .collect();
                if shared.is_empty() {
                    continue;
                }

                let (relationship_type, pattern_matched) =
                    classify(&shared, a.entity_type, b.entity_type);

                let base = a.confidence.min(b.confidence) * 0.8;
                let confidence = if pattern_matched {
                    (base + 0.1).min(0.95)
                } else {
                    base
                };

                let description = if pattern_matched {
                    format!("Relationship detected via pattern matching: {relationship_type}")
                } else {
                    "Entities mentioned together in news content".to_string()
                };

                candidates.push(RelationshipCandidate {
                    source_entity_id: a.entity_id,
                    target_entity_id: b.entity_id,
                    relationship_type,
                    confidence,
                    pattern_matched,
                    description,
                });
            }
        }

        debug!(candidates = candidates.len(), "relationship detection complete");
        candidates
    }

    /// Persist candidates through the atomic get-or-create contract.
    /// Returns how many edges were written. One candidate's failure does
    /// not stop the rest.
    pub async fn persist(
        store: &EntityStore,
        user_id: Uuid,
        candidates: &[RelationshipCandidate],
    ) -> usize {
        let mut written = 0;
        for candidate in candidates {
            let base = if candidate.pattern_matched {
                PATTERN_BASE_CONFIDENCE
            } else {
                CO_OCCURRENCE_BASE_CONFIDENCE
            };
            match store
                .upsert_relationship(
                    user_id,
                    candidate.source_entity_id,
                    candidate.target_entity_id,
                    candidate.relationship_type,
                    &candidate.description,
                    base,
                )
                .await
            {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "relationship upsert failed");
                }
            }
        }
        written
    }
}

/// Split on sentence terminators, dropping empties.
fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Classify shared sentences against the ordered keyword lists; fall back
/// to a default derived from the entity-type pair.
fn classify(
    shared_sentences: &[&str],
    type_a: EntityType,
    type_b: EntityType,
) -> (RelationshipType, bool) {
    let combined = shared_sentences.join(" ").to_lowercase();

    for (relationship_type, keywords) in RELATIONSHIP_PATTERNS {
        if keywords.iter().any(|k| combined.contains(k)) {
            return (*relationship_type, true);
        }
    }

    (default_for_pair(type_a, type_b), false)
}

/// Default relationship when no keyword matches.
fn default_for_pair(a: EntityType, b: EntityType) -> RelationshipType {
    use EntityType::*;
    let org_like = |t: EntityType| {
        matches!(t, Organization | GovernmentAgency | MilitaryUnit | PoliticalParty | CriminalOrganization)
    };

    if (a == Person && org_like(b)) || (b == Person && org_like(a)) {
        RelationshipType::PartOf
    } else if (a == Location && (b == Person || org_like(b)))
        || (b == Location && (a == Person || org_like(a)))
    {
        RelationshipType::Impacts
    } else {
        RelationshipType::CoOccurrence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, entity_type: EntityType, confidence: f64) -> DetectorEntity {
        DetectorEntity {
            entity_id: Uuid::new_v4(),
            name_lower: name.to_lowercase(),
            entity_type,
            confidence,
        }
    }

    #[test]
    fn meeting_language_classifies_as_collaboration() {
        let entities = vec![
            entity("Putin", EntityType::Person, 0.9),
            entity("Xi Jinping", EntityType::Person, 0.9),
        ];
        let candidates =
            RelationshipDetector::detect("President Putin met with Xi Jinping in Moscow.", &entities);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].relationship_type,
            RelationshipType::CollaboratesWith
        );
        assert!(candidates[0].pattern_matched);
    }

    #[test]
    fn attack_language_classifies_as_opposition() {
        let entities = vec![
            entity("rebels", EntityType::CriminalOrganization, 0.8),
            entity("army", EntityType::MilitaryUnit, 0.8),
        ];
        let candidates = RelationshipDetector::detect(
            "The rebels launched an attack on the army positions.",
            &entities,
        );
        assert_eq!(candidates[0].relationship_type, RelationshipType::Opposes);
    }

    #[test]
    fn no_shared_sentence_means_no_candidate() {
        let entities = vec![
            entity("Putin", EntityType::Person, 0.9),
            entity("NATO", EntityType::Organization, 0.9),
        ];
        let candidates = RelationshipDetector::detect(
            "Putin spoke in Moscow. NATO held a summit in Brussels.",
            &entities,
        );
        assert!(candidates.is_empty());
    }

    #[test]
    fn person_org_default_is_part_of() {
        let entities = vec![
            entity("Ivanov", EntityType::Person, 0.9),
            entity("Gazprom", EntityType::Organization, 0.9),
        ];
        let candidates =
            RelationshipDetector::detect("Ivanov and Gazprom appeared in the filing.", &entities);
        assert_eq!(candidates[0].relationship_type, RelationshipType::PartOf);
        assert!(!candidates[0].pattern_matched);
    }

    #[test]
    fn location_pair_default_is_impacts() {
        let entities = vec![
            entity("Moscow", EntityType::Location, 0.9),
            entity("Gazprom", EntityType::Organization, 0.9),
        ];
        let candidates =
            RelationshipDetector::detect("Moscow and Gazprom were named in the notice.", &entities);
        assert_eq!(candidates[0].relationship_type, RelationshipType::Impacts);
    }

    #[test]
    fn unrelated_pair_default_is_co_occurrence() {
        let entities = vec![
            entity("Putin", EntityType::Person, 0.9),
            entity("Xi Jinping", EntityType::Person, 0.9),
        ];
        let candidates =
            RelationshipDetector::detect("Putin and Xi Jinping were both named.", &entities);
        assert_eq!(
            candidates[0].relationship_type,
            RelationshipType::CoOccurrence
        );
    }

    #[test]
    fn confidence_derives_from_weakest_entity() {
        let entities = vec![
            entity("Putin", EntityType::Person, 0.9),
            entity("Xi Jinping", EntityType::Person, 0.5),
        ];
        let candidates =
            RelationshipDetector::detect("Putin and Xi Jinping were both named.", &entities);
        // co-occurrence: min(0.9, 0.5) * 0.8
        assert!((candidates[0].confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn three_entities_yield_three_pairs() {
        let entities = vec![
            entity("Putin", EntityType::Person, 0.9),
            entity("Xi Jinping", EntityType::Person, 0.9),
            entity("Moscow", EntityType::Location, 0.9),
        ];
        let candidates = RelationshipDetector::detect(
            "Putin hosted Xi Jinping in Moscow.",
            &entities,
        );
        assert_eq!(candidates.len(), 3);
    }
}
