use anyhow::Result;
use sqlx::PgPool;

/// Relational schema. Invariants live here: URL uniqueness, content-hash
/// index, the one-of-three mention target CHECK, the relationship triple
/// uniqueness, and `(user_id, name_lower)` on tracked entities.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS news_items (
    id UUID PRIMARY KEY,
    source_type VARCHAR(50) NOT NULL,
    source_name VARCHAR(255) NOT NULL,
    source_url TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL UNIQUE,
    published_at TIMESTAMPTZ,
    collected_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    author VARCHAR(255) NOT NULL DEFAULT '',
    categories JSONB NOT NULL DEFAULT '[]'::jsonb,
    processed INTEGER NOT NULL DEFAULT 0,
    relevance_score DOUBLE PRECISION NOT NULL DEFAULT 0.0,
    content_hash VARCHAR(64) NOT NULL DEFAULT '',
    embedding_ref UUID,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb
);
CREATE INDEX IF NOT EXISTS ix_news_items_source_type ON news_items (source_type);
CREATE INDEX IF NOT EXISTS ix_news_items_collected_at ON news_items (collected_at);
CREATE INDEX IF NOT EXISTS ix_news_items_processed ON news_items (processed);
CREATE INDEX IF NOT EXISTS ix_news_items_content_hash ON news_items (content_hash);
CREATE INDEX IF NOT EXISTS ix_news_items_categories ON news_items USING gin (categories);

CREATE TABLE IF NOT EXISTS collection_runs (
    id UUID PRIMARY KEY,
    collector_type VARCHAR(50) NOT NULL,
    collector_name VARCHAR(255) NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ,
    status VARCHAR(20) NOT NULL,
    items_collected BIGINT NOT NULL DEFAULT 0,
    items_new BIGINT NOT NULL DEFAULT 0,
    items_duplicate BIGINT NOT NULL DEFAULT 0,
    items_filtered BIGINT NOT NULL DEFAULT 0,
    error_message TEXT,
    metadata JSONB NOT NULL DEFAULT 'null'::jsonb
);
CREATE INDEX IF NOT EXISTS ix_collection_runs_started ON collection_runs (started_at);

CREATE TABLE IF NOT EXISTS tracked_entities (
    entity_id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    name TEXT NOT NULL,
    name_lower TEXT NOT NULL,
    entity_type VARCHAR(50) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    first_seen TIMESTAMPTZ,
    last_seen TIMESTAMPTZ,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    CONSTRAINT uq_user_entity_name UNIQUE (user_id, name_lower)
);
CREATE INDEX IF NOT EXISTS ix_tracked_entities_user ON tracked_entities (user_id);
CREATE INDEX IF NOT EXISTS ix_tracked_entities_name_lower ON tracked_entities (name_lower);
CREATE INDEX IF NOT EXISTS ix_tracked_entities_canonical
    ON tracked_entities ((metadata->>'canonical_id'));

CREATE TABLE IF NOT EXISTS entity_mentions (
    mention_id UUID PRIMARY KEY,
    entity_id UUID NOT NULL REFERENCES tracked_entities (entity_id) ON DELETE CASCADE,
    document_id UUID,
    news_article_id UUID,
    news_item_id UUID REFERENCES news_items (id) ON DELETE CASCADE,
    user_id UUID NOT NULL,
    chunk_id TEXT NOT NULL,
    context TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_mention_single_target CHECK (
        (CASE WHEN document_id IS NOT NULL THEN 1 ELSE 0 END +
         CASE WHEN news_article_id IS NOT NULL THEN 1 ELSE 0 END +
         CASE WHEN news_item_id IS NOT NULL THEN 1 ELSE 0 END) = 1
    )
);
CREATE INDEX IF NOT EXISTS ix_entity_mentions_entity ON entity_mentions (entity_id);
CREATE INDEX IF NOT EXISTS ix_entity_mentions_user_ts ON entity_mentions (user_id, timestamp);

CREATE TABLE IF NOT EXISTS entity_relationships (
    id UUID PRIMARY KEY,
    source_entity_id UUID NOT NULL REFERENCES tracked_entities (entity_id) ON DELETE CASCADE,
    target_entity_id UUID NOT NULL REFERENCES tracked_entities (entity_id) ON DELETE CASCADE,
    relationship_type VARCHAR(50) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    first_seen TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_seen TIMESTAMPTZ NOT NULL DEFAULT now(),
    mention_count BIGINT NOT NULL DEFAULT 1 CHECK (mention_count >= 1),
    confidence DOUBLE PRECISION NOT NULL DEFAULT 0.0
        CHECK (confidence >= 0.0 AND confidence <= 1.0),
    user_id UUID NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    CONSTRAINT uq_relationship_triple
        UNIQUE (source_entity_id, target_entity_id, relationship_type),
    CONSTRAINT chk_no_self_relationship
        CHECK (source_entity_id <> target_entity_id)
);
"#;

/// Apply the schema idempotently.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
