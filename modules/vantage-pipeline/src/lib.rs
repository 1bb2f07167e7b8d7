pub mod auto_extractor;
pub mod embedder;
pub mod extractor;
pub mod linker;
pub mod orchestrator;
pub mod queue;
pub mod ranker;
pub mod relationships;
pub mod trends;
pub mod validator;

pub use auto_extractor::{AutoExtractor, BatchExtractionStats};
pub use embedder::{EmbeddingResult, NewsItemEmbedder};
pub use extractor::{EntityExtractor, ExtractedEntity};
pub use linker::{EntityLinker, LinkedEntity};
pub use orchestrator::{ProcessingOptions, ProcessingPipeline, ProcessingStats};
pub use queue::{ExtractionQueueManager, ExtractionTask};
pub use ranker::{RankingConfig, RankingResult, RelevanceRanker};
pub use relationships::RelationshipDetector;
pub use trends::{TrendIndicatorService, TrendSnapshot};
pub use validator::{ContentValidator, ValidationResult};
