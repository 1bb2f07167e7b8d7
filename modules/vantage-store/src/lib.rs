pub mod entities;
pub mod news;
pub mod runs;
pub mod schema;

pub use entities::{EntityStore, TrackOutcome};
pub use news::{BatchOutcome, NewsStore};
pub use runs::RunStore;
pub use schema::ensure_schema;
