pub mod adapter;
pub mod adapters;
pub mod scheduler;
pub mod sources;

pub use adapter::{CollectError, SourceAdapter};
pub use vantage_common::bus::BroadcastBus;
pub use scheduler::{CollectionScheduler, SchedulerStatus};
