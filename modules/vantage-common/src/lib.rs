pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod text;
pub mod types;

pub use bus::BroadcastBus;
pub use config::Config;
pub use error::VantageError;
pub use events::*;
pub use text::*;
pub use types::*;
