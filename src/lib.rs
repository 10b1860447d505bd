pub mod adapters;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub mod config;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::dataset::InMemoryDataset;
pub use adapters::interpreter::InterpreterClient;
pub use adapters::store::LocalReadingStore;
pub use core::repository::HexagramRepository;
pub use core::session::{ReadingSession, SessionState};
pub use utils::error::{DivinationError, Result};
