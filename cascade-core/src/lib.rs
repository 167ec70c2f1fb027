//! Dependent selection chains: cascading selectors whose options depend on
//! the value chosen upstream, with remembered choices and submit gating.

pub mod cache;
pub mod chain;
pub mod config;
pub mod driver;
pub mod engine;
pub mod model;
pub mod reducer;
pub mod source;
pub mod state;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachePolicy, CacheStore, FileCacheStore, MemoryCacheStore};
pub use chain::{Chain, ChainDefinition, SelectionError, define_chain};
pub use config::{ChainConfig, ConfigError, LevelConfig};
pub use driver::{ChainCommand, ChainDriver, ChainHandle, DriverError};
pub use model::{AutoSelect, CacheSlot, Level, LevelId, SelectOption, SelectionMode};
pub use reducer::{ChainEvent, EventEnvelope, SelectionOrigin};
pub use source::{DataSource, FetchError, FetchRequest, Resolution, SubmitError, SubmitReceipt, SubmitSink};
pub use state::{ChainState, LevelState, OptionsState};
pub use validation::{LevelError, ValidationGate};
