//! Configuration loading, parsing, and validation.

mod loader;
mod provider;
mod types;
mod validation;

pub use loader::{ConfigError, load_config, parse_config};
pub use provider::{
    CachedConfigProvider, ConfigProvider, FileConfigProvider, Freshness, StaticConfigProvider,
    file_provider,
};
pub use types::*;
pub use validation::validate_config;
