//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, default resolution)
//!     → AppConfig (validated, immutable)
//!     → RouterConfig handed to the engine registry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Unknown engine names fail at parse time
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, AxumConfig, CompressionConfig, EngineType, HyperConfig, ObservabilityConfig,
    RouterConfig, ShutdownConfig, UnknownEngineType, MIN_MAX_HEADER_BYTES,
};
pub use validation::{validate_config, ValidationError};
