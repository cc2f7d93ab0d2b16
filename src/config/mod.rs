//! Sidecar runtime configuration.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → ManagerConfig (immutable for the process lifetime)
//!     → CLI flags override selected fields in main
//! ```
//!
//! # Design Decisions
//! - Every section has defaults, so an empty file is a valid config
//! - Syntactic errors come from serde, semantic ones from validation

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CommandChannelConfig, ContainerRuntimeConfig, ListenerConfig, ManagerConfig, ObservabilityConfig,
    ReconfigureConfig, WatcherConfig,
};
pub use validation::{validate_config, ValidationError};
