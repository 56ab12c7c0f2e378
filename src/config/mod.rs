//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PreforkConfig (validated, immutable)
//!     → CLI flags override individual fields in the binary
//! ```
//!
//! # Design Decisions
//! - Config is read once in the manager; workers re-read the same file
//!   because they are started with the same argument vector
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdmissionConfig, ListenerConfig, ObservabilityConfig, PreforkConfig, WorkersConfig,
};
pub use validation::{validate_config, ValidationError};
