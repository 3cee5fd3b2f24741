//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MonitorConfig (validated, immutable)
//!     → lifecycle::startup builds the Monitor from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breakers and policies are registered from it once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::CircuitBreakerConfig;
pub use schema::MonitorConfig;
pub use schema::RetryPolicyConfig;
