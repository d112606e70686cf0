//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs apply_env (STREAM_HOSTS, PORT, BASE_PATH)
//!     → validation.rs (semantic checks)
//!     → StreamProxyConfig (validated, immutable)
//!     → shared to all subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; the allow-list never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env, load_config, parse_host_list, ConfigError};
pub use schema::{
    ListenerConfig, ObservabilityConfig, PoolConfig, StreamConfig, StreamProxyConfig,
    UpstreamConfig, DEFAULT_STREAM_HOSTS,
};
pub use validation::{validate_config, ValidationError};
