//! Configuration handling for the KaaS build service.
//!
//! This crate handles:
//! - Resolving deploy/service config references against a fetched repository
//! - System configuration (kaas.kdl) for the server and the pipeline

pub mod error;
pub mod resolver;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use resolver::ConfigResolver;
pub use system::SystemConfig;
