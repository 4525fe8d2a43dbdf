//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads a [`ClientConfig`](crate::domain::ClientConfig)
//! from a TOML file and writes one back.  Absent fields fall back to the
//! serde defaults declared on the config type, so a file holding only the
//! token is valid.

pub mod config;

pub use config::{load_config, save_config, ConfigError};
