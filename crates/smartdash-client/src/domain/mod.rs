//! Domain layer for the client: runtime configuration types.
//!
//! No I/O happens here.  The infrastructure layer fills these structs from
//! TOML files and CLI arguments.

pub mod config;

pub use config::{Capabilities, ClientConfig, DEFAULT_RECONNECT_DELAY};
