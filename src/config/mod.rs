//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config struct and loading (Config, ServerConfig, LoggingConfig)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`sync`]: Edit dispatch and fan-out tuning (SyncConfig, DispatchMode)
//! - [`validation`]: Startup validation

mod listen;
mod sync;
mod types;
mod validation;

pub use listen::ListenConfig;
pub use sync::{DispatchMode, SyncConfig};
pub use types::{Config, LogFormat};
pub use validation::validate;
