//! Shared service library
//!
//! Provides the pieces every service binary in the workspace needs:
//! - logging initialization and runtime level changes
//! - configuration file loading
//! - command-line base arguments
//! - graceful shutdown signal handling

pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

// Bootstrap modules
pub mod bootstrap_args;

// Re-export common dependencies
pub use serde;
pub use tokio;

// Re-export CLI dependencies when cli feature is enabled
#[cfg(feature = "cli")]
pub use clap;
