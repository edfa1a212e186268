//! Common command-line arguments for all services
//!
//! Provides a unified argument structure that individual services convert into
//! from their own `clap` argument types.

#[cfg(feature = "cli")]
use clap::Parser;

/// Common service startup arguments
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Log level (trace, debug, info, warn, error)
    #[cfg_attr(
        feature = "cli",
        clap(short = 'l', long, default_value = "info", env = "RUST_LOG")
    )]
    pub log_level: String,

    /// Enable debug mode with verbose output
    #[cfg_attr(feature = "cli", clap(long, env = "DEBUG"))]
    pub debug: bool,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,

    /// Configuration file override
    #[cfg_attr(feature = "cli", clap(short = 'c', long))]
    pub config_path: Option<String>,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
            no_color: false,
            validate: false,
            config_path: None,
        }
    }
}

impl ServiceArgs {
    /// Parse log level string to tracing::Level
    pub fn parse_log_level(&self) -> tracing::Level {
        if self.debug {
            return tracing::Level::DEBUG;
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// Get configuration file path
    ///
    /// Priority: command line > `{SERVICE}_CONFIG` env > `config/{service}.yaml`
    pub fn get_config_path(&self, service_name: &str) -> String {
        if let Some(path) = &self.config_path {
            return path.clone();
        }

        let env_key = format!("{}_CONFIG", service_name.to_uppercase());
        if let Ok(path) = std::env::var(&env_key) {
            if !path.is_empty() {
                return path;
            }
        }

        format!("config/{}.yaml", service_name)
    }
}
