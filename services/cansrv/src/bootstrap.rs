//! Service Bootstrap and Initialization
//!
//! Command-line parsing, logging setup, configuration loading and device
//! registration for the `cansrv` binary.

use clap::Parser;
use tracing::{debug, info};

use common::service_bootstrap::ServiceInfo;
use errors::{ServiceError, ServiceResult};

use crate::config::{LoggingSection, ServiceConfig};
use crate::driver::DeviceDriver;

pub use common::bootstrap_args::ServiceArgs;

/// Service name used for logs, config lookup and the banner
pub const SERVICE_NAME: &str = "cansrv";

/// Command-line arguments for cansrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "cansrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "SocketCAN Device Service",
    long_about = None
)]
pub struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Enable debug mode
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl From<Args> for ServiceArgs {
    fn from(args: Args) -> Self {
        ServiceArgs {
            log_level: args.log_level.unwrap_or_else(|| "info".to_string()),
            debug: args.debug,
            no_color: args.no_color,
            validate: args.validate,
            config_path: args.config,
        }
    }
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo::new(
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        "SocketCAN Device Service - raw CAN frame GET/PUT",
    )
}

/// Initialize logging system with command-line arguments
///
/// Log root directory priority:
/// 1. SERVICE_LOG_DIR environment variable
/// 2. `logging.dir` from the configuration file
/// 3. Default "logs"
pub fn initialize_logging(
    args: &ServiceArgs,
    service_info: &ServiceInfo,
    logging_config: Option<&LoggingSection>,
) -> ServiceResult<()> {
    let config_dir = logging_config.and_then(|c| c.dir.as_deref());
    common::logging::init_log_root(config_dir);

    let log_dir = common::logging::get_log_root().join(&service_info.name);

    let log_config = common::logging::LogConfig {
        service_name: service_info.name.clone(),
        log_dir,
        console_level: args.parse_log_level(),
        enable_file: true,
        enable_json: logging_config.is_some_and(|c| c.json),
        ansi: !args.no_color,
    };

    common::logging::init_with_config(log_config)
        .map_err(|e| ServiceError::Configuration(format!("Failed to init logging: {}", e)))?;
    Ok(())
}

/// Load the service configuration file
pub fn load_configuration(path: &str) -> ServiceResult<ServiceConfig> {
    debug!("Loading configuration from {}", path);
    ServiceConfig::load(path)
}

/// Validate every device address in the configuration
pub fn validate_configuration(config: &ServiceConfig) -> ServiceResult<()> {
    info!("Service: {}", config.service.name);
    info!(
        "Payload decoding: {}",
        if config.service.strict_payload {
            "strict"
        } else {
            "lenient"
        }
    );

    let specs = config.validate()?;
    info!("Found {} device(s)", specs.len());
    for (name, spec) in &specs {
        info!(
            "  Device {}: {} filter 0x{:X}/0x{:X} timeout {}s",
            name,
            spec.interface_name,
            spec.match_id,
            spec.match_mask,
            spec.receive_timeout.as_secs()
        );
    }

    info!("Configuration validation completed successfully");
    Ok(())
}

/// Register every configured device with the driver
///
/// Returns the number of devices registered.
pub fn register_devices(driver: &impl DeviceDriver, config: &ServiceConfig) -> ServiceResult<usize> {
    config.validate()?;
    for device in &config.devices {
        driver.create_address(&device.name, &device.protocols)?;
    }
    Ok(config.devices.len())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_args_conversion() {
        let args = Args::parse_from(["cansrv", "-c", "/etc/cansrv.yaml", "--no-color"]);
        let service_args: ServiceArgs = args.into();
        assert_eq!(service_args.log_level, "info");
        assert!(service_args.no_color);
        assert_eq!(
            service_args.get_config_path(SERVICE_NAME),
            "/etc/cansrv.yaml"
        );
    }

    #[test]
    fn test_args_log_level() {
        let args = Args::parse_from(["cansrv", "-l", "debug", "--validate"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        let service_args: ServiceArgs = args.into();
        assert!(service_args.validate);
        assert_eq!(service_args.parse_log_level(), tracing::Level::DEBUG);
    }
}
