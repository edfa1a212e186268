//! SocketCAN Device Service (`cansrv`)
//!
//! Loads the device list, registers each device with the CAN driver and
//! serves commands until SIGINT/SIGTERM.

use clap::Parser;
use tracing::{debug, info};

use cansrv::bootstrap::{self, Args, ServiceArgs, SERVICE_NAME};
use errors::ServiceResult;

#[tokio::main]
async fn main() -> ServiceResult<()> {
    // Parse arguments and load configuration
    let args = Args::parse();
    let mut service_args: ServiceArgs = args.clone().into();

    let config_path = service_args.get_config_path(SERVICE_NAME);
    let config = bootstrap::load_configuration(&config_path)?;
    if args.log_level.is_none() {
        service_args.log_level = config.logging.level.clone();
    }

    // Bootstrap: logging, banner
    let service_info = bootstrap::service_info();
    bootstrap::initialize_logging(&service_args, &service_info, Some(&config.logging))?;
    if !args.no_color {
        common::service_bootstrap::print_startup_banner(&service_info);
    }
    info!("Configuration: {}", config_path);
    debug!("Log filter: {}", common::logging::get_log_level());

    // Validation mode: validate and exit
    if args.validate {
        bootstrap::validate_configuration(&config)?;
        info!("Validation completed successfully");
        return Ok(());
    }

    run(config).await
}

#[cfg(target_os = "linux")]
async fn run(config: cansrv::ServiceConfig) -> ServiceResult<()> {
    use std::sync::Arc;

    use cansrv::{CanDriver, DeviceDriver, DriverConfig, SocketCanConnector};
    use errors::ServiceError;

    let driver = Arc::new(CanDriver::new(SocketCanConnector));
    driver.initialize(DriverConfig::from(&config.service))?;

    let registered = bootstrap::register_devices(driver.as_ref(), &config)?;
    info!(
        "{} device(s) registered: {}",
        registered,
        driver.device_names().join(", ")
    );
    info!("CAN device service ready");

    let signal = common::shutdown::wait_for_shutdown().await;
    info!("{} received, shutting down", signal);

    // Closing waits on device locks held by in-flight batches
    let stopper = Arc::clone(&driver);
    tokio::task::spawn_blocking(move || stopper.stop(false))
        .await
        .map_err(|e| ServiceError::ShutdownError(format!("Driver stop failed: {}", e)))?;

    info!("Service shutdown complete");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: cansrv::ServiceConfig) -> ServiceResult<()> {
    Err(errors::ServiceError::StartupFailed(
        "SocketCAN is only available on Linux".to_string(),
    ))
}
