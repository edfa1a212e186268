//! Unified service bootstrap utilities
//!
//! Service metadata and the startup banner printed by every service.

use tracing::info;

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "cansrv")
    pub name: String,
    /// Service version
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = match service.name.as_str() {
        "cansrv" => {
            r#"
  ██████╗ █████╗ ███╗   ██╗███████╗██████╗ ██╗   ██╗
 ██╔════╝██╔══██╗████╗  ██║██╔════╝██╔══██╗██║   ██║
 ██║     ███████║██╔██╗ ██║███████╗██████╔╝██║   ██║
 ██║     ██╔══██║██║╚██╗██║╚════██║██╔══██╗╚██╗ ██╔╝
 ╚██████╗██║  ██║██║ ╚████║███████║██║  ██║ ╚████╔╝
  ╚═════╝╚═╝  ╚═╝╚═╝  ╚═══╝╚══════╝╚═╝  ╚═╝  ╚═══╝
            "#
        },
        _ => "",
    };

    if !banner.is_empty() {
        info!("{}", banner);
    }
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
}
