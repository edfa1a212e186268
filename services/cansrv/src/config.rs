//! Configuration for the CAN device service
//!
//! Two layers:
//! - the service file (`service`, `logging`, `devices`) loaded through
//!   `common::config_loader`
//! - the per-device `CAN` protocol properties, parsed into a [`FilterSpec`]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use errors::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

use crate::codec::DecodeMode;
use crate::error::ConfigError;

/// Protocol section name carrying the CAN address
pub const CAN_PROTOCOL: &str = "CAN";

/// Address property keys
pub const KEY_INTERFACE: &str = "DevInterface";
pub const KEY_FILTER_ID: &str = "FilterMsgId";
pub const KEY_FILTER_MASK: &str = "FilterMask";
pub const KEY_TIMEOUT: &str = "TimeOut";

/// Longest interface name the kernel accepts (`IFNAMSIZ - 1`)
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "CANSRV";

pub const DEFAULT_SERVICE_NAME: &str = "cansrv";

/// String properties of one protocol section
pub type ProtocolProperties = HashMap<String, String>;

/// Protocol name to properties, as attached to a device
pub type ProtocolMap = HashMap<String, ProtocolProperties>;

/// Socket parameters for one device: interface, single filter, timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub interface_name: String,
    pub match_id: u32,
    pub match_mask: u32,
    pub receive_timeout: Duration,
}

impl FilterSpec {
    /// Create a validated spec; `timeout_secs` must be positive
    pub fn new(
        interface_name: impl Into<String>,
        match_id: u32,
        match_mask: u32,
        timeout_secs: u32,
    ) -> Result<Self, ConfigError> {
        let interface_name = interface_name.into();
        validate_interface_name(&interface_name)?;
        if timeout_secs == 0 {
            return Err(ConfigError::invalid(KEY_TIMEOUT, "must be at least 1 second"));
        }

        Ok(Self {
            interface_name,
            match_id,
            match_mask,
            receive_timeout: Duration::from_secs(u64::from(timeout_secs)),
        })
    }
}

fn validate_interface_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::invalid(KEY_INTERFACE, "empty interface name"));
    }
    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(ConfigError::invalid(
            KEY_INTERFACE,
            format!(
                "interface name '{}' longer than {} bytes",
                name, MAX_INTERFACE_NAME_LEN
            ),
        ));
    }
    if name.contains(['/', '\0']) || name.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(
            KEY_INTERFACE,
            format!("invalid interface name '{}'", name),
        ));
    }
    Ok(())
}

/// Parse a device address (all protocol sections) into a [`FilterSpec`]
pub fn parse_address(protocols: &ProtocolMap) -> Result<FilterSpec, ConfigError> {
    let properties = protocols
        .get(CAN_PROTOCOL)
        .ok_or(ConfigError::MissingProtocol)?;
    parse_can_properties(properties)
}

/// Parse the `CAN` protocol section
pub fn parse_can_properties(properties: &ProtocolProperties) -> Result<FilterSpec, ConfigError> {
    let interface = required(properties, KEY_INTERFACE)?;
    let match_id = required_number(properties, KEY_FILTER_ID)?;
    let match_mask = required_number(properties, KEY_FILTER_MASK)?;
    let timeout = required_number(properties, KEY_TIMEOUT)?;

    FilterSpec::new(interface.trim(), match_id, match_mask, timeout)
}

fn required<'a>(properties: &'a ProtocolProperties, key: &str) -> Result<&'a str, ConfigError> {
    properties
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::missing(key))
}

fn required_number(properties: &ProtocolProperties, key: &str) -> Result<u32, ConfigError> {
    let text = required(properties, key)?;
    parse_unsigned(text).map_err(|reason| ConfigError::invalid(key, reason))
}

/// Parse an unsigned integer the way `strtoul(text, _, 0)` reads it
///
/// `0x`/`0X` selects hex, a leading `0` octal, anything else decimal. Unlike
/// `strtoul`, trailing characters and values above `u32::MAX` are errors.
pub fn parse_unsigned(text: &str) -> Result<u32, String> {
    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let (digits, radix) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        (hex, 16)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (&unsigned[1..], 8)
    } else {
        (unsigned, 10)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(format!("'{}' is not an unsigned integer", text));
    }

    u32::from_str_radix(digits, radix).map_err(|_| format!("'{}' is out of range", text))
}

// ============================================================================
// Service configuration file
// ============================================================================

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Reject PUT payload values above 255 instead of truncating them
    #[serde(default)]
    pub strict_payload: bool,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            strict_payload: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log root directory; `SERVICE_LOG_DIR` overrides it
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write the log file as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_log_level(),
            json: false,
        }
    }
}

/// One device with its protocol properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub protocols: ProtocolMap,
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load from a YAML/TOML/JSON file with `CANSRV_*` overrides
    pub fn load(path: impl AsRef<Path>) -> ServiceResult<Self> {
        common::config_loader::load_config_from_file(path, Some(ENV_PREFIX))
    }

    /// Check every device address and reject duplicate device names
    ///
    /// Returns the parsed specs in file order.
    pub fn validate(&self) -> ServiceResult<Vec<(String, FilterSpec)>> {
        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(self.devices.len());

        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(ServiceError::InvalidConfig {
                    field: "devices.name".to_string(),
                    reason: "device name must not be empty".to_string(),
                });
            }
            if !seen.insert(device.name.as_str()) {
                return Err(ServiceError::InvalidConfig {
                    field: format!("devices.{}", device.name),
                    reason: "duplicate device name".to_string(),
                });
            }

            let spec = parse_address(&device.protocols).map_err(|e| {
                ServiceError::InvalidConfig {
                    field: format!("devices.{}", device.name),
                    reason: e.to_string(),
                }
            })?;
            specs.push((device.name.clone(), spec));
        }

        Ok(specs)
    }
}

/// Service-level settings handed to the driver at initialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverConfig {
    pub strict_payload: bool,
}

impl DriverConfig {
    pub fn decode_mode(&self) -> DecodeMode {
        DecodeMode::from_strict(self.strict_payload)
    }
}

impl From<&ServiceSection> for DriverConfig {
    fn from(section: &ServiceSection) -> Self {
        Self {
            strict_payload: section.strict_payload,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> ProtocolProperties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_props() -> ProtocolProperties {
        props(&[
            (KEY_INTERFACE, "vcan0"),
            (KEY_FILTER_ID, "0x123"),
            (KEY_FILTER_MASK, "0x7FF"),
            (KEY_TIMEOUT, "1"),
        ])
    }

    #[test]
    fn test_parse_unsigned_bases() {
        assert_eq!(parse_unsigned("291"), Ok(291));
        assert_eq!(parse_unsigned("0x123"), Ok(0x123));
        assert_eq!(parse_unsigned("0X7ff"), Ok(0x7FF));
        assert_eq!(parse_unsigned("0443"), Ok(0o443));
        assert_eq!(parse_unsigned("0"), Ok(0));
        assert_eq!(parse_unsigned(" +10 "), Ok(10));
        assert_eq!(parse_unsigned("0xFFFFFFFF"), Ok(u32::MAX));
    }

    #[test]
    fn test_parse_unsigned_rejects() {
        assert!(parse_unsigned("").is_err());
        assert!(parse_unsigned("0x").is_err());
        assert!(parse_unsigned("12abc").is_err());
        assert!(parse_unsigned("089").is_err());
        assert!(parse_unsigned("-1").is_err());
        assert!(parse_unsigned("++1").is_err());
        assert!(parse_unsigned("0x100000000").unwrap_err().contains("out of range"));
    }

    #[test]
    fn test_parse_address() {
        let mut protocols = ProtocolMap::new();
        protocols.insert(CAN_PROTOCOL.to_string(), full_props());

        let spec = parse_address(&protocols).unwrap();
        assert_eq!(spec.interface_name, "vcan0");
        assert_eq!(spec.match_id, 0x123);
        assert_eq!(spec.match_mask, 0x7FF);
        assert_eq!(spec.receive_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_protocol_section() {
        let mut protocols = ProtocolMap::new();
        protocols.insert("modbus-tcp".to_string(), full_props());
        assert_eq!(parse_address(&protocols), Err(ConfigError::MissingProtocol));
    }

    #[test]
    fn test_missing_keys_are_named() {
        for key in [KEY_INTERFACE, KEY_FILTER_ID, KEY_FILTER_MASK, KEY_TIMEOUT] {
            let mut properties = full_props();
            properties.remove(key);
            let err = parse_can_properties(&properties).unwrap_err();
            assert_eq!(err, ConfigError::missing(key));
        }
    }

    #[test]
    fn test_invalid_values() {
        let mut properties = full_props();
        properties.insert(KEY_FILTER_MASK.to_string(), "mask".to_string());
        let err = parse_can_properties(&properties).unwrap_err();
        assert_eq!(err.key(), Some(KEY_FILTER_MASK));

        let mut properties = full_props();
        properties.insert(KEY_TIMEOUT.to_string(), "0".to_string());
        let err = parse_can_properties(&properties).unwrap_err();
        assert_eq!(err.key(), Some(KEY_TIMEOUT));

        let mut properties = full_props();
        properties.insert(KEY_INTERFACE.to_string(), "averyveryverylongcan0".to_string());
        let err = parse_can_properties(&properties).unwrap_err();
        assert_eq!(err.key(), Some(KEY_INTERFACE));

        let mut properties = full_props();
        properties.insert(KEY_INTERFACE.to_string(), "  ".to_string());
        assert!(parse_can_properties(&properties).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut protocols = ProtocolMap::new();
        protocols.insert(CAN_PROTOCOL.to_string(), full_props());
        let device = DeviceConfig {
            name: "engine".to_string(),
            protocols,
        };
        let config = ServiceConfig {
            devices: vec![device.clone(), device],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_driver_config_mode() {
        let section = ServiceSection {
            strict_payload: true,
            ..Default::default()
        };
        assert_eq!(DriverConfig::from(&section).decode_mode(), DecodeMode::Strict);
        assert_eq!(DriverConfig::default().decode_mode(), DecodeMode::Lenient);
    }
}
