//! Shared helpers for cansrv integration tests

#![allow(dead_code)]

use cansrv::config::{
    ProtocolMap, CAN_PROTOCOL, KEY_FILTER_ID, KEY_FILTER_MASK, KEY_INTERFACE, KEY_TIMEOUT,
};
use cansrv::test_utils::MockConnector;
use cansrv::{CanDriver, CommandRequest, DeviceDriver};

/// `CAN` protocol properties for a device on `interface`
pub fn can_address(interface: &str, timeout_secs: u32) -> ProtocolMap {
    let timeout = timeout_secs.to_string();
    let properties = [
        (KEY_INTERFACE, interface),
        (KEY_FILTER_ID, "0x100"),
        (KEY_FILTER_MASK, "0x700"),
        (KEY_TIMEOUT, timeout.as_str()),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut protocols = ProtocolMap::new();
    protocols.insert(CAN_PROTOCOL.to_string(), properties);
    protocols
}

/// Driver with one registered device `engine` on `vcan0`
pub fn driver_with_device(timeout_secs: u32) -> (CanDriver<MockConnector>, MockConnector) {
    let connector = MockConnector::new();
    let driver = CanDriver::new(connector.clone());
    driver
        .create_address("engine", &can_address("vcan0", timeout_secs))
        .unwrap();
    (driver, connector)
}

pub fn requests(names: &[&str]) -> Vec<CommandRequest> {
    names.iter().map(|n| CommandRequest::new(*n)).collect()
}
