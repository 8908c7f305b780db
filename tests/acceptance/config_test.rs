//! Configuration loading feeding the register bank.

use std::io::Write;

use instr_common::{DeviceConfig, DEVICE_NAME_LEN};

use crate::acceptance::common::TestDevice;

#[test]
fn config_file_identity_shows_up_in_registers() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [identity]
        who_am_i = 777
        device_name = "Bench Rig"
        serial_number = 31

        [sync]
        offset_us = 450
        "#
    )
    .unwrap();

    let config = DeviceConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.sync.offset_us, 450);

    let mut device = TestDevice::with_identity(config.identity);
    assert_eq!(device.read_register(0), 777u16.to_le_bytes());
    assert_eq!(device.read_register(13), 31u16.to_le_bytes());

    assert_eq!(device.read_register(12), b"Bench Rig");
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config = DeviceConfig::from_toml("[identity]\nwho_am_i = 5\n").unwrap();
    assert_eq!(config.identity.who_am_i, 5);
    assert_eq!(config.identity.device_name, "Virtual Instrument");
    assert!(config.sync.enabled);
    assert_eq!(config.transport.listen_addr, "127.0.0.1:9101");
}

#[test]
fn oversized_name_fails_validation_before_reaching_the_bank() {
    let mut config = DeviceConfig::default();
    config.identity.device_name = "N".repeat(DEVICE_NAME_LEN + 1);
    assert!(config.validate().is_err());
}
