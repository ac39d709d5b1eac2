use std::io::Write;

use modbus_link::exception_codes::{code_category, code_description, code_name, ExceptionCategory, ExceptionRegistry};

#[test]
fn vendor_codes_merge_from_file() {
    modbus_link::init_defaults().expect("defaults");
    assert!(code_description(2).is_some());

    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        file,
        r#"
[[codes]]
code = "0x80"
name = "GatewayOffline"
description = "Vendor gateway lost its downstream link."
category = "Gateway"
"#
    )
    .expect("write toml");

    let vendor = ExceptionRegistry::from_path(file.path()).expect("parse");
    assert_eq!(vendor.len(), 1);
    vendor.register_or_merge().expect("merge");

    assert_eq!(code_name(0x80).as_deref(), Some("GatewayOffline"));
    assert_eq!(code_category(0x80), ExceptionCategory::Gateway);
    // standard codes survive the merge
    assert_eq!(code_name(6).as_deref(), Some("SlaveDeviceBusy"));
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ExceptionRegistry::from_path(&dir.path().join("absent.toml")).err();
    assert!(matches!(err, Some(modbus_link::ModbusError::Config(_))));
}
