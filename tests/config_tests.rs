use std::time::Duration;

use clap::Parser;

use blehub::config::{Args, Config};
use blehub::hid::Profile;
use blehub::report::MouseLayout;

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.device_name, "BLE-HID");
    assert_eq!(config.profile, Profile::Mouse);
    assert_eq!(config.appearance(), 0x03C2);
    assert!(config.stdin);
    assert!(config.battery);
    assert!(!config.simulate.enabled);
    assert_eq!(config.simulate.interval(), Duration::from_secs(2));
}

#[test]
fn json_overrides_defaults() {
    let config = Config::from_json_str(
        r#"{
            "device_name": "Desk Remote",
            "profile": "combo",
            "mouse_layout": "wide",
            "simulate": { "enabled": true, "interval_ms": 500 },
            "device_info": { "manufacturer": "acme", "vendor_id": 4660 }
        }"#,
    )
    .unwrap();
    assert_eq!(config.device_name, "Desk Remote");
    assert_eq!(config.profile, Profile::Combo);
    assert_eq!(config.mouse_layout, MouseLayout::Wide);
    assert_eq!(config.appearance(), 0x03C0);
    assert_eq!(config.simulate.interval(), Duration::from_millis(500));
    assert_eq!(config.simulate.step, 10);
    assert_eq!(config.device_info.manufacturer, "acme");
    assert_eq!(config.device_info.model, "BLE-HID-1");
    assert_eq!(config.device_info.pnp.vendor_id, 0x1234);
    assert_eq!(config.device_info.pnp.product_id, 0x0001);
}

#[test]
fn invalid_json_is_an_error() {
    assert!(Config::from_json_str(r#"{ "profile": "joystick" }"#).is_err());
    assert!(Config::from_json_str("not json").is_err());
}

#[test]
fn cli_flags_override_config() {
    let args = Args::parse_from([
        "blehub",
        "--name",
        "Hub",
        "--appearance",
        "0x03C1",
        "--profile",
        "keyboard",
        "--simulate",
        "--no-stdin",
        "--no-battery",
    ]);
    let config = Config::load(&args).unwrap();
    assert_eq!(config.device_name, "Hub");
    assert_eq!(config.profile, Profile::Keyboard);
    assert_eq!(config.appearance(), 0x03C1);
    assert!(config.simulate.enabled);
    assert!(!config.stdin);
    assert!(!config.battery);
    assert_eq!(args.log_level, "info");
}

#[test]
fn missing_config_file_is_an_error() {
    let args = Args::parse_from(["blehub", "--config", "/nonexistent/blehub.json"]);
    assert!(Config::load(&args).is_err());
}
