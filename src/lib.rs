//! BLE HID-over-GATT peripheral: a GATT object tree with HID, Device
//! Information and Battery services, report encoding, and the bridge that
//! serves it through the host Bluetooth stack.

pub mod advertisement;
pub mod ble;
pub mod config;
pub mod consts;
pub mod error;
pub mod gatt;
pub mod hid;
pub mod host_power;
pub mod input;
pub mod report;
