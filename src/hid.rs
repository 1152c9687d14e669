use ble_peripheral_rust::uuid::ShortUuid;
use clap::ValueEnum;
use serde::Deserialize;
use uuid::Uuid;

use crate::consts::*;
use crate::error::{GattError, GattResult};
use crate::gatt::{
    Application, ApplicationBuilder, CharacteristicId, CharacteristicKind, DescriptorKind, Flag,
    ServiceId,
};
use crate::report::{Delivery, MouseLayout, ReportEntry, ReportFormat, ReportSlot};

/// Key name (as typed on the CLI harness) to USB HID keyboard usage.
pub fn key_name_to_usage(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    if bytes.len() == 1 {
        return match bytes[0] {
            c @ b'a'..=b'z' => Some(0x04 + (c - b'a')),
            b'0' => Some(0x27),
            c @ b'1'..=b'9' => Some(0x1E + (c - b'1')),
            b'-' => Some(0x2D),
            b'=' => Some(0x2E),
            b'[' => Some(0x2F),
            b']' => Some(0x30),
            b'\\' => Some(0x31),
            b';' => Some(0x33),
            b'\'' => Some(0x34),
            b'`' => Some(0x35),
            b',' => Some(0x36),
            b'.' => Some(0x37),
            b'/' => Some(0x38),
            _ => None,
        };
    }
    Some(match lower.as_str() {
        "enter" | "return" => 0x28,
        "escape" | "esc" => 0x29,
        "backspace" => 0x2A,
        "tab" => 0x2B,
        "space" => 0x2C,
        "minus" => 0x2D,
        "equal" => 0x2E,
        "capslock" => 0x39,
        "f1" => 0x3A,
        "f2" => 0x3B,
        "f3" => 0x3C,
        "f4" => 0x3D,
        "f5" => 0x3E,
        "f6" => 0x3F,
        "f7" => 0x40,
        "f8" => 0x41,
        "f9" => 0x42,
        "f10" => 0x43,
        "f11" => 0x44,
        "f12" => 0x45,
        "printscreen" => 0x46,
        "scrolllock" => 0x47,
        "pause" => 0x48,
        "insert" => 0x49,
        "home" => 0x4A,
        "pageup" => 0x4B,
        "delete" | "del" => 0x4C,
        "end" => 0x4D,
        "pagedown" => 0x4E,
        "right" => 0x4F,
        "left" => 0x50,
        "down" => 0x51,
        "up" => 0x52,
        "numlock" => 0x53,
        "lctrl" | "ctrl" => 0xE0,
        "lshift" | "shift" => 0xE1,
        "lalt" | "alt" => 0xE2,
        "lgui" | "gui" | "super" => 0xE3,
        "rctrl" => 0xE4,
        "rshift" => 0xE5,
        "ralt" => 0xE6,
        "rgui" => 0xE7,
        _ => return None,
    })
}

pub fn keyboard_usage_to_modifier(usage: u8) -> Option<u8> {
    match usage {
        0xE0 => Some(1 << 0), // LCtrl
        0xE1 => Some(1 << 1), // LShift
        0xE2 => Some(1 << 2), // LAlt
        0xE3 => Some(1 << 3), // LGUI
        0xE4 => Some(1 << 4), // RCtrl
        0xE5 => Some(1 << 5), // RShift
        0xE6 => Some(1 << 6), // RAlt
        0xE7 => Some(1 << 7), // RGUI
        _ => None,
    }
}

// ----- Keyboard, Report ID 1: modifiers, reserved, 6 keycodes -----
pub const KEYBOARD_REPORT_MAP: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x85, RID_KEYBD, //   Report ID (1)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    // Modifier byte
    0x19, 0xE0, //   Usage Minimum (Left Ctrl)
    0x29, 0xE7, //   Usage Maximum (Right GUI)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data,Var,Abs)
    // Reserved byte
    0x75, 0x08, //   Report Size (8)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x03, //   Input (Const,Var,Abs)
    // 6 Keycode array
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x65, //   Logical Maximum (101)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0x65, //   Usage Maximum (101)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x06, //   Report Count (6)
    0x81, 0x00, //   Input (Data,Array)
    0xC0, // End Collection
];

// ----- Mouse, Report ID 2: 3 buttons + pad, X/Y/wheel as i8 -----
pub const MOUSE_REPORT_MAP: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x85, RID_MOUSE, //   Report ID (2)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x05, 0x09, //     Usage Page (Buttons)
    0x19, 0x01, //     Usage Minimum (Button 1)
    0x29, 0x03, //     Usage Maximum (Button 3)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x95, 0x03, //     Report Count (3)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data,Var,Abs)
    0x95, 0x01, //     Report Count (1)
    0x75, 0x05, //     Report Size (5)
    0x81, 0x03, //     Input (Const,Var,Abs)
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x09, 0x38, //     Usage (Wheel)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x03, //     Report Count (3)
    0x81, 0x06, //     Input (Data,Var,Rel)
    0xC0, //   End Collection
    0xC0, // End Collection
];

// ----- Mouse, Report ID 2: 5 buttons + pad, X/Y as i16, wheel as i8 -----
pub const MOUSE_WIDE_REPORT_MAP: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x85, RID_MOUSE, //   Report ID (2)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x05, 0x09, //     Usage Page (Buttons)
    0x19, 0x01, //     Usage Minimum (Button 1)
    0x29, 0x05, //     Usage Maximum (Button 5)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x95, 0x05, //     Report Count (5)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data,Var,Abs)
    0x95, 0x01, //     Report Count (1)
    0x75, 0x03, //     Report Size (3)
    0x81, 0x03, //     Input (Const,Var,Abs)
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x16, 0x01, 0xF8, //     Logical Minimum (-2047)
    0x26, 0xFF, 0x07, //     Logical Maximum (2047)
    0x75, 0x10, //     Report Size (16)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x06, //     Input (Data,Var,Rel)
    0x09, 0x38, //     Usage (Wheel)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x01, //     Report Count (1)
    0x81, 0x06, //     Input (Data,Var,Rel)
    0xC0, //   End Collection
    0xC0, // End Collection
];

/// bcdHID 1.11 (LE), country 0 (not localized), flags 0x02 (normally connectable).
pub const HID_INFO: [u8; 4] = [0x11, 0x01, 0x00, 0x02];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Mouse,
    Keyboard,
    /// Keyboard and mouse multiplexed on one Report characteristic.
    Combo,
}

impl Profile {
    pub fn appearance(self) -> u16 {
        match self {
            Profile::Mouse => APPEARANCE_MOUSE,
            Profile::Keyboard => APPEARANCE_KEYBOARD,
            Profile::Combo => APPEARANCE_GENERIC_HID,
        }
    }
}

pub fn mouse_report_map(layout: MouseLayout) -> &'static [u8] {
    match layout {
        MouseLayout::Compact => MOUSE_REPORT_MAP,
        MouseLayout::Wide => MOUSE_WIDE_REPORT_MAP,
    }
}

/// The Report Map served for a profile.
pub fn report_map(profile: Profile, layout: MouseLayout) -> Vec<u8> {
    match profile {
        Profile::Mouse => mouse_report_map(layout).to_vec(),
        Profile::Keyboard => KEYBOARD_REPORT_MAP.to_vec(),
        Profile::Combo => [KEYBOARD_REPORT_MAP, mouse_report_map(layout)].concat(),
    }
}

/// Report slots (one per Report characteristic) for a profile.
pub fn report_slots(profile: Profile, layout: MouseLayout) -> Vec<ReportSlot> {
    let keyboard = ReportEntry {
        id: RID_KEYBD,
        format: ReportFormat::Keyboard,
    };
    let mouse = ReportEntry {
        id: RID_MOUSE,
        format: ReportFormat::Mouse(layout),
    };
    match profile {
        Profile::Mouse => vec![ReportSlot::dedicated(mouse.id, mouse.format)],
        Profile::Keyboard => vec![ReportSlot::dedicated(keyboard.id, keyboard.format)],
        Profile::Combo => vec![ReportSlot::shared(vec![keyboard, mouse])],
    }
}

/// PnP ID characteristic payload (Device Information Service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PnpId {
    pub vendor_id_source: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_version: u16,
}

impl Default for PnpId {
    fn default() -> Self {
        Self {
            vendor_id_source: 0x02, // USB Implementer's Forum
            vendor_id: 0x0457,
            product_id: 0x0001,
            product_version: 0x0100,
        }
    }
}

impl PnpId {
    pub fn to_bytes(self) -> [u8; 7] {
        let [v0, v1] = self.vendor_id.to_le_bytes();
        let [p0, p1] = self.product_id.to_le_bytes();
        let [r0, r1] = self.product_version.to_le_bytes();
        [self.vendor_id_source, v0, v1, p0, p1, r0, r1]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    #[serde(flatten)]
    pub pnp: PnpId,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            manufacturer: "blehub".to_owned(),
            model: "BLE-HID-1".to_owned(),
            pnp: PnpId::default(),
        }
    }
}

/// Everything needed to assemble the peripheral's GATT tree.
#[derive(Debug, Clone, Default)]
pub struct HidOptions {
    pub profile: Profile,
    pub mouse_layout: MouseLayout,
    pub device_info: DeviceInfo,
    /// Initial level when the Battery Service is exposed.
    pub battery: Option<u8>,
}

/// Add a Report characteristic with its CCCD; dedicated slots also get a
/// Report Reference tagging `{report_id, Input}`.
pub fn add_report(builder: &mut ApplicationBuilder, service: ServiceId, slot: ReportSlot) -> CharacteristicId {
    let reference = match slot.entries() {
        [only] if !slot.is_shared() => Some(only.id),
        _ => None,
    };
    let idle = slot.idle_value();
    let chrc = builder.add_characteristic(
        service,
        Uuid::from_short(UUID_HID_REPORT),
        &[Flag::Read, Flag::Notify],
        CharacteristicKind::Report(slot),
        idle,
    );
    builder.add_cccd(chrc);
    if let Some(id) = reference {
        builder.add_descriptor(
            chrc,
            Uuid::from_short(UUID_REPORT_REF_DESC),
            &[Flag::Read],
            DescriptorKind::ReportReference,
            vec![id, REPORT_TYPE_INPUT],
        );
    }
    chrc
}

/// HID Service with Protocol Mode, HID Information, Report Map, the given
/// Report characteristics and HID Control Point, in that order.
pub fn add_hid_service(
    builder: &mut ApplicationBuilder,
    report_map: Vec<u8>,
    slots: Vec<ReportSlot>,
) -> ServiceId {
    let service = builder.add_service(Uuid::from_short(UUID_HID_SERVICE), true);
    builder.add_characteristic(
        service,
        Uuid::from_short(UUID_HID_PROTOCOL_MODE),
        &[Flag::Read, Flag::WriteWithoutResponse],
        CharacteristicKind::ProtocolMode,
        vec![PROTOCOL_MODE_REPORT],
    );
    builder.add_characteristic(
        service,
        Uuid::from_short(UUID_HID_INFO),
        &[Flag::Read],
        CharacteristicKind::Generic,
        HID_INFO.to_vec(),
    );
    builder.add_characteristic(
        service,
        Uuid::from_short(UUID_HID_REPORT_MAP),
        &[Flag::Read],
        CharacteristicKind::Generic,
        report_map,
    );
    for slot in slots {
        add_report(builder, service, slot);
    }
    builder.add_characteristic(
        service,
        Uuid::from_short(UUID_HID_CONTROL_POINT),
        &[Flag::WriteWithoutResponse],
        CharacteristicKind::ControlPoint,
        Vec::new(),
    );
    service
}

pub fn add_device_info_service(builder: &mut ApplicationBuilder, info: &DeviceInfo) -> ServiceId {
    let service = builder.add_service(Uuid::from_short(UUID_DIS_SERVICE), true);
    for (uuid, value) in [
        (UUID_PNP_ID, info.pnp.to_bytes().to_vec()),
        (UUID_MFG_NAME, info.manufacturer.as_bytes().to_vec()),
        (UUID_MODEL_NUM, info.model.as_bytes().to_vec()),
    ] {
        builder.add_characteristic(
            service,
            Uuid::from_short(uuid),
            &[Flag::Read],
            CharacteristicKind::Generic,
            value,
        );
    }
    service
}

pub fn add_battery_service(builder: &mut ApplicationBuilder, level: u8) -> ServiceId {
    let service = builder.add_service(Uuid::from_short(UUID_BAS_SERVICE), true);
    let chrc = builder.add_characteristic(
        service,
        Uuid::from_short(UUID_BATTERY_LEVEL),
        &[Flag::Read, Flag::Notify],
        CharacteristicKind::BatteryLevel,
        vec![level.min(100)],
    );
    builder.add_cccd(chrc);
    service
}

pub fn build_application(options: &HidOptions) -> Application {
    let mut builder = ApplicationBuilder::new(APP_PATH);
    add_hid_service(
        &mut builder,
        report_map(options.profile, options.mouse_layout),
        report_slots(options.profile, options.mouse_layout),
    );
    add_device_info_service(&mut builder, &options.device_info);
    if let Some(level) = options.battery {
        add_battery_service(&mut builder, level);
    }
    builder.build()
}

impl Application {
    pub fn battery_characteristic(&self) -> Option<CharacteristicId> {
        self.characteristic_ids().find(|&id| {
            self.characteristic(id)
                .is_some_and(|c| *c.kind() == CharacteristicKind::BatteryLevel)
        })
    }

    /// Update the battery level (clamped to 100). Unchanged levels are not
    /// re-sent; changed ones always update the value and notify when
    /// subscribed.
    pub fn set_battery_level(&mut self, level: u8) -> GattResult<Delivery> {
        let id = self
            .battery_characteristic()
            .ok_or_else(|| GattError::UnknownObject("battery level".to_owned()))?;
        let level = level.min(100);
        if self.characteristic(id).map(|c| c.value()) == Some(&[level][..]) {
            return Ok(Delivery::Dropped);
        }
        tracing::info!(%level, "Battery set");
        Ok(if self.publish(id, vec![level])? {
            Delivery::Sent
        } else {
            Delivery::Dropped
        })
    }
}
