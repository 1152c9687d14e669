// Common constants for HID over GATT profile and device identity

pub const UUID_HID_SERVICE: u16 = 0x1812;
pub const UUID_BAS_SERVICE: u16 = 0x180F;
pub const UUID_DIS_SERVICE: u16 = 0x180A;

pub const UUID_HID_INFO: u16 = 0x2A4A;
pub const UUID_HID_CONTROL_POINT: u16 = 0x2A4C;
pub const UUID_HID_PROTOCOL_MODE: u16 = 0x2A4E;
pub const UUID_HID_REPORT_MAP: u16 = 0x2A4B;
pub const UUID_HID_REPORT: u16 = 0x2A4D;

pub const UUID_BATTERY_LEVEL: u16 = 0x2A19;
pub const UUID_MFG_NAME: u16 = 0x2A29;
pub const UUID_MODEL_NUM: u16 = 0x2A24;
pub const UUID_PNP_ID: u16 = 0x2A50;

pub const UUID_CCCD: u16 = 0x2902;
pub const UUID_REPORT_REF_DESC: u16 = 0x2908; // [report_id, report_type]

pub const APPEARANCE_GENERIC_HID: u16 = 0x03C0;
pub const APPEARANCE_KEYBOARD: u16 = 0x03C1;
pub const APPEARANCE_MOUSE: u16 = 0x03C2;

// Report IDs
pub const RID_KEYBD: u8 = 0x01;
pub const RID_MOUSE: u8 = 0x02;

// Report Reference report type
pub const REPORT_TYPE_INPUT: u8 = 0x01;

// Protocol Mode values
pub const PROTOCOL_MODE_BOOT: u8 = 0x00;
pub const PROTOCOL_MODE_REPORT: u8 = 0x01;

// HID Control Point commands
pub const CONTROL_POINT_SUSPEND: u8 = 0x00;
pub const CONTROL_POINT_EXIT_SUSPEND: u8 = 0x01;

// CCCD bits
pub const CCCD_NOTIFY: u16 = 0x0001;
pub const CCCD_INDICATE: u16 = 0x0002;

// BlueZ object model
pub const APP_PATH: &str = "/org/bluez/blehub";
pub const ADVERTISEMENT_PATH: &str = "/org/bluez/blehub/advertisement0";

pub const IFACE_GATT_SERVICE: &str = "org.bluez.GattService1";
pub const IFACE_GATT_CHRC: &str = "org.bluez.GattCharacteristic1";
pub const IFACE_GATT_DESC: &str = "org.bluez.GattDescriptor1";
pub const IFACE_LE_ADVERTISEMENT: &str = "org.bluez.LEAdvertisement1";
