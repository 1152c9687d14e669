use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{GattError, GattResult};
use crate::gatt::{Application, CharacteristicId, CharacteristicKind};

/// Relative motion range of the compact (8-bit) mouse report.
pub const MOTION_LIMIT: i32 = 127;
/// X/Y range declared by the wide (16-bit) mouse report.
pub const WIDE_MOTION_LIMIT: i32 = 2047;

pub const KEYBOARD_REPORT_LEN: usize = 8;
pub const MAX_KEYCODES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MouseLayout {
    /// buttons(3 bits + pad), dx, dy, wheel: 4 bytes
    #[default]
    Compact,
    /// buttons(5 bits + pad), dx LE16, dy LE16, wheel: 6 bytes
    Wide,
}

impl MouseLayout {
    pub fn len(self) -> usize {
        match self {
            MouseLayout::Compact => 4,
            MouseLayout::Wide => 6,
        }
    }

    fn button_mask(self) -> u8 {
        match self {
            MouseLayout::Compact => 0x07,
            MouseLayout::Wide => 0x1F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Keyboard,
    Mouse(MouseLayout),
}

impl ReportFormat {
    pub fn len(self) -> usize {
        match self {
            ReportFormat::Keyboard => KEYBOARD_REPORT_LEN,
            ReportFormat::Mouse(layout) => layout.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEntry {
    pub id: u8,
    pub format: ReportFormat,
}

/// Report ids served by one Report characteristic.
///
/// A dedicated slot carries a single id, tagged by a Report Reference
/// descriptor, and its values are the bare report. A shared slot carries
/// several ids and prefixes every value with the id it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSlot {
    entries: Vec<ReportEntry>,
    shared: bool,
}

impl ReportSlot {
    pub fn dedicated(id: u8, format: ReportFormat) -> Self {
        Self {
            entries: vec![ReportEntry { id, format }],
            shared: false,
        }
    }

    pub fn shared(entries: Vec<ReportEntry>) -> Self {
        Self {
            entries,
            shared: true,
        }
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn entry(&self, id: u8) -> Option<ReportEntry> {
        self.entries.iter().copied().find(|e| e.id == id)
    }

    /// All-zero report for the first id, used as the value before any input.
    pub fn idle_value(&self) -> Vec<u8> {
        match self.entries.first() {
            Some(e) if self.shared => {
                let mut v = vec![0u8; e.format.len() + 1];
                v[0] = e.id;
                v
            }
            Some(e) => vec![0u8; e.format.len()],
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseReport {
    pub buttons: u8,
    pub dx: i32,
    pub dy: i32,
    pub wheel: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub keycodes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputReport {
    Mouse(MouseReport),
    Keyboard(KeyboardReport),
}

impl InputReport {
    fn matches(&self, format: ReportFormat) -> bool {
        matches!(
            (self, format),
            (InputReport::Mouse(_), ReportFormat::Mouse(_))
                | (InputReport::Keyboard(_), ReportFormat::Keyboard)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Target not subscribed; the event is discarded, not queued.
    Dropped,
}

pub fn clamp_motion(v: i32, limit: i32) -> i32 {
    v.clamp(-limit, limit)
}

pub fn encode_mouse(report: &MouseReport, layout: MouseLayout) -> Vec<u8> {
    let buttons = report.buttons & layout.button_mask();
    let wheel = clamp_motion(report.wheel, MOTION_LIMIT) as i8 as u8;
    match layout {
        MouseLayout::Compact => vec![
            buttons,
            clamp_motion(report.dx, MOTION_LIMIT) as i8 as u8,
            clamp_motion(report.dy, MOTION_LIMIT) as i8 as u8,
            wheel,
        ],
        MouseLayout::Wide => {
            let dx = (clamp_motion(report.dx, WIDE_MOTION_LIMIT) as i16).to_le_bytes();
            let dy = (clamp_motion(report.dy, WIDE_MOTION_LIMIT) as i16).to_le_bytes();
            vec![buttons, dx[0], dx[1], dy[0], dy[1], wheel]
        }
    }
}

/// Modifier byte, reserved byte, then six keycodes; short arrays are
/// zero-padded and long ones truncated.
pub fn encode_keyboard(report: &KeyboardReport) -> [u8; KEYBOARD_REPORT_LEN] {
    let mut out = [0u8; KEYBOARD_REPORT_LEN];
    out[0] = report.modifiers;
    out[1] = 0x00; // reserved
    for (i, &k) in report.keycodes.iter().take(MAX_KEYCODES).enumerate() {
        out[2 + i] = k;
    }
    out
}

impl Application {
    /// The Report characteristic that serves `report_id`.
    pub fn report_characteristic(&self, report_id: u8) -> Option<CharacteristicId> {
        self.characteristic_ids().find(|&id| {
            matches!(
                self.characteristic(id).map(|c| c.kind()),
                Some(CharacteristicKind::Report(slot)) if slot.entry(report_id).is_some()
            )
        })
    }

    /// First report id whose layout fits `report`.
    pub fn default_report_id(&self, report: &InputReport) -> Option<u8> {
        self.characteristic_ids()
            .filter_map(|id| match self.characteristic(id).map(|c| c.kind()) {
                Some(CharacteristicKind::Report(slot)) => Some(slot.entries().to_vec()),
                _ => None,
            })
            .flatten()
            .find(|e| report.matches(e.format))
            .map(|e| e.id)
    }

    /// Encode `report` for `report_id` and push it to the subscribed client.
    ///
    /// An unsubscribed target leaves the characteristic untouched and
    /// returns [`Delivery::Dropped`].
    pub fn send_report(&mut self, report_id: u8, report: &InputReport) -> GattResult<Delivery> {
        let id = self
            .report_characteristic(report_id)
            .ok_or(GattError::UnknownReport(report_id))?;
        let Some(CharacteristicKind::Report(slot)) = self.characteristic(id).map(|c| c.kind())
        else {
            return Err(GattError::UnknownReport(report_id));
        };
        let shared = slot.is_shared();
        let entry = slot.entry(report_id).ok_or(GattError::UnknownReport(report_id))?;
        let body = match (report, entry.format) {
            (InputReport::Mouse(m), ReportFormat::Mouse(layout)) => encode_mouse(m, layout),
            (InputReport::Keyboard(k), ReportFormat::Keyboard) => encode_keyboard(k).to_vec(),
            _ => {
                return Err(GattError::InvalidArgs(format!(
                    "report {report_id} expects a {:?} report",
                    entry.format
                )));
            }
        };

        if !self.characteristic(id).is_some_and(|c| c.notifying()) {
            tracing::trace!(report_id, "Not subscribed, dropping report");
            return Ok(Delivery::Dropped);
        }

        let value = if shared {
            let mut v = Vec::with_capacity(body.len() + 1);
            v.push(report_id);
            v.extend_from_slice(&body);
            v
        } else {
            body
        };

        tracing::trace!(report_id, ?value, "TX report");
        self.publish(id, value)?;
        Ok(Delivery::Sent)
    }

    pub fn send_mouse(
        &mut self,
        report_id: u8,
        buttons: u8,
        dx: i32,
        dy: i32,
        wheel: i32,
    ) -> GattResult<Delivery> {
        self.send_report(
            report_id,
            &InputReport::Mouse(MouseReport {
                buttons,
                dx,
                dy,
                wheel,
            }),
        )
    }

    pub fn send_keyboard(
        &mut self,
        report_id: u8,
        modifiers: u8,
        keycodes: &[u8],
    ) -> GattResult<Delivery> {
        self.send_report(
            report_id,
            &InputReport::Keyboard(KeyboardReport {
                modifiers,
                keycodes: keycodes.to_vec(),
            }),
        )
    }
}

/// Folds key-down / key-up usages into a modifier mask and up to six
/// pressed keys, evicting the oldest key on overflow.
#[derive(Debug, Default)]
pub struct KeyboardState {
    modifiers: u8,
    pressed: Vec<u8>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, usage: u8) -> KeyboardReport {
        if let Some(m) = crate::hid::keyboard_usage_to_modifier(usage) {
            self.modifiers |= m;
        } else if !self.pressed.contains(&usage) {
            self.pressed.push(usage);
            if self.pressed.len() > MAX_KEYCODES {
                self.pressed.remove(0);
            }
        }
        self.report()
    }

    pub fn key_up(&mut self, usage: u8) -> KeyboardReport {
        if let Some(m) = crate::hid::keyboard_usage_to_modifier(usage) {
            self.modifiers &= !m;
        } else {
            self.pressed.retain(|&k| k != usage);
        }
        self.report()
    }

    pub fn release_all(&mut self) -> KeyboardReport {
        self.modifiers = 0;
        self.pressed.clear();
        self.report()
    }

    pub fn report(&self) -> KeyboardReport {
        KeyboardReport {
            modifiers: self.modifiers,
            keycodes: self.pressed.clone(),
        }
    }
}
