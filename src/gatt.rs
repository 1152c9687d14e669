//! GATT object tree: Application -> Service -> Characteristic -> Descriptor.
//!
//! Objects live in flat arenas owned by the [`Application`] and are addressed
//! by stable ids. Parents own their children through id lists; children point
//! back at their parent by id only. The tree is assembled with an
//! [`ApplicationBuilder`] and is structurally frozen once built: only values,
//! subscription state and the notification outbox change afterwards.

use std::collections::{BTreeMap, VecDeque, vec_deque};

use ble_peripheral_rust::uuid::ShortUuid;
use uuid::Uuid;

use crate::consts::*;
use crate::error::{GattError, GattResult};
use crate::report::ReportSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(usize);

/// Capability flags, named as BlueZ spells them in the `Flags` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Read,
    Write,
    WriteWithoutResponse,
    Notify,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::Read => "read",
            Flag::Write => "write",
            Flag::WriteWithoutResponse => "write-without-response",
            Flag::Notify => "notify",
        }
    }
}

/// BlueZ `type` write option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteType {
    /// Write without response; there is no channel to report a rejection on.
    Command,
    #[default]
    Request,
    /// Part of a prepared (queued) write; validated like a request.
    Reliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    pub offset: usize,
    pub write_type: WriteType,
}

impl WriteOptions {
    pub fn request() -> Self {
        Self::default()
    }

    pub fn command() -> Self {
        Self {
            offset: 0,
            write_type: WriteType::Command,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Unsubscribed,
    Subscribed,
}

/// Per-kind read/write behaviour, dispatched once at the tree boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum CharacteristicKind {
    /// Plain value store: reads return it, writes replace it.
    Generic,
    /// HID Protocol Mode: one byte, Boot (0) or Report (1).
    ProtocolMode,
    /// HID Control Point: one-byte Suspend / Exit Suspend commands.
    ControlPoint,
    /// Input Report carrying one or more report ids.
    Report(ReportSlot),
    BatteryLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Generic,
    /// Client Characteristic Configuration: notify (bit 0) / indicate (bit 1).
    Cccd,
    ReportReference,
}

/// A property value as exposed through discovery.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Bool(bool),
    U16(u16),
    Path(String),
    Paths(Vec<String>),
    Strs(Vec<String>),
    Bytes(Vec<u8>),
}

pub type Properties = BTreeMap<&'static str, PropertyValue>;
pub type Interfaces = BTreeMap<&'static str, Properties>;
pub type ManagedObjects = BTreeMap<String, Interfaces>;

/// An updated value queued for delivery to the subscribed client.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub characteristic: CharacteristicId,
    pub service_uuid: Uuid,
    pub uuid: Uuid,
    pub path: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ServiceNode {
    path: String,
    uuid: Uuid,
    primary: bool,
    characteristics: Vec<CharacteristicId>,
}

impl ServiceNode {
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
    pub fn primary(&self) -> bool {
        self.primary
    }
    pub fn characteristics(&self) -> &[CharacteristicId] {
        &self.characteristics
    }
}

#[derive(Debug, Clone)]
pub struct CharacteristicNode {
    path: String,
    uuid: Uuid,
    flags: Vec<Flag>,
    kind: CharacteristicKind,
    value: Vec<u8>,
    notifying: bool,
    service: ServiceId,
    descriptors: Vec<DescriptorId>,
}

impl CharacteristicNode {
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }
    pub fn has(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }
    pub fn kind(&self) -> &CharacteristicKind {
        &self.kind
    }
    pub fn value(&self) -> &[u8] {
        &self.value
    }
    pub fn notifying(&self) -> bool {
        self.notifying
    }
    pub fn service(&self) -> ServiceId {
        self.service
    }
    pub fn descriptors(&self) -> &[DescriptorId] {
        &self.descriptors
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorNode {
    path: String,
    uuid: Uuid,
    flags: Vec<Flag>,
    kind: DescriptorKind,
    value: Vec<u8>,
    characteristic: CharacteristicId,
}

impl DescriptorNode {
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }
    pub fn has(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }
    pub fn value(&self) -> &[u8] {
        &self.value
    }
    pub fn characteristic(&self) -> CharacteristicId {
        self.characteristic
    }
}

pub struct ApplicationBuilder {
    path: String,
    services: Vec<ServiceNode>,
    characteristics: Vec<CharacteristicNode>,
    descriptors: Vec<DescriptorNode>,
}

impl ApplicationBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            services: Vec::new(),
            characteristics: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn add_service(&mut self, uuid: Uuid, primary: bool) -> ServiceId {
        let id = ServiceId(self.services.len());
        self.services.push(ServiceNode {
            path: format!("{}/service{}", self.path, id.0),
            uuid,
            primary,
            characteristics: Vec::new(),
        });
        id
    }

    pub fn add_characteristic(
        &mut self,
        service: ServiceId,
        uuid: Uuid,
        flags: &[Flag],
        kind: CharacteristicKind,
        value: Vec<u8>,
    ) -> CharacteristicId {
        let id = CharacteristicId(self.characteristics.len());
        let parent = &mut self.services[service.0];
        let path = format!("{}/char{}", parent.path, parent.characteristics.len());
        parent.characteristics.push(id);
        self.characteristics.push(CharacteristicNode {
            path,
            uuid,
            flags: flags.to_vec(),
            kind,
            value,
            notifying: false,
            service,
            descriptors: Vec::new(),
        });
        id
    }

    pub fn add_descriptor(
        &mut self,
        characteristic: CharacteristicId,
        uuid: Uuid,
        flags: &[Flag],
        kind: DescriptorKind,
        value: Vec<u8>,
    ) -> DescriptorId {
        let id = DescriptorId(self.descriptors.len());
        let parent = &mut self.characteristics[characteristic.0];
        let path = format!("{}/desc{}", parent.path, parent.descriptors.len());
        parent.descriptors.push(id);
        self.descriptors.push(DescriptorNode {
            path,
            uuid,
            flags: flags.to_vec(),
            kind,
            value,
            characteristic,
        });
        id
    }

    /// Attach a CCCD (initially `0x0000`) to a notify-capable characteristic.
    pub fn add_cccd(&mut self, characteristic: CharacteristicId) -> DescriptorId {
        self.add_descriptor(
            characteristic,
            Uuid::from_short(UUID_CCCD),
            &[Flag::Read, Flag::Write],
            DescriptorKind::Cccd,
            vec![0x00, 0x00],
        )
    }

    pub fn build(self) -> Application {
        Application {
            path: self.path,
            services: self.services,
            characteristics: self.characteristics,
            descriptors: self.descriptors,
            outbox: VecDeque::new(),
            suspended: false,
        }
    }
}

pub struct Application {
    path: String,
    services: Vec<ServiceNode>,
    characteristics: Vec<CharacteristicNode>,
    descriptors: Vec<DescriptorNode>,
    outbox: VecDeque<Notification>,
    suspended: bool,
}

impl Application {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn service_ids(&self) -> impl Iterator<Item = ServiceId> + '_ {
        (0..self.services.len()).map(ServiceId)
    }

    pub fn characteristic_ids(&self) -> impl Iterator<Item = CharacteristicId> + '_ {
        (0..self.characteristics.len()).map(CharacteristicId)
    }

    pub fn service(&self, id: ServiceId) -> Option<&ServiceNode> {
        self.services.get(id.0)
    }

    pub fn characteristic(&self, id: CharacteristicId) -> Option<&CharacteristicNode> {
        self.characteristics.get(id.0)
    }

    pub fn descriptor(&self, id: DescriptorId) -> Option<&DescriptorNode> {
        self.descriptors.get(id.0)
    }

    pub fn object_count(&self) -> usize {
        1 + self.services.len() + self.characteristics.len() + self.descriptors.len()
    }

    pub fn find_characteristic(&self, service_uuid: Uuid, uuid: Uuid) -> Option<CharacteristicId> {
        self.characteristics
            .iter()
            .position(|c| c.uuid == uuid && self.services[c.service.0].uuid == service_uuid)
            .map(CharacteristicId)
    }

    pub fn characteristic_by_path(&self, path: &str) -> Option<CharacteristicId> {
        self.characteristics
            .iter()
            .position(|c| c.path == path)
            .map(CharacteristicId)
    }

    pub fn descriptor_by_path(&self, path: &str) -> Option<DescriptorId> {
        self.descriptors
            .iter()
            .position(|d| d.path == path)
            .map(DescriptorId)
    }

    /// The CCCD attached to `characteristic`, if any.
    pub fn cccd(&self, characteristic: CharacteristicId) -> Option<DescriptorId> {
        self.characteristic(characteristic)?
            .descriptors
            .iter()
            .copied()
            .find(|d| self.descriptors[d.0].kind == DescriptorKind::Cccd)
    }

    pub fn subscription(&self, id: CharacteristicId) -> Subscription {
        match self.characteristic(id) {
            Some(c) if c.notifying => Subscription::Subscribed,
            _ => Subscription::Unsubscribed,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Current Protocol Mode byte, if the tree has a Protocol Mode characteristic.
    pub fn protocol_mode(&self) -> Option<u8> {
        self.characteristics
            .iter()
            .find(|c| c.kind == CharacteristicKind::ProtocolMode)
            .and_then(|c| c.value.first().copied())
    }

    fn chrc(&self, id: CharacteristicId) -> GattResult<&CharacteristicNode> {
        self.characteristics
            .get(id.0)
            .ok_or_else(|| GattError::UnknownObject(format!("characteristic {}", id.0)))
    }

    fn desc(&self, id: DescriptorId) -> GattResult<&DescriptorNode> {
        self.descriptors
            .get(id.0)
            .ok_or_else(|| GattError::UnknownObject(format!("descriptor {}", id.0)))
    }

    pub fn read_characteristic(&self, id: CharacteristicId) -> GattResult<Vec<u8>> {
        self.read_characteristic_at(id, 0)
    }

    /// ReadValue with a BlueZ `offset` option, used for long reads.
    pub fn read_characteristic_at(&self, id: CharacteristicId, offset: usize) -> GattResult<Vec<u8>> {
        let chrc = self.chrc(id)?;
        if !chrc.has(Flag::Read) {
            return Err(GattError::NotSupported("read"));
        }
        slice_from(&chrc.value, offset)
    }

    pub fn write_characteristic(
        &mut self,
        id: CharacteristicId,
        value: &[u8],
        options: WriteOptions,
    ) -> GattResult<()> {
        let chrc = self.chrc(id)?;
        if !chrc.has(Flag::Write) && !chrc.has(Flag::WriteWithoutResponse) {
            return Err(GattError::NotSupported("write"));
        }

        if let Err(e) = validate_write(chrc, value, options) {
            if options.write_type == WriteType::Command {
                tracing::warn!(path = %chrc.path, error = %e, ?value, "Dropping malformed write command");
                return Ok(());
            }
            return Err(e);
        }

        let chrc = &mut self.characteristics[id.0];
        match chrc.kind {
            CharacteristicKind::ProtocolMode => {
                let mode = value[0];
                if chrc.value.first() != Some(&mode) {
                    tracing::info!(mode, "Protocol mode changed");
                }
                chrc.value = vec![mode];
            }
            CharacteristicKind::ControlPoint => {
                let command = value[0];
                match command {
                    CONTROL_POINT_SUSPEND => {
                        tracing::info!("Host suspended");
                        self.suspended = true;
                    }
                    CONTROL_POINT_EXIT_SUSPEND => {
                        tracing::info!("Host exited suspend");
                        self.suspended = false;
                    }
                    other => {
                        tracing::warn!(command = other, "Unknown HID control point command");
                    }
                }
                chrc.value = vec![command];
            }
            _ => splice(&mut chrc.value, value, options.offset),
        }
        Ok(())
    }

    /// Idempotent; starting an already-notifying characteristic only warns.
    pub fn start_notify(&mut self, id: CharacteristicId) -> GattResult<()> {
        let chrc = self.chrc(id)?;
        if !chrc.has(Flag::Notify) {
            return Err(GattError::NotSupported("notify"));
        }
        let chrc = &mut self.characteristics[id.0];
        if chrc.notifying {
            tracing::warn!(path = %chrc.path, "Already notifying");
            return Ok(());
        }
        chrc.notifying = true;
        tracing::info!(path = %chrc.path, uuid = %chrc.uuid, "Notifications started");
        Ok(())
    }

    /// Stops notifications and discards anything still queued for this
    /// characteristic, so nothing queued before the stop is delivered.
    pub fn stop_notify(&mut self, id: CharacteristicId) -> GattResult<()> {
        let chrc = self.chrc(id)?;
        if !chrc.has(Flag::Notify) {
            return Err(GattError::NotSupported("notify"));
        }
        let chrc = &mut self.characteristics[id.0];
        if !chrc.notifying {
            tracing::warn!(path = %chrc.path, "Not notifying");
            return Ok(());
        }
        chrc.notifying = false;
        tracing::info!(path = %chrc.path, uuid = %chrc.uuid, "Notifications stopped");
        self.outbox.retain(|n| n.characteristic != id);
        Ok(())
    }

    pub fn read_descriptor(&self, id: DescriptorId) -> GattResult<Vec<u8>> {
        self.read_descriptor_at(id, 0)
    }

    pub fn read_descriptor_at(&self, id: DescriptorId, offset: usize) -> GattResult<Vec<u8>> {
        let desc = self.desc(id)?;
        if !desc.has(Flag::Read) {
            return Err(GattError::NotSupported("read"));
        }
        slice_from(&desc.value, offset)
    }

    pub fn write_descriptor(
        &mut self,
        id: DescriptorId,
        value: &[u8],
        options: WriteOptions,
    ) -> GattResult<()> {
        let desc = self.desc(id)?;
        if !desc.has(Flag::Write) {
            return Err(GattError::NotSupported("write"));
        }

        if desc.kind != DescriptorKind::Cccd {
            if options.offset > desc.value.len() {
                return Err(GattError::InvalidOffset {
                    offset: options.offset,
                    len: desc.value.len(),
                });
            }
            splice(&mut self.descriptors[id.0].value, value, options.offset);
            return Ok(());
        }

        if options.offset != 0 {
            return Err(GattError::InvalidOffset {
                offset: options.offset,
                len: desc.value.len(),
            });
        }
        if value.len() != 2 {
            return Err(GattError::InvalidValueLength {
                expected: 2,
                actual: value.len(),
            });
        }

        let bits = u16::from_le_bytes([value[0], value[1]]);
        let characteristic = desc.characteristic;
        let chrc = self.chrc(characteristic)?;
        let enable = bits & CCCD_NOTIFY != 0;
        if enable && !chrc.has(Flag::Notify) {
            return Err(GattError::NotSupported("notify"));
        }
        if bits & CCCD_INDICATE != 0 {
            tracing::debug!(path = %chrc.path, "Indications requested, ignoring");
        }
        let notifying = chrc.notifying;

        self.descriptors[id.0].value = value.to_vec();
        match (enable, notifying) {
            (true, false) => self.start_notify(characteristic),
            (false, true) => self.stop_notify(characteristic),
            _ => Ok(()),
        }
    }

    /// Replace a characteristic's value and queue a notification when it is
    /// subscribed. Returns whether a notification was queued.
    pub(crate) fn publish(&mut self, id: CharacteristicId, value: Vec<u8>) -> GattResult<bool> {
        let service_uuid = self.services[self.chrc(id)?.service.0].uuid;
        let chrc = &mut self.characteristics[id.0];
        chrc.value = value;
        if !chrc.notifying {
            return Ok(false);
        }
        self.outbox.push_back(Notification {
            characteristic: id,
            service_uuid,
            uuid: chrc.uuid,
            path: chrc.path.clone(),
            value: chrc.value.clone(),
        });
        Ok(true)
    }

    pub fn pending_notifications(&self) -> usize {
        self.outbox.len()
    }

    /// Hand queued notifications to the transport, oldest first.
    pub fn drain_notifications(&mut self) -> vec_deque::Drain<'_, Notification> {
        self.outbox.drain(..)
    }

    /// ObjectManager-style enumeration of every object in the tree with its
    /// interface properties, reading current values at call time.
    pub fn managed_objects(&self) -> ManagedObjects {
        let mut objects = ManagedObjects::new();
        objects.insert(self.path.clone(), Interfaces::new());

        for service in &self.services {
            let mut props = Properties::new();
            props.insert("UUID", PropertyValue::Str(service.uuid.to_string()));
            props.insert("Primary", PropertyValue::Bool(service.primary));
            props.insert(
                "Characteristics",
                PropertyValue::Paths(
                    service
                        .characteristics
                        .iter()
                        .map(|c| self.characteristics[c.0].path.clone())
                        .collect(),
                ),
            );
            objects.insert(service.path.clone(), Interfaces::from([(IFACE_GATT_SERVICE, props)]));
        }

        for chrc in &self.characteristics {
            let mut props = Properties::new();
            props.insert("Service", PropertyValue::Path(self.services[chrc.service.0].path.clone()));
            props.insert("UUID", PropertyValue::Str(chrc.uuid.to_string()));
            props.insert("Flags", flag_strings(&chrc.flags));
            props.insert(
                "Descriptors",
                PropertyValue::Paths(
                    chrc.descriptors
                        .iter()
                        .map(|d| self.descriptors[d.0].path.clone())
                        .collect(),
                ),
            );
            if chrc.has(Flag::Read) {
                props.insert("Value", PropertyValue::Bytes(chrc.value.clone()));
            }
            if chrc.has(Flag::Notify) {
                props.insert("Notifying", PropertyValue::Bool(chrc.notifying));
            }
            objects.insert(chrc.path.clone(), Interfaces::from([(IFACE_GATT_CHRC, props)]));
        }

        for desc in &self.descriptors {
            let mut props = Properties::new();
            props.insert(
                "Characteristic",
                PropertyValue::Path(self.characteristics[desc.characteristic.0].path.clone()),
            );
            props.insert("UUID", PropertyValue::Str(desc.uuid.to_string()));
            props.insert("Flags", flag_strings(&desc.flags));
            if desc.has(Flag::Read) {
                props.insert("Value", PropertyValue::Bytes(desc.value.clone()));
            }
            objects.insert(desc.path.clone(), Interfaces::from([(IFACE_GATT_DESC, props)]));
        }

        objects
    }
}

fn flag_strings(flags: &[Flag]) -> PropertyValue {
    PropertyValue::Strs(flags.iter().map(|f| f.as_str().to_owned()).collect())
}

fn slice_from(value: &[u8], offset: usize) -> GattResult<Vec<u8>> {
    if offset > value.len() {
        return Err(GattError::InvalidOffset {
            offset,
            len: value.len(),
        });
    }
    Ok(value[offset..].to_vec())
}

// Callers check `offset <= target.len()` first.
fn splice(target: &mut Vec<u8>, value: &[u8], offset: usize) {
    target.truncate(offset);
    target.extend_from_slice(value);
}

fn validate_write(chrc: &CharacteristicNode, value: &[u8], options: WriteOptions) -> GattResult<()> {
    match chrc.kind {
        CharacteristicKind::ProtocolMode | CharacteristicKind::ControlPoint => {
            if options.offset != 0 {
                return Err(GattError::InvalidOffset {
                    offset: options.offset,
                    len: chrc.value.len(),
                });
            }
            if value.len() != 1 {
                return Err(GattError::InvalidValueLength {
                    expected: 1,
                    actual: value.len(),
                });
            }
            if chrc.kind == CharacteristicKind::ProtocolMode
                && !matches!(value[0], PROTOCOL_MODE_BOOT | PROTOCOL_MODE_REPORT)
            {
                return Err(GattError::InvalidArgs(format!(
                    "protocol mode {:#04x}",
                    value[0]
                )));
            }
            Ok(())
        }
        _ if options.offset > chrc.value.len() => Err(GattError::InvalidOffset {
            offset: options.offset,
            len: chrc.value.len(),
        }),
        _ => Ok(()),
    }
}
