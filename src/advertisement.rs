use uuid::Uuid;

use crate::consts::{ADVERTISEMENT_PATH, IFACE_LE_ADVERTISEMENT};
use crate::gatt::{Interfaces, Properties, PropertyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementType {
    Peripheral,
}

impl AdvertisementType {
    pub fn as_str(self) -> &'static str {
        match self {
            AdvertisementType::Peripheral => "peripheral",
        }
    }
}

/// The advertising payload handed to the adapter's advertising manager.
/// Built once at startup and never changed afterwards.
#[derive(Debug, Clone)]
pub struct Advertisement {
    path: String,
    ad_type: AdvertisementType,
    service_uuids: Vec<Uuid>,
    appearance: u16,
    local_name: String,
    discoverable: bool,
    include_tx_power: bool,
}

impl Advertisement {
    pub fn peripheral(local_name: impl Into<String>, service_uuids: Vec<Uuid>, appearance: u16) -> Self {
        Self {
            path: ADVERTISEMENT_PATH.to_owned(),
            ad_type: AdvertisementType::Peripheral,
            service_uuids,
            appearance,
            local_name: local_name.into(),
            discoverable: true,
            include_tx_power: true,
        }
    }

    pub fn with_discoverable(mut self, discoverable: bool) -> Self {
        self.discoverable = discoverable;
        self
    }

    pub fn with_tx_power(mut self, include_tx_power: bool) -> Self {
        self.include_tx_power = include_tx_power;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn ad_type(&self) -> AdvertisementType {
        self.ad_type
    }
    pub fn service_uuids(&self) -> &[Uuid] {
        &self.service_uuids
    }
    pub fn appearance(&self) -> u16 {
        self.appearance
    }
    pub fn local_name(&self) -> &str {
        &self.local_name
    }
    pub fn discoverable(&self) -> bool {
        self.discoverable
    }
    pub fn include_tx_power(&self) -> bool {
        self.include_tx_power
    }

    /// `org.bluez.LEAdvertisement1` properties.
    pub fn properties(&self) -> Properties {
        Properties::from([
            ("Type", PropertyValue::Str(self.ad_type.as_str().to_owned())),
            (
                "ServiceUUIDs",
                PropertyValue::Strs(self.service_uuids.iter().map(Uuid::to_string).collect()),
            ),
            ("Appearance", PropertyValue::U16(self.appearance)),
            ("LocalName", PropertyValue::Str(self.local_name.clone())),
            ("Discoverable", PropertyValue::Bool(self.discoverable)),
            ("IncludeTxPower", PropertyValue::Bool(self.include_tx_power)),
        ])
    }

    pub fn interfaces(&self) -> Interfaces {
        Interfaces::from([(IFACE_LE_ADVERTISEMENT, self.properties())])
    }

    /// Host stack tore the advertisement down (adapter reset, power off).
    /// Informational; re-advertising is the caller's recovery path.
    pub fn release(&self) {
        tracing::info!(path = %self.path, name = %self.local_name, "Advertisement released");
    }
}
