use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::api::central::{CharacteristicRef, DescriptorRef, DeviceId, ScanFilter, ServiceRef};
use crate::api::characteristic::Characteristic;
use crate::api::descriptor::Descriptor;
use crate::api::service::Service;
use crate::central::device::RemoteDevice;

/// Asynchronous notifications from the central-role radio stack.
///
/// Discovery, notification and write-completion events carry an optional
/// failure; the manager maps a reported failure onto the matching error kind
/// and skips the associated state mutation.
#[derive(Debug, Clone)]
pub enum CentralEvent {
    StateChanged {
        state: CentralState,
    },
    /// System-delivered restoration of a prior radio session.
    RestoreState {
        devices: Vec<RemoteDevice>,
        filter: ScanFilter,
    },
    DeviceDiscovered {
        device: DeviceId,
        name: Option<String>,
        advertisement: Advertisement,
        rssi: i16,
    },
    Connected {
        device: DeviceId,
    },
    FailedToConnect {
        device: DeviceId,
        error: Option<RadioError>,
    },
    Disconnected {
        device: DeviceId,
        is_reconnecting: bool,
        error: Option<RadioError>,
    },
    ServicesModified {
        device: DeviceId,
        invalidated: Vec<Uuid>,
    },
    ServicesDiscovered {
        device: DeviceId,
        services: Vec<Service>,
        error: Option<RadioError>,
    },
    IncludedServicesDiscovered {
        service: ServiceRef,
        included: Vec<Uuid>,
        error: Option<RadioError>,
    },
    CharacteristicsDiscovered {
        service: ServiceRef,
        characteristics: Vec<Characteristic>,
        error: Option<RadioError>,
    },
    DescriptorsDiscovered {
        characteristic: CharacteristicRef,
        descriptors: Vec<Descriptor>,
        error: Option<RadioError>,
    },
    NotificationStateChanged {
        characteristic: CharacteristicRef,
        is_notifying: bool,
        error: Option<RadioError>,
    },
    CharacteristicValueUpdated {
        characteristic: CharacteristicRef,
        value: Option<Vec<u8>>,
        error: Option<RadioError>,
    },
    DescriptorValueUpdated {
        descriptor: DescriptorRef,
        value: Option<Vec<u8>>,
        error: Option<RadioError>,
    },
    WriteCompleted {
        characteristic: CharacteristicRef,
        error: Option<RadioError>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CentralState {
    Unknown = 0,
    PoweredOn = 1,
    PoweredOff = 2,
}

/// Failure reported by the radio stack alongside an event. Opaque here; the
/// manager maps it onto a typed [`Error`](crate::Error) kind per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioError(pub String);

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a device's advertisement, refreshed on every discovery event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: Option<String>,
    pub services: Vec<Uuid>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub tx_power: Option<i8>,
}
