use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::api::central_event::CentralState;
use crate::api::characteristic::CharacteristicWriteType;

/// Command surface of the underlying central-role radio stack.
///
/// Every command completes asynchronously: the stack acknowledges by emitting
/// the matching [`CentralEvent`](crate::api::central_event::CentralEvent) on
/// the event channel handed to the manager at spawn time. Implementations are
/// platform bindings (or test doubles); the manager never touches the radio
/// any other way.
#[async_trait]
pub trait CentralRadio: Send + Sync {
    async fn state(&self) -> Result<CentralState>;

    async fn scan(&self, filter: ScanFilter) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    async fn connect(&self, device: DeviceId, auto_reconnect: bool) -> Result<()>;

    async fn cancel_connection(&self, device: DeviceId) -> Result<()>;

    async fn discover_services(&self, device: DeviceId, uuids: Option<Vec<Uuid>>) -> Result<()>;

    async fn discover_included_services(
        &self,
        service: ServiceRef,
        uuids: Option<Vec<Uuid>>,
    ) -> Result<()>;

    async fn discover_characteristics(
        &self,
        service: ServiceRef,
        uuids: Option<Vec<Uuid>>,
    ) -> Result<()>;

    async fn discover_descriptors(&self, characteristic: CharacteristicRef) -> Result<()>;

    async fn set_notify(&self, characteristic: CharacteristicRef, enabled: bool) -> Result<()>;

    async fn read_value(&self, characteristic: CharacteristicRef) -> Result<()>;

    async fn read_descriptor(&self, descriptor: DescriptorRef) -> Result<()>;

    async fn write_value(
        &self,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
    ) -> Result<()>;
}

/// Scan parameters, replaced wholesale on every scan start and by state
/// restoration. `services: None` scans without a service allow-list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanFilter {
    pub services: Option<Vec<Uuid>>,
    pub allow_duplicates: bool,
    pub solicited_services: Vec<Uuid>,
}

/// Stable identity of a remote device, opaque to this crate.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeviceId(pub Uuid);

/// Path of a discovered service on a specific device.
///
/// Remote GATT objects may be recreated across discovery passes, so entities
/// are addressed by identity path rather than by instance.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ServiceRef {
    pub device: DeviceId,
    pub service: Uuid,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CharacteristicRef {
    pub device: DeviceId,
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicRef {
    pub fn service_ref(&self) -> ServiceRef {
        ServiceRef {
            device: self.device,
            service: self.service,
        }
    }

    pub fn descriptor(&self, descriptor: Uuid) -> DescriptorRef {
        DescriptorRef {
            device: self.device,
            service: self.service,
            characteristic: self.characteristic,
            descriptor,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DescriptorRef {
    pub device: DeviceId,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Uuid,
}

impl DescriptorRef {
    pub fn characteristic_ref(&self) -> CharacteristicRef {
        CharacteristicRef {
            device: self.device,
            service: self.service,
            characteristic: self.characteristic,
        }
    }
}
