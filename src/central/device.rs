use uuid::Uuid;

use crate::api::central::{CharacteristicRef, DeviceId};
use crate::api::central_event::Advertisement;
use crate::api::characteristic::Characteristic;
use crate::api::descriptor::Descriptor;
use crate::api::service::Service;

/// Last connection state reported by the radio stack for a device.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A remote device as tracked by the central role manager.
///
/// Entries are created on first discovery (or state restoration) and updated
/// in place on every later event carrying the same identity; they are only
/// removed when scanning restarts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    pub state: ConnectionState,
    pub services: Vec<Service>,
    pub advertisement: Advertisement,
    pub rssi: Option<i16>,
}

impl RemoteDevice {
    pub fn new(id: DeviceId) -> Self {
        RemoteDevice {
            id,
            name: None,
            state: ConnectionState::Disconnected,
            services: Vec::new(),
            advertisement: Advertisement::default(),
            rssi: None,
        }
    }

    pub fn service(&self, uuid: Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid == uuid)
    }

    pub(crate) fn service_mut(&mut self, uuid: Uuid) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.uuid == uuid)
    }

    pub fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Option<&Characteristic> {
        self.service(service)?
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
    }

    pub(crate) fn characteristic_mut(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Option<&mut Characteristic> {
        self.service_mut(service)?
            .characteristics
            .iter_mut()
            .find(|c| c.uuid == characteristic)
    }

    pub(crate) fn descriptor_mut(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Option<&mut Descriptor> {
        self.characteristic_mut(service, characteristic)?
            .descriptors
            .iter_mut()
            .find(|d| d.uuid == descriptor)
    }

    /// Every characteristic of every known service, as stable path refs.
    pub fn characteristic_refs(&self) -> Vec<CharacteristicRef> {
        self.services
            .iter()
            .flat_map(|service| {
                service.characteristics.iter().map(|characteristic| CharacteristicRef {
                    device: self.id,
                    service: service.uuid,
                    characteristic: characteristic.uuid,
                })
            })
            .collect()
    }
}
