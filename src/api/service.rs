use uuid::Uuid;

use crate::api::characteristic::Characteristic;

/// A GATT service: the local definition published by the peripheral role, and
/// the discovered snapshot mirrored by the central role.
///
/// Included services are held as UUID references; on the peripheral side each
/// must name an already-published service, which is enforced at publish time.
#[derive(Debug, Ord, Eq, PartialEq, PartialOrd, Clone)]
pub struct Service {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<Characteristic>,
    pub included_services: Vec<Uuid>,
}

impl Default for Service {
    fn default() -> Self {
        Service {
            uuid: Uuid::nil(),
            primary: true,
            characteristics: Vec::new(),
            included_services: Vec::new(),
        }
    }
}

impl Service {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}
