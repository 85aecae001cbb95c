use uuid::Uuid;

use crate::api::descriptor::{AttributePermission, Descriptor};

#[derive(Debug, Ord, Eq, PartialEq, PartialOrd, Clone)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: Vec<CharacteristicProperty>,
    pub permissions: Vec<AttributePermission>,
    /// Static cached value. On the peripheral side a characteristic carrying
    /// one must be read-only; on the central side this mirrors the latest
    /// value reported by the remote device.
    pub value: Option<Vec<u8>>,
    pub user_description: Option<String>,
    pub is_notifying: bool,
    pub descriptors: Vec<Descriptor>,
}

impl Default for Characteristic {
    fn default() -> Self {
        Characteristic {
            uuid: Uuid::nil(),
            properties: vec![
                CharacteristicProperty::Read,
                CharacteristicProperty::Write,
                CharacteristicProperty::Notify,
            ],
            permissions: vec![
                AttributePermission::Readable,
                AttributePermission::Writeable,
            ],
            value: None,
            user_description: None,
            is_notifying: false,
            descriptors: Vec::new(),
        }
    }
}

impl Characteristic {
    pub fn has_property(&self, property: CharacteristicProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn has_permission(&self, permission: AttributePermission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Debug, Clone, PartialOrd, Ord, Eq, PartialEq)]
pub enum CharacteristicProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    AuthenticatedSignedWrites,
    Notify,
    NotifyEncryptionRequired,
    Indicate,
    IndicateEncryptionRequired,
    ExtendedProperties,
}

#[derive(Debug, Clone, PartialOrd, Ord, Eq, PartialEq)]
pub enum CharacteristicWriteType {
    WriteWithoutResponse,
    WriteWithResponse,
}
