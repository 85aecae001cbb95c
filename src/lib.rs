//! Dual-role BLE link management.
//!
//! Two role managers, each a single serialized owner of its state: a central
//! that scans, connects and mirrors remote GATT trees, and a peripheral that
//! publishes local services and answers ATT requests. Both drive an abstract
//! radio capability ([`api::central::CentralRadio`] /
//! [`api::peripheral::PeripheralRadio`]) and consume its asynchronous events
//! from a channel; platform bindings are the consumer's concern.

use thiserror::Error;

pub mod api;
pub mod central;
pub mod peripheral;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The radio capability is absent. Fatal to the attempted operation;
    /// nothing succeeds until the manager is re-initialized with a radio.
    #[error("invalid manager")]
    InvalidManager,
    /// The radio capability is present but not powered on. Retried implicitly
    /// on the next state change.
    #[error("bluetooth not available")]
    BluetoothNotAvailable,
    #[error("add service error: {0}")]
    AddService(String),
    #[error("remove service error: {0}")]
    RemoveService(String),
    #[error("start advertising error: {0}")]
    StartAdvertising(String),
    #[error("update value error: {0}")]
    UpdateValue(String),
    #[error("write characteristic error: {0}")]
    WriteCharacteristic(String),
    #[error("disconnect error: {0}")]
    Disconnect(String),
    #[error("discover services error: {0}")]
    DiscoverServices(String),
    #[error("discover included services error: {0}")]
    DiscoverIncludedServices(String),
    #[error("discover characteristics error: {0}")]
    DiscoverCharacteristics(String),
    #[error("discover descriptor error: {0}")]
    DiscoverDescriptor(String),
    #[error("update notification state error: {0}")]
    UpdateNotificationState(String),
    #[error("update characteristic value error: {0}")]
    UpdateCharacteristicValue(String),
    #[error("update descriptor value error: {0}")]
    UpdateDescriptorValue(String),
    /// The manager task is gone; the handle can no longer be used.
    #[error("manager stopped")]
    ManagerStopped,
    #[error("unknown error: {0}")]
    Unknown(String),
}
