//! Central role manager: owns scan state, the tracked remote devices and the
//! per-characteristic received-value history, and drives a [`CentralRadio`].
//!
//! The manager runs as a single task that serializes every mutation: commands
//! arrive from cloneable [`CentralHandle`]s, radio events from the channel
//! handed over at spawn time, and nothing else touches the owned collections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::central::{
    CentralRadio, CharacteristicRef, DescriptorRef, DeviceId, ScanFilter, ServiceRef,
};
use crate::api::central_event::{CentralEvent, CentralState};
use crate::api::characteristic::{Characteristic, CharacteristicProperty, CharacteristicWriteType};
use crate::api::descriptor::USER_DESCRIPTION_UUID;
use crate::{Error, Result};

pub mod device;
mod verify;

pub use device::{ConnectionState, RemoteDevice};

const COMMAND_BUFFER: usize = 256;

/// Timing knobs. The defaults match the shipped behavior: one-second write
/// verification polls, ten attempts, one-second error auto-clear.
#[derive(Clone, Debug)]
pub struct CentralConfig {
    pub write_verify_interval: Duration,
    pub write_verify_attempts: u32,
    pub error_clear_delay: Duration,
}

impl Default for CentralConfig {
    fn default() -> Self {
        CentralConfig {
            write_verify_interval: Duration::from_secs(1),
            write_verify_attempts: 10,
            error_clear_delay: Duration::from_secs(1),
        }
    }
}

enum Command {
    StartScan {
        filter: ScanFilter,
        responder: oneshot::Sender<Result<()>>,
    },
    StopScan {
        responder: oneshot::Sender<Result<()>>,
    },
    Connect {
        device: DeviceId,
        responder: oneshot::Sender<Result<()>>,
    },
    CancelConnection {
        device: DeviceId,
        responder: oneshot::Sender<Result<()>>,
    },
    DiscoverServices {
        device: DeviceId,
        uuids: Option<Vec<Uuid>>,
        responder: oneshot::Sender<Result<()>>,
    },
    DiscoverServiceDetails {
        service: ServiceRef,
        characteristic_uuids: Option<Vec<Uuid>>,
        included_uuids: Option<Vec<Uuid>>,
        responder: oneshot::Sender<Result<()>>,
    },
    DiscoverDescriptors {
        characteristic: CharacteristicRef,
        responder: oneshot::Sender<Result<()>>,
    },
    SetNotifying {
        characteristic: CharacteristicRef,
        enabled: bool,
        responder: oneshot::Sender<Result<()>>,
    },
    ReadCharacteristic {
        characteristic: CharacteristicRef,
        responder: oneshot::Sender<Result<()>>,
    },
    ReadDescriptor {
        descriptor: DescriptorRef,
        responder: oneshot::Sender<Result<()>>,
    },
    Write {
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
        responder: oneshot::Sender<Result<()>>,
    },
    Devices {
        responder: oneshot::Sender<Vec<RemoteDevice>>,
    },
    ReceivedValues {
        characteristic: CharacteristicRef,
        responder: oneshot::Sender<Vec<Vec<u8>>>,
    },
    ActiveFilter {
        responder: oneshot::Sender<ScanFilter>,
    },
    RestoredFilter {
        responder: oneshot::Sender<Option<ScanFilter>>,
    },
    LastError {
        responder: oneshot::Sender<Option<Error>>,
    },
    ReportError {
        error: Error,
    },
    ClearError,
}

pub struct CentralManager {
    radio: Option<Arc<dyn CentralRadio>>,
    devices: Vec<RemoteDevice>,
    received: HashMap<CharacteristicRef, Vec<Vec<u8>>>,
    scan_filter: ScanFilter,
    restored_filter: Option<ScanFilter>,
    last_error: Option<Error>,
    verify_tasks: HashMap<CharacteristicRef, JoinHandle<()>>,
    config: CentralConfig,
    commands: mpsc::WeakSender<Command>,
    changes: watch::Sender<u64>,
}

impl CentralManager {
    pub fn spawn(
        radio: Option<Arc<dyn CentralRadio>>,
        events: mpsc::Receiver<CentralEvent>,
    ) -> CentralHandle {
        Self::spawn_with_config(radio, events, CentralConfig::default())
    }

    pub fn spawn_with_config(
        radio: Option<Arc<dyn CentralRadio>>,
        events: mpsc::Receiver<CentralEvent>,
        config: CentralConfig,
    ) -> CentralHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (change_tx, change_rx) = watch::channel(0);
        let manager = CentralManager {
            radio,
            devices: Vec::new(),
            received: HashMap::new(),
            scan_filter: ScanFilter::default(),
            restored_filter: None,
            last_error: None,
            verify_tasks: HashMap::new(),
            config,
            commands: command_tx.downgrade(),
            changes: change_tx,
        };
        tokio::spawn(manager.run(command_rx, events));
        CentralHandle {
            commands: command_tx,
            changes: change_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<CentralEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(command) = commands.recv() => self.handle_command(command).await,
                else => break,
            }
        }
        for (_, task) in self.verify_tasks.drain() {
            task.abort();
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartScan { filter, responder } => {
                let result = self.start_scan(filter).await;
                self.finish(responder, result);
            }
            Command::StopScan { responder } => {
                let result = self.stop_scan().await;
                self.finish(responder, result);
            }
            Command::Connect { device, responder } => {
                let result = self.connect(device).await;
                self.finish(responder, result);
            }
            Command::CancelConnection { device, responder } => {
                let result = self.cancel_connection(device).await;
                self.finish(responder, result);
            }
            Command::DiscoverServices {
                device,
                uuids,
                responder,
            } => {
                let result = self.discover_services(device, uuids).await;
                self.finish(responder, result);
            }
            Command::DiscoverServiceDetails {
                service,
                characteristic_uuids,
                included_uuids,
                responder,
            } => {
                let result = self
                    .discover_service_details(service, characteristic_uuids, included_uuids)
                    .await;
                self.finish(responder, result);
            }
            Command::DiscoverDescriptors {
                characteristic,
                responder,
            } => {
                let result = self.discover_descriptors(characteristic).await;
                self.finish(responder, result);
            }
            Command::SetNotifying {
                characteristic,
                enabled,
                responder,
            } => {
                let result = self.set_notifying(characteristic, enabled).await;
                self.finish(responder, result);
            }
            Command::ReadCharacteristic {
                characteristic,
                responder,
            } => {
                let result = self.read_characteristic(characteristic).await;
                self.finish(responder, result);
            }
            Command::ReadDescriptor {
                descriptor,
                responder,
            } => {
                let result = self.read_descriptor(descriptor).await;
                self.finish(responder, result);
            }
            Command::Write {
                characteristic,
                value,
                write_type,
                responder,
            } => {
                let result = self.write(characteristic, value, write_type).await;
                self.finish(responder, result);
            }
            Command::Devices { responder } => {
                let _ = responder.send(self.devices.clone());
            }
            Command::ReceivedValues {
                characteristic,
                responder,
            } => {
                let values = self.received.get(&characteristic).cloned().unwrap_or_default();
                let _ = responder.send(values);
            }
            Command::ActiveFilter { responder } => {
                let _ = responder.send(self.scan_filter.clone());
            }
            Command::RestoredFilter { responder } => {
                let _ = responder.send(self.restored_filter.clone());
            }
            Command::LastError { responder } => {
                let _ = responder.send(self.last_error.clone());
            }
            Command::ReportError { error } => self.set_error(error),
            Command::ClearError => {
                self.last_error = None;
                self.touch();
            }
        }
    }

    async fn handle_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::StateChanged { state } => {
                log::info!("central state changed: {state:?}");
                if state != CentralState::PoweredOn {
                    self.set_error(Error::BluetoothNotAvailable);
                }
            }
            CentralEvent::RestoreState { devices, filter } => {
                log::info!("central restoring {} devices", devices.len());
                self.devices = devices;
                self.scan_filter = filter.clone();
                self.restored_filter = Some(filter);
                self.touch();
            }
            CentralEvent::DeviceDiscovered {
                device,
                name,
                advertisement,
                rssi,
            } => {
                log::debug!("discovered device {:?}", device.0);
                {
                    let entry = self.device_entry(device);
                    if name.is_some() {
                        entry.name = name;
                    }
                    entry.advertisement = advertisement;
                    entry.rssi = Some(rssi);
                }
                self.touch();
            }
            CentralEvent::Connected { device } => {
                log::info!("connected to {:?}", device.0);
                let uuids = self.scan_filter.services.clone();
                {
                    let entry = self.device_entry(device);
                    entry.state = ConnectionState::Connected;
                }
                self.touch();
                if let Err(error) = self.discover_services(device, uuids).await {
                    self.set_error(error);
                }
            }
            CentralEvent::FailedToConnect { device, error } => {
                log::warn!("failed to connect to {:?}", device.0);
                if let Err(cancel_error) = self.cancel_connection(device).await {
                    self.set_error(cancel_error);
                }
                if let Some(connect_error) = error {
                    self.set_error(Error::Unknown(connect_error.to_string()));
                }
            }
            CentralEvent::Disconnected {
                device,
                is_reconnecting,
                error,
            } => {
                log::info!(
                    "disconnected from {:?} (reconnecting: {is_reconnecting})",
                    device.0
                );
                // any pending write confirmation for this device is moot now
                self.verify_tasks.retain(|reference, task| {
                    if reference.device == device {
                        task.abort();
                        false
                    } else {
                        true
                    }
                });
                if let Err(cancel_error) = self.cancel_connection(device).await {
                    self.set_error(cancel_error);
                }
                {
                    let entry = self.device_entry(device);
                    entry.state = ConnectionState::Disconnected;
                }
                self.touch();
                if let Some(disconnect_error) = error {
                    self.set_error(Error::Disconnect(disconnect_error.to_string()));
                    if !is_reconnecting {
                        if let Err(connect_error) = self.connect(device).await {
                            self.set_error(connect_error);
                        }
                    }
                }
            }
            CentralEvent::ServicesModified {
                device,
                invalidated,
            } => {
                log::info!("services modified on {:?}", device.0);
                if let Err(error) = self.discover_services(device, Some(invalidated)).await {
                    self.set_error(error);
                }
                self.touch();
            }
            CentralEvent::ServicesDiscovered {
                device,
                services,
                error,
            } => match error {
                Some(error) => self.set_error(Error::DiscoverServices(error.to_string())),
                None => {
                    let uuids: Vec<Uuid> = services.iter().map(|s| s.uuid).collect();
                    {
                        let entry = self.device_entry(device);
                        entry.services = services;
                    }
                    self.touch();
                    for service in uuids {
                        let service_ref = ServiceRef { device, service };
                        if let Err(error) =
                            self.discover_service_details(service_ref, None, None).await
                        {
                            self.set_error(error);
                        }
                    }
                }
            },
            CentralEvent::IncludedServicesDiscovered {
                service,
                included,
                error,
            } => match error {
                Some(error) => self.set_error(Error::DiscoverIncludedServices(error.to_string())),
                None => {
                    if let Some(device) = self.device_mut(service.device) {
                        if let Some(entry) = device.service_mut(service.service) {
                            entry.included_services = included;
                        }
                    }
                    self.touch();
                }
            },
            CentralEvent::CharacteristicsDiscovered {
                service,
                characteristics,
                error,
            } => match error {
                Some(error) => self.set_error(Error::DiscoverCharacteristics(error.to_string())),
                None => {
                    let uuids: Vec<Uuid> = characteristics.iter().map(|c| c.uuid).collect();
                    if let Some(device) = self.device_mut(service.device) {
                        if let Some(entry) = device.service_mut(service.service) {
                            entry.characteristics = characteristics;
                        }
                    }
                    self.touch();
                    for characteristic in uuids {
                        let reference = CharacteristicRef {
                            device: service.device,
                            service: service.service,
                            characteristic,
                        };
                        if let Err(error) = self.discover_descriptors(reference).await {
                            self.set_error(error);
                        }
                        if let Err(error) = self.read_characteristic(reference).await {
                            self.set_error(error);
                        }
                    }
                }
            },
            CentralEvent::DescriptorsDiscovered {
                characteristic,
                descriptors,
                error,
            } => match error {
                Some(error) => self.set_error(Error::DiscoverDescriptor(error.to_string())),
                None => {
                    let has_user_description = descriptors
                        .iter()
                        .any(|d| d.uuid == USER_DESCRIPTION_UUID);
                    if let Some(device) = self.device_mut(characteristic.device) {
                        if let Some(entry) = device.characteristic_mut(
                            characteristic.service,
                            characteristic.characteristic,
                        ) {
                            entry.descriptors = descriptors;
                        }
                    }
                    self.touch();
                    if has_user_description {
                        let descriptor = characteristic.descriptor(USER_DESCRIPTION_UUID);
                        if let Err(error) = self.read_descriptor(descriptor).await {
                            self.set_error(error);
                        }
                    }
                }
            },
            CentralEvent::NotificationStateChanged {
                characteristic,
                is_notifying,
                error,
            } => match error {
                Some(error) => self.set_error(Error::UpdateNotificationState(error.to_string())),
                None => {
                    if let Some(device) = self.device_mut(characteristic.device) {
                        if let Some(entry) = device.characteristic_mut(
                            characteristic.service,
                            characteristic.characteristic,
                        ) {
                            entry.is_notifying = is_notifying;
                        }
                    }
                    self.touch();
                }
            },
            CentralEvent::CharacteristicValueUpdated {
                characteristic,
                value,
                error,
            } => match error {
                Some(error) => {
                    self.set_error(Error::UpdateCharacteristicValue(error.to_string()))
                }
                None => {
                    if let Some(value) = value {
                        self.received
                            .entry(characteristic)
                            .or_default()
                            .insert(0, value.clone());
                        if let Some(device) = self.device_mut(characteristic.device) {
                            if let Some(entry) = device.characteristic_mut(
                                characteristic.service,
                                characteristic.characteristic,
                            ) {
                                entry.value = Some(value);
                            }
                        }
                    }
                    self.touch();
                }
            },
            CentralEvent::DescriptorValueUpdated {
                descriptor,
                value,
                error,
            } => match error {
                Some(error) => self.set_error(Error::UpdateDescriptorValue(error.to_string())),
                None => {
                    if let Some(value) = value {
                        if let Some(device) = self.device_mut(descriptor.device) {
                            if let Some(entry) = device.descriptor_mut(
                                descriptor.service,
                                descriptor.characteristic,
                                descriptor.descriptor,
                            ) {
                                entry.value = Some(value.clone());
                            }
                            if descriptor.descriptor == USER_DESCRIPTION_UUID {
                                if let Some(entry) = device.characteristic_mut(
                                    descriptor.service,
                                    descriptor.characteristic,
                                ) {
                                    entry.user_description =
                                        Some(String::from_utf8_lossy(&value).into_owned());
                                }
                            }
                        }
                    }
                    self.touch();
                }
            },
            CentralEvent::WriteCompleted {
                characteristic,
                error,
            } => match error {
                Some(error) => {
                    let is_notifying = self
                        .find_characteristic(characteristic)
                        .map(|c| c.is_notifying)
                        .unwrap_or(false);
                    if is_notifying {
                        self.set_error(Error::WriteCharacteristic(error.to_string()));
                    } else if let Err(read_error) = self.read_characteristic(characteristic).await {
                        self.set_error(read_error);
                    }
                }
                None => self.touch(),
            },
        }
    }

    /// Restarts scanning from a clean slate: every tracked device goes through
    /// the cleanup protocol, the tracked set is emptied and the filter is
    /// replaced before the scan command goes out.
    async fn start_scan(&mut self, filter: ScanFilter) -> Result<()> {
        let radio = self.check_radio().await?;
        let stale = std::mem::take(&mut self.devices);
        for device in &stale {
            cleanup_device(radio.as_ref(), device).await;
        }
        for (_, task) in self.verify_tasks.drain() {
            task.abort();
        }
        self.scan_filter = filter.clone();
        self.touch();
        radio.scan(filter).await
    }

    /// Pass-through; the last-seen device set stays visible after stopping.
    async fn stop_scan(&self) -> Result<()> {
        let radio = self.radio.clone().ok_or(Error::InvalidManager)?;
        radio.stop_scan().await
    }

    async fn connect(&mut self, device: DeviceId) -> Result<()> {
        let radio = self.check_radio().await?;
        log::info!("connecting to {:?}", device.0);
        radio.connect(device, true).await?;
        {
            let entry = self.device_entry(device);
            entry.state = ConnectionState::Connecting;
        }
        self.touch();
        Ok(())
    }

    async fn cancel_connection(&mut self, device: DeviceId) -> Result<()> {
        let radio = self.check_radio().await?;
        if let Some(tracked) = self.devices.iter().find(|d| d.id == device).cloned() {
            cleanup_device(radio.as_ref(), &tracked).await;
        } else {
            radio.cancel_connection(device).await?;
        }
        {
            let entry = self.device_entry(device);
            entry.state = ConnectionState::Disconnecting;
        }
        self.touch();
        Ok(())
    }

    async fn discover_services(&self, device: DeviceId, uuids: Option<Vec<Uuid>>) -> Result<()> {
        let radio = self.check_radio().await?;
        radio.discover_services(device, uuids).await
    }

    async fn discover_service_details(
        &self,
        service: ServiceRef,
        characteristic_uuids: Option<Vec<Uuid>>,
        included_uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        let radio = self.check_radio().await?;
        radio
            .discover_characteristics(service, characteristic_uuids)
            .await?;
        radio
            .discover_included_services(service, included_uuids)
            .await
    }

    async fn discover_descriptors(&self, characteristic: CharacteristicRef) -> Result<()> {
        let radio = self.check_radio().await?;
        radio.discover_descriptors(characteristic).await
    }

    async fn set_notifying(&self, characteristic: CharacteristicRef, enabled: bool) -> Result<()> {
        let radio = self.check_radio().await?;
        let notifies = self
            .find_characteristic(characteristic)
            .map(|c| c.has_property(CharacteristicProperty::Notify))
            .unwrap_or(false);
        if !notifies {
            return Ok(());
        }
        radio.set_notify(characteristic, enabled).await
    }

    async fn read_characteristic(&self, characteristic: CharacteristicRef) -> Result<()> {
        let radio = self.check_radio().await?;
        radio.read_value(characteristic).await
    }

    async fn read_descriptor(&self, descriptor: DescriptorRef) -> Result<()> {
        let radio = self.check_radio().await?;
        radio.read_descriptor(descriptor).await
    }

    async fn write(
        &mut self,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
    ) -> Result<()> {
        let radio = self.check_radio().await?;
        let (matches_declared, is_notifying) = match self.find_characteristic(characteristic) {
            Some(c) => {
                let matches_declared = match &write_type {
                    CharacteristicWriteType::WriteWithResponse => {
                        c.has_property(CharacteristicProperty::Write)
                    }
                    CharacteristicWriteType::WriteWithoutResponse => {
                        c.has_property(CharacteristicProperty::WriteWithoutResponse)
                    }
                };
                (matches_declared, c.is_notifying)
            }
            None => (false, false),
        };
        if !matches_declared {
            // surfaced but not blocking: the write is still attempted
            self.set_error(Error::WriteCharacteristic("invalid write type".into()));
        }
        radio
            .write_value(characteristic, value.clone(), write_type.clone())
            .await?;

        if write_type == CharacteristicWriteType::WriteWithoutResponse && !is_notifying {
            self.verify_tasks.retain(|_, task| !task.is_finished());
            if let Some(previous) = self.verify_tasks.remove(&characteristic) {
                previous.abort();
            }
            if let Some(handle) = self.handle() {
                let task = verify::spawn_verification(
                    handle,
                    characteristic,
                    value,
                    self.config.write_verify_interval,
                    self.config.write_verify_attempts,
                );
                self.verify_tasks.insert(characteristic, task);
            }
        }
        Ok(())
    }

    async fn check_radio(&self) -> Result<Arc<dyn CentralRadio>> {
        let radio = self.radio.clone().ok_or(Error::InvalidManager)?;
        if radio.state().await? != CentralState::PoweredOn {
            return Err(Error::BluetoothNotAvailable);
        }
        Ok(radio)
    }

    fn finish(&mut self, responder: oneshot::Sender<Result<()>>, result: Result<()>) {
        if let Err(error) = &result {
            self.set_error(error.clone());
        }
        let _ = responder.send(result);
    }

    fn set_error(&mut self, error: Error) {
        log::error!("central: {error}");
        self.last_error = Some(error);
        self.touch();
        let commands = self.commands.clone();
        let delay = self.config.error_clear_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::ClearError).await;
            }
        });
    }

    fn touch(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn handle(&self) -> Option<CentralHandle> {
        self.commands.upgrade().map(|commands| CentralHandle {
            commands,
            changes: self.changes.subscribe(),
        })
    }

    /// Find-or-append: replacing an existing entry keeps its position, new
    /// entries go to the back.
    fn device_entry(&mut self, id: DeviceId) -> &mut RemoteDevice {
        let index = match self.devices.iter().position(|d| d.id == id) {
            Some(index) => index,
            None => {
                self.devices.push(RemoteDevice::new(id));
                self.devices.len() - 1
            }
        };
        &mut self.devices[index]
    }

    fn device_mut(&mut self, id: DeviceId) -> Option<&mut RemoteDevice> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    fn find_characteristic(&self, reference: CharacteristicRef) -> Option<&Characteristic> {
        self.devices
            .iter()
            .find(|d| d.id == reference.device)?
            .characteristic(reference.service, reference.characteristic)
    }
}

/// Disable notifications across the device's known tree when it is connected,
/// then cancel the connection.
async fn cleanup_device(radio: &dyn CentralRadio, device: &RemoteDevice) {
    if device.state == ConnectionState::Connected {
        let disables = device
            .characteristic_refs()
            .into_iter()
            .map(|characteristic| radio.set_notify(characteristic, false));
        for result in join_all(disables).await {
            if let Err(error) = result {
                log::warn!("failed to disable notifications: {error}");
            }
        }
    }
    if let Err(error) = radio.cancel_connection(device.id).await {
        log::warn!("failed to cancel connection to {:?}: {error}", device.id.0);
    }
}

/// Cloneable front door to a spawned [`CentralManager`]. Commands are
/// serialized onto the manager task; queries answer with owned snapshots.
#[derive(Clone)]
pub struct CentralHandle {
    commands: mpsc::Sender<Command>,
    changes: watch::Receiver<u64>,
}

impl CentralHandle {
    pub async fn start_scan(&self, filter: ScanFilter) -> Result<()> {
        self.request(|responder| Command::StartScan { filter, responder })
            .await?
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.request(|responder| Command::StopScan { responder })
            .await?
    }

    pub async fn connect(&self, device: DeviceId) -> Result<()> {
        self.request(|responder| Command::Connect { device, responder })
            .await?
    }

    pub async fn cancel_connection(&self, device: DeviceId) -> Result<()> {
        self.request(|responder| Command::CancelConnection { device, responder })
            .await?
    }

    pub async fn discover_services(
        &self,
        device: DeviceId,
        uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        self.request(|responder| Command::DiscoverServices {
            device,
            uuids,
            responder,
        })
        .await?
    }

    /// Discovers a service's characteristics and included services in one go.
    pub async fn discover_service_details(
        &self,
        service: ServiceRef,
        characteristic_uuids: Option<Vec<Uuid>>,
        included_uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        self.request(|responder| Command::DiscoverServiceDetails {
            service,
            characteristic_uuids,
            included_uuids,
            responder,
        })
        .await?
    }

    pub async fn discover_descriptors(&self, characteristic: CharacteristicRef) -> Result<()> {
        self.request(|responder| Command::DiscoverDescriptors {
            characteristic,
            responder,
        })
        .await?
    }

    /// No-op when the characteristic does not advertise the notify property.
    pub async fn set_notifying(
        &self,
        characteristic: CharacteristicRef,
        enabled: bool,
    ) -> Result<()> {
        self.request(|responder| Command::SetNotifying {
            characteristic,
            enabled,
            responder,
        })
        .await?
    }

    pub async fn read_characteristic(&self, characteristic: CharacteristicRef) -> Result<()> {
        self.request(|responder| Command::ReadCharacteristic {
            characteristic,
            responder,
        })
        .await?
    }

    pub async fn read_descriptor(&self, descriptor: DescriptorRef) -> Result<()> {
        self.request(|responder| Command::ReadDescriptor {
            descriptor,
            responder,
        })
        .await?
    }

    /// A write without response on a non-notifying characteristic additionally
    /// spawns the application-level write verification poll.
    pub async fn write(
        &self,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
    ) -> Result<()> {
        self.request(|responder| Command::Write {
            characteristic,
            value,
            write_type,
            responder,
        })
        .await?
    }

    pub async fn devices(&self) -> Result<Vec<RemoteDevice>> {
        self.request(|responder| Command::Devices { responder }).await
    }

    /// Received-value history for a characteristic, newest first.
    pub async fn received_values(
        &self,
        characteristic: CharacteristicRef,
    ) -> Result<Vec<Vec<u8>>> {
        self.request(|responder| Command::ReceivedValues {
            characteristic,
            responder,
        })
        .await
    }

    pub async fn scan_filter(&self) -> Result<ScanFilter> {
        self.request(|responder| Command::ActiveFilter { responder })
            .await
    }

    pub async fn restored_scan_filter(&self) -> Result<Option<ScanFilter>> {
        self.request(|responder| Command::RestoredFilter { responder })
            .await
    }

    pub async fn last_error(&self) -> Result<Option<Error>> {
        self.request(|responder| Command::LastError { responder })
            .await
    }

    /// Change feed: the version bumps on every state mutation; re-query the
    /// snapshots on change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.clone()
    }

    pub(crate) async fn report_error(&self, error: Error) {
        let _ = self.commands.send(Command::ReportError { error }).await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (responder, response) = oneshot::channel();
        self.commands
            .send(command(responder))
            .await
            .map_err(|_| Error::ManagerStopped)?;
        response.await.map_err(|_| Error::ManagerStopped)
    }
}
