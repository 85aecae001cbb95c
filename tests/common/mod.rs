#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gattlink::Result;
use gattlink::api::central::{
    CentralRadio, CharacteristicRef, DescriptorRef, DeviceId, ScanFilter, ServiceRef,
};
use gattlink::api::central_event::CentralState;
use gattlink::api::characteristic::CharacteristicWriteType;
use gattlink::api::peripheral::PeripheralRadio;
use gattlink::api::peripheral_event::{
    CharacteristicPath, ReadRequestResponse, RequestId, RequestResponse, SubscriberId,
    WriteRequestResponse,
};
use gattlink::api::service::Service;
use uuid::Uuid;

/// Polls an async condition until it holds or ~1s elapses.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[derive(Debug, Clone, PartialEq)]
pub enum CentralCall {
    Scan(ScanFilter),
    StopScan,
    Connect(DeviceId, bool),
    CancelConnection(DeviceId),
    DiscoverServices(DeviceId, Option<Vec<Uuid>>),
    DiscoverIncludedServices(ServiceRef, Option<Vec<Uuid>>),
    DiscoverCharacteristics(ServiceRef, Option<Vec<Uuid>>),
    DiscoverDescriptors(CharacteristicRef),
    SetNotify(CharacteristicRef, bool),
    ReadValue(CharacteristicRef),
    ReadDescriptor(DescriptorRef),
    WriteValue(CharacteristicRef, Vec<u8>, CharacteristicWriteType),
}

/// Records every command and acknowledges it; the test drives the matching
/// events through the manager's own channel.
pub struct MockCentralRadio {
    state: Mutex<CentralState>,
    calls: Mutex<Vec<CentralCall>>,
}

impl MockCentralRadio {
    pub fn new(state: CentralState) -> Arc<Self> {
        Arc::new(MockCentralRadio {
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_state(&self, state: CentralState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn calls(&self) -> Vec<CentralCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&CentralCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: CentralCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CentralRadio for MockCentralRadio {
    async fn state(&self) -> Result<CentralState> {
        Ok(*self.state.lock().unwrap())
    }

    async fn scan(&self, filter: ScanFilter) -> Result<()> {
        self.record(CentralCall::Scan(filter));
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(CentralCall::StopScan);
        Ok(())
    }

    async fn connect(&self, device: DeviceId, auto_reconnect: bool) -> Result<()> {
        self.record(CentralCall::Connect(device, auto_reconnect));
        Ok(())
    }

    async fn cancel_connection(&self, device: DeviceId) -> Result<()> {
        self.record(CentralCall::CancelConnection(device));
        Ok(())
    }

    async fn discover_services(&self, device: DeviceId, uuids: Option<Vec<Uuid>>) -> Result<()> {
        self.record(CentralCall::DiscoverServices(device, uuids));
        Ok(())
    }

    async fn discover_included_services(
        &self,
        service: ServiceRef,
        uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        self.record(CentralCall::DiscoverIncludedServices(service, uuids));
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        service: ServiceRef,
        uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        self.record(CentralCall::DiscoverCharacteristics(service, uuids));
        Ok(())
    }

    async fn discover_descriptors(&self, characteristic: CharacteristicRef) -> Result<()> {
        self.record(CentralCall::DiscoverDescriptors(characteristic));
        Ok(())
    }

    async fn set_notify(&self, characteristic: CharacteristicRef, enabled: bool) -> Result<()> {
        self.record(CentralCall::SetNotify(characteristic, enabled));
        Ok(())
    }

    async fn read_value(&self, characteristic: CharacteristicRef) -> Result<()> {
        self.record(CentralCall::ReadValue(characteristic));
        Ok(())
    }

    async fn read_descriptor(&self, descriptor: DescriptorRef) -> Result<()> {
        self.record(CentralCall::ReadDescriptor(descriptor));
        Ok(())
    }

    async fn write_value(
        &self,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
    ) -> Result<()> {
        self.record(CentralCall::WriteValue(characteristic, value, write_type));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeripheralCall {
    AddService(Uuid),
    RemoveService(Uuid),
    StartAdvertising(Vec<Uuid>),
    StopAdvertising,
    UpdateValue(CharacteristicPath, Vec<u8>, Option<Vec<SubscriberId>>),
    RespondToRead(RequestId, Option<Vec<u8>>, RequestResponse),
    RespondToWrite(RequestId, RequestResponse),
}

pub struct MockPeripheralRadio {
    powered: Mutex<bool>,
    accept_updates: Mutex<bool>,
    calls: Mutex<Vec<PeripheralCall>>,
}

impl MockPeripheralRadio {
    pub fn new(powered: bool) -> Arc<Self> {
        Arc::new(MockPeripheralRadio {
            powered: Mutex::new(powered),
            accept_updates: Mutex::new(true),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_powered(&self, powered: bool) {
        *self.powered.lock().unwrap() = powered;
    }

    /// When false, `update_value` reports a full outbound queue.
    pub fn set_accept_updates(&self, accept: bool) {
        *self.accept_updates.lock().unwrap() = accept;
    }

    pub fn calls(&self) -> Vec<PeripheralCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: PeripheralCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PeripheralRadio for MockPeripheralRadio {
    async fn is_powered(&self) -> Result<bool> {
        Ok(*self.powered.lock().unwrap())
    }

    async fn add_service(&self, service: &Service) -> Result<()> {
        self.record(PeripheralCall::AddService(service.uuid));
        Ok(())
    }

    async fn remove_service(&self, service: Uuid) -> Result<()> {
        self.record(PeripheralCall::RemoveService(service));
        Ok(())
    }

    async fn start_advertising(&self, services: &[Uuid]) -> Result<()> {
        self.record(PeripheralCall::StartAdvertising(services.to_vec()));
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<()> {
        self.record(PeripheralCall::StopAdvertising);
        Ok(())
    }

    async fn update_value(
        &self,
        characteristic: CharacteristicPath,
        value: Vec<u8>,
        subscribers: Option<Vec<SubscriberId>>,
    ) -> Result<bool> {
        self.record(PeripheralCall::UpdateValue(characteristic, value, subscribers));
        Ok(*self.accept_updates.lock().unwrap())
    }

    async fn respond_to_read(
        &self,
        request: RequestId,
        response: ReadRequestResponse,
    ) -> Result<()> {
        self.record(PeripheralCall::RespondToRead(
            request,
            response.value,
            response.response,
        ));
        Ok(())
    }

    async fn respond_to_write(
        &self,
        request: RequestId,
        response: WriteRequestResponse,
    ) -> Result<()> {
        self.record(PeripheralCall::RespondToWrite(request, response.response));
        Ok(())
    }
}
