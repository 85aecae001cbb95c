use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gattlink::Result;
use gattlink::api::central::{
    CentralRadio, CharacteristicRef, DescriptorRef, DeviceId, ScanFilter, ServiceRef,
};
use gattlink::api::central_event::{Advertisement, CentralEvent, CentralState};
use gattlink::api::characteristic::CharacteristicWriteType;
use gattlink::central::CentralManager;
use log::LevelFilter;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Stand-in for a platform radio binding: acknowledges every command and
/// reports powered on. A real binding would emit the matching events.
struct StubRadio;

#[async_trait]
impl CentralRadio for StubRadio {
    async fn state(&self) -> Result<CentralState> {
        Ok(CentralState::PoweredOn)
    }

    async fn scan(&self, filter: ScanFilter) -> Result<()> {
        log::info!("radio: scan {filter:?}");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        log::info!("radio: stop scan");
        Ok(())
    }

    async fn connect(&self, device: DeviceId, auto_reconnect: bool) -> Result<()> {
        log::info!("radio: connect {:?} (auto reconnect: {auto_reconnect})", device.0);
        Ok(())
    }

    async fn cancel_connection(&self, device: DeviceId) -> Result<()> {
        log::info!("radio: cancel connection {:?}", device.0);
        Ok(())
    }

    async fn discover_services(&self, device: DeviceId, uuids: Option<Vec<Uuid>>) -> Result<()> {
        log::info!("radio: discover services on {:?} ({uuids:?})", device.0);
        Ok(())
    }

    async fn discover_included_services(
        &self,
        _service: ServiceRef,
        _uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        service: ServiceRef,
        _uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        log::info!("radio: discover characteristics of {}", service.service);
        Ok(())
    }

    async fn discover_descriptors(&self, _characteristic: CharacteristicRef) -> Result<()> {
        Ok(())
    }

    async fn set_notify(&self, _characteristic: CharacteristicRef, _enabled: bool) -> Result<()> {
        Ok(())
    }

    async fn read_value(&self, characteristic: CharacteristicRef) -> Result<()> {
        log::info!("radio: read {}", characteristic.characteristic);
        Ok(())
    }

    async fn read_descriptor(&self, _descriptor: DescriptorRef) -> Result<()> {
        Ok(())
    }

    async fn write_value(
        &self,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        _write_type: CharacteristicWriteType,
    ) -> Result<()> {
        log::info!("radio: write {} bytes to {}", value.len(), characteristic.characteristic);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .init();

    let (event_tx, event_rx) = mpsc::channel::<CentralEvent>(256);
    let central = CentralManager::spawn(Some(Arc::new(StubRadio)), event_rx);

    // start scanning for devices
    central.start_scan(ScanFilter::default()).await.unwrap();

    // pretend the radio saw a device and connected to it
    let device = DeviceId(Uuid::from_u128(0xD0));
    event_tx
        .send(CentralEvent::DeviceDiscovered {
            device,
            name: Some("demo-sensor".into()),
            advertisement: Advertisement::default(),
            rssi: -42,
        })
        .await
        .unwrap();
    event_tx.send(CentralEvent::Connected { device }).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    for device in central.devices().await.unwrap() {
        log::info!(
            "tracked: {:?} name={:?} state={:?} rssi={:?}",
            device.id.0,
            device.name,
            device.state,
            device.rssi
        );
    }
}
