use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gattlink::Result;
use gattlink::api::central::{
    CentralRadio, CharacteristicRef, DescriptorRef, DeviceId, ScanFilter, ServiceRef,
};
use gattlink::api::central_event::{CentralEvent, CentralState};
use gattlink::api::characteristic::{Characteristic, CharacteristicProperty, CharacteristicWriteType};
use gattlink::api::descriptor::AttributePermission;
use gattlink::api::peripheral::PeripheralRadio;
use gattlink::api::peripheral_event::{
    CharacteristicPath, PeripheralEvent, ReadRequest, ReadRequestResponse, RequestId, Subscriber,
    SubscriberId, WriteRequestResponse,
};
use gattlink::api::service::Service;
use gattlink::central::CentralManager;
use gattlink::peripheral::PeripheralManager;
use log::LevelFilter;
use tokio::sync::mpsc;
use uuid::Uuid;

struct QuietCentralRadio;

#[async_trait]
impl CentralRadio for QuietCentralRadio {
    async fn state(&self) -> Result<CentralState> {
        Ok(CentralState::PoweredOn)
    }
    async fn scan(&self, _filter: ScanFilter) -> Result<()> {
        Ok(())
    }
    async fn stop_scan(&self) -> Result<()> {
        Ok(())
    }
    async fn connect(&self, _device: DeviceId, _auto_reconnect: bool) -> Result<()> {
        Ok(())
    }
    async fn cancel_connection(&self, _device: DeviceId) -> Result<()> {
        Ok(())
    }
    async fn discover_services(&self, _device: DeviceId, _uuids: Option<Vec<Uuid>>) -> Result<()> {
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
        _service: ServiceRef,
        _uuids: Option<Vec<Uuid>>,
    ) -> Result<()> {
        Ok(())
    }
    async fn discover_descriptors(&self, _characteristic: CharacteristicRef) -> Result<()> {
        Ok(())
    }
    async fn set_notify(&self, _characteristic: CharacteristicRef, _enabled: bool) -> Result<()> {
        Ok(())
    }
    async fn read_value(&self, _characteristic: CharacteristicRef) -> Result<()> {
        Ok(())
    }
    async fn read_descriptor(&self, _descriptor: DescriptorRef) -> Result<()> {
        Ok(())
    }
    async fn write_value(
        &self,
        _characteristic: CharacteristicRef,
        _value: Vec<u8>,
        _write_type: CharacteristicWriteType,
    ) -> Result<()> {
        Ok(())
    }
}

struct QuietPeripheralRadio {
    powered: AtomicBool,
}

#[async_trait]
impl PeripheralRadio for QuietPeripheralRadio {
    async fn is_powered(&self) -> Result<bool> {
        Ok(self.powered.load(Ordering::SeqCst))
    }
    async fn add_service(&self, service: &Service) -> Result<()> {
        log::info!("radio: add service {}", service.uuid);
        Ok(())
    }
    async fn remove_service(&self, _service: Uuid) -> Result<()> {
        Ok(())
    }
    async fn start_advertising(&self, services: &[Uuid]) -> Result<()> {
        log::info!("radio: advertising {services:?}");
        Ok(())
    }
    async fn stop_advertising(&self) -> Result<()> {
        Ok(())
    }
    async fn update_value(
        &self,
        characteristic: CharacteristicPath,
        value: Vec<u8>,
        _subscribers: Option<Vec<SubscriberId>>,
    ) -> Result<bool> {
        log::info!(
            "radio: notify {} bytes on {}",
            value.len(),
            characteristic.characteristic
        );
        Ok(true)
    }
    async fn respond_to_read(
        &self,
        request: RequestId,
        response: ReadRequestResponse,
    ) -> Result<()> {
        log::info!("radio: read response {:?} -> {:?}", request, response.value);
        Ok(())
    }
    async fn respond_to_write(
        &self,
        _request: RequestId,
        _response: WriteRequestResponse,
    ) -> Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .init();

    let (central_events, central_rx) = mpsc::channel::<CentralEvent>(256);
    let central = CentralManager::spawn(Some(Arc::new(QuietCentralRadio)), central_rx);

    let (peripheral_events, peripheral_rx) = mpsc::channel::<PeripheralEvent>(256);
    let peripheral_radio = Arc::new(QuietPeripheralRadio {
        powered: AtomicBool::new(true),
    });
    let peripheral =
        PeripheralManager::spawn(Some(peripheral_radio.clone()), peripheral_rx);

    // watch both managers and log on every state change
    let mut central_changes = central.changes();
    let central_watch = central.clone();
    tokio::spawn(async move {
        while central_changes.changed().await.is_ok() {
            let devices = central_watch.devices().await.unwrap_or_default();
            log::info!("central now tracks {} devices", devices.len());
        }
    });
    let mut peripheral_changes = peripheral.changes();
    let peripheral_watch = peripheral.clone();
    tokio::spawn(async move {
        while peripheral_changes.changed().await.is_ok() {
            let services = peripheral_watch.services().await.unwrap_or_default();
            log::info!("peripheral now publishes {} services", services.len());
        }
    });

    // publish a service with one read-only characteristic
    let service_uuid = Uuid::from_u128(0x51);
    let characteristic_uuid = Uuid::from_u128(0xC1);
    let service = Service {
        uuid: service_uuid,
        primary: true,
        characteristics: vec![Characteristic {
            uuid: characteristic_uuid,
            properties: vec![CharacteristicProperty::Read],
            permissions: vec![AttributePermission::Readable],
            value: Some(b"hello".to_vec()),
            ..Characteristic::default()
        }],
        included_services: Vec::new(),
    };
    peripheral.add_service(service).await.unwrap();

    // the advertising guard only proceeds while the radio reports not ready
    peripheral_radio.powered.store(false, Ordering::SeqCst);
    peripheral.start_advertising().await.unwrap();

    // a remote central subscribes, then reads
    let path = CharacteristicPath {
        service: service_uuid,
        characteristic: characteristic_uuid,
    };
    peripheral_events
        .send(PeripheralEvent::Subscribed {
            subscriber: Subscriber {
                id: SubscriberId(Uuid::from_u128(0xA1)),
                max_update_len: 180,
            },
            characteristic: path,
        })
        .await
        .unwrap();
    peripheral_events
        .send(PeripheralEvent::ReadRequested {
            request: ReadRequest {
                id: RequestId(1),
                characteristic: path,
                offset: 0,
            },
        })
        .await
        .unwrap();

    // meanwhile, scan on the central side
    central.start_scan(ScanFilter::default()).await.unwrap();
    drop(central_events);

    tokio::time::sleep(Duration::from_millis(100)).await;
}
