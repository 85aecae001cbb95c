mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockPeripheralRadio, PeripheralCall, eventually};
use gattlink::Error;
use gattlink::api::characteristic::{Characteristic, CharacteristicProperty};
use gattlink::api::descriptor::AttributePermission;
use gattlink::api::peripheral_event::{
    CharacteristicPath, PeripheralEvent, ReadRequest, RequestId, RequestResponse, Subscriber,
    SubscriberId, WriteRequest,
};
use gattlink::api::service::Service;
use gattlink::peripheral::{PeripheralConfig, PeripheralHandle, PeripheralManager};
use tokio::sync::mpsc;
use uuid::Uuid;

const SERVICE: Uuid = Uuid::from_u128(0x51);
const OTHER_SERVICE: Uuid = Uuid::from_u128(0x52);
const CHARACTERISTIC: Uuid = Uuid::from_u128(0xC1);

const PATH: CharacteristicPath = CharacteristicPath {
    service: SERVICE,
    characteristic: CHARACTERISTIC,
};

struct Peripheral {
    radio: Arc<MockPeripheralRadio>,
    handle: PeripheralHandle,
    events: mpsc::Sender<PeripheralEvent>,
}

fn spawn_peripheral(powered: bool) -> Peripheral {
    spawn_with_config(
        powered,
        PeripheralConfig {
            error_clear_delay: Duration::from_secs(5),
        },
    )
}

fn spawn_with_config(powered: bool, config: PeripheralConfig) -> Peripheral {
    let radio = MockPeripheralRadio::new(powered);
    let (events, event_rx) = mpsc::channel(256);
    let handle = PeripheralManager::spawn_with_config(Some(radio.clone()), event_rx, config);
    Peripheral {
        radio,
        handle,
        events,
    }
}

fn read_only_service(value: &[u8]) -> Service {
    Service {
        uuid: SERVICE,
        primary: true,
        characteristics: vec![Characteristic {
            uuid: CHARACTERISTIC,
            properties: vec![CharacteristicProperty::Read],
            permissions: vec![AttributePermission::Readable],
            value: Some(value.to_vec()),
            ..Characteristic::default()
        }],
        included_services: Vec::new(),
    }
}

fn writable_service() -> Service {
    Service {
        uuid: SERVICE,
        primary: true,
        characteristics: vec![Characteristic {
            uuid: CHARACTERISTIC,
            properties: vec![
                CharacteristicProperty::Read,
                CharacteristicProperty::Write,
                CharacteristicProperty::WriteWithoutResponse,
                CharacteristicProperty::Notify,
            ],
            permissions: vec![
                AttributePermission::Readable,
                AttributePermission::Writeable,
            ],
            value: None,
            ..Characteristic::default()
        }],
        included_services: Vec::new(),
    }
}

async fn subscribe(peripheral: &Peripheral, id: u128, max_update_len: usize) -> SubscriberId {
    let subscriber = SubscriberId(Uuid::from_u128(id));
    peripheral
        .events
        .send(PeripheralEvent::Subscribed {
            subscriber: Subscriber {
                id: subscriber,
                max_update_len,
            },
            characteristic: PATH,
        })
        .await
        .unwrap();
    assert!(
        eventually(|| async {
            peripheral
                .handle
                .subscribers(PATH)
                .await
                .unwrap()
                .iter()
                .any(|s| s.id == subscriber)
        })
        .await
    );
    subscriber
}

#[tokio::test]
async fn add_service_needs_a_usable_radio() {
    let (_events, event_rx) = mpsc::channel(8);
    let absent = PeripheralManager::spawn(None, event_rx);
    assert_eq!(
        absent.add_service(writable_service()).await,
        Err(Error::InvalidManager)
    );

    let unpowered = spawn_peripheral(false);
    assert_eq!(
        unpowered.handle.add_service(writable_service()).await,
        Err(Error::BluetoothNotAvailable)
    );
    assert!(unpowered.radio.calls().is_empty());
}

#[tokio::test]
async fn add_service_rejects_duplicate_uuid() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();
    assert_eq!(
        peripheral.handle.add_service(writable_service()).await,
        Err(Error::AddService("service exists".into()))
    );
    assert_eq!(peripheral.handle.services().await.unwrap().len(), 1);
}

#[tokio::test]
async fn add_service_rejects_cached_value_on_writable_characteristic() {
    let peripheral = spawn_peripheral(true);
    let mut invalid = read_only_service(b"hello");
    invalid.characteristics[0]
        .properties
        .push(CharacteristicProperty::Write);
    invalid.characteristics[0]
        .permissions
        .push(AttributePermission::Writeable);

    assert_eq!(
        peripheral.handle.add_service(invalid).await,
        Err(Error::AddService(
            "characteristic with cached value must be read-only".into()
        ))
    );
    assert!(peripheral.handle.services().await.unwrap().is_empty());
    assert!(peripheral.radio.calls().is_empty());
}

#[tokio::test]
async fn add_service_rejects_unpublished_included_service() {
    let peripheral = spawn_peripheral(true);
    let dependent = Service {
        uuid: OTHER_SERVICE,
        included_services: vec![SERVICE],
        ..Service::default()
    };

    assert_eq!(
        peripheral.handle.add_service(dependent).await,
        Err(Error::AddService("included service is not published".into()))
    );
    assert!(peripheral.handle.services().await.unwrap().is_empty());
    assert!(peripheral.radio.calls().is_empty());
}

#[tokio::test]
async fn add_service_accepts_published_included_service() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();
    let dependent = Service {
        uuid: OTHER_SERVICE,
        included_services: vec![SERVICE],
        ..Service::default()
    };
    peripheral.handle.add_service(dependent).await.unwrap();
    assert_eq!(peripheral.handle.services().await.unwrap().len(), 2);
}

#[tokio::test]
async fn remove_service_warns_about_inclusion_but_proceeds() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();
    peripheral
        .handle
        .add_service(Service {
            uuid: OTHER_SERVICE,
            included_services: vec![SERVICE],
            ..Service::default()
        })
        .await
        .unwrap();

    let result = peripheral.handle.remove_service(SERVICE).await;
    assert!(matches!(result, Err(Error::RemoveService(_))));

    // removed and forwarded regardless of the conflict
    let services = peripheral.handle.services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].uuid, OTHER_SERVICE);
    assert!(
        peripheral
            .radio
            .calls()
            .contains(&PeripheralCall::RemoveService(SERVICE))
    );
}

#[tokio::test]
async fn remove_service_without_conflict_succeeds() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();
    peripheral.handle.remove_service(SERVICE).await.unwrap();
    assert!(peripheral.handle.services().await.unwrap().is_empty());
}

#[tokio::test]
async fn advertising_requires_published_services() {
    let peripheral = spawn_peripheral(true);
    assert_eq!(
        peripheral.handle.start_advertising().await,
        Err(Error::StartAdvertising("no added services".into()))
    );
}

#[tokio::test]
async fn advertising_guard_trips_while_radio_reports_powered() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();

    assert_eq!(
        peripheral.handle.start_advertising().await,
        Err(Error::BluetoothNotAvailable)
    );
    assert!(
        peripheral
            .radio
            .calls()
            .contains(&PeripheralCall::StopAdvertising)
    );
    assert!(!peripheral.handle.is_advertising().await.unwrap());
}

#[tokio::test]
async fn advertising_proceeds_when_radio_reports_not_ready() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();

    peripheral.radio.set_powered(false);
    peripheral.handle.start_advertising().await.unwrap();
    assert!(
        peripheral
            .radio
            .calls()
            .contains(&PeripheralCall::StartAdvertising(vec![SERVICE]))
    );
    assert!(peripheral.handle.is_advertising().await.unwrap());

    peripheral.handle.stop_advertising().await.unwrap();
    assert!(!peripheral.handle.is_advertising().await.unwrap());
}

#[tokio::test]
async fn update_value_is_bounded_by_min_subscriber_mtu() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();
    let roomy = subscribe(&peripheral, 0xA1, 10).await;
    let tight = subscribe(&peripheral, 0xA2, 4).await;

    assert_eq!(
        peripheral
            .handle
            .update_value(PATH, b"123456".to_vec(), Some(vec![roomy, tight]))
            .await,
        Err(Error::UpdateValue("value is too long".into()))
    );
    assert!(peripheral.handle.outbound_values(PATH).await.unwrap().is_empty());
    assert!(
        !peripheral
            .radio
            .calls()
            .iter()
            .any(|c| matches!(c, PeripheralCall::UpdateValue(..)))
    );

    peripheral
        .handle
        .update_value(PATH, b"123456".to_vec(), Some(vec![roomy]))
        .await
        .unwrap();
    assert_eq!(
        peripheral.handle.outbound_values(PATH).await.unwrap(),
        vec![b"123456".to_vec()]
    );
}

#[tokio::test]
async fn update_value_unscoped_uses_default_bound() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();

    assert_eq!(
        peripheral.handle.update_value(PATH, vec![0; 513], None).await,
        Err(Error::UpdateValue("value is too long".into()))
    );
    peripheral.handle.update_value(PATH, vec![0; 512], None).await.unwrap();
}

#[tokio::test]
async fn update_value_requires_published_characteristic() {
    let peripheral = spawn_peripheral(true);
    assert_eq!(
        peripheral.handle.update_value(PATH, b"x".to_vec(), None).await,
        Err(Error::UpdateValue("characteristic is not published".into()))
    );
}

#[tokio::test]
async fn refused_update_keeps_history_untouched() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();
    peripheral.radio.set_accept_updates(false);

    assert_eq!(
        peripheral.handle.update_value(PATH, b"x".to_vec(), None).await,
        Err(Error::UpdateValue("failed to update value".into()))
    );
    assert!(peripheral.handle.outbound_values(PATH).await.unwrap().is_empty());
}

#[tokio::test]
async fn resubscribing_never_duplicates_a_subscriber() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();

    let id = subscribe(&peripheral, 0xA1, 10).await;
    subscribe(&peripheral, 0xA1, 20).await;

    assert!(
        eventually(|| async {
            let subscribers = peripheral.handle.subscribers(PATH).await.unwrap();
            subscribers.len() == 1 && subscribers[0].max_update_len == 20
        })
        .await
    );

    peripheral
        .events
        .send(PeripheralEvent::Unsubscribed {
            subscriber: id,
            characteristic: PATH,
        })
        .await
        .unwrap();
    assert!(
        eventually(|| async {
            peripheral.handle.subscribers(PATH).await.unwrap().is_empty()
        })
        .await
    );
}

#[tokio::test]
async fn read_request_answers_with_cached_value() {
    let peripheral = spawn_peripheral(true);
    peripheral
        .handle
        .add_service(read_only_service(b"hello"))
        .await
        .unwrap();

    peripheral
        .events
        .send(PeripheralEvent::ReadRequested {
            request: ReadRequest {
                id: RequestId(7),
                characteristic: PATH,
                offset: 0,
            },
        })
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            peripheral.radio.calls().contains(&PeripheralCall::RespondToRead(
                RequestId(7),
                Some(b"hello".to_vec()),
                RequestResponse::Success,
            ))
        })
        .await
    );
}

#[tokio::test]
async fn read_request_prefers_newest_outbound_value() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();
    peripheral.handle.update_value(PATH, b"old".to_vec(), None).await.unwrap();
    peripheral.handle.update_value(PATH, b"new".to_vec(), None).await.unwrap();

    peripheral
        .events
        .send(PeripheralEvent::ReadRequested {
            request: ReadRequest {
                id: RequestId(8),
                characteristic: PATH,
                offset: 0,
            },
        })
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            peripheral.radio.calls().contains(&PeripheralCall::RespondToRead(
                RequestId(8),
                Some(b"new".to_vec()),
                RequestResponse::Success,
            ))
        })
        .await
    );
}

#[tokio::test]
async fn write_batch_concatenates_fragments_and_updates_first_characteristic() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(writable_service()).await.unwrap();

    peripheral
        .events
        .send(PeripheralEvent::WriteRequested {
            requests: vec![
                WriteRequest {
                    id: RequestId(1),
                    characteristic: PATH,
                    value: b"hello".to_vec(),
                    offset: 0,
                },
                WriteRequest {
                    id: RequestId(2),
                    characteristic: PATH,
                    value: b"helloworld".to_vec(),
                    offset: 5,
                },
            ],
        })
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            peripheral.radio.calls().contains(&PeripheralCall::RespondToWrite(
                RequestId(1),
                RequestResponse::Success,
            ))
        })
        .await
    );
    assert!(
        peripheral
            .radio
            .calls()
            .contains(&PeripheralCall::UpdateValue(PATH, b"helloworld".to_vec(), None))
    );
    assert_eq!(
        peripheral.handle.outbound_values(PATH).await.unwrap()[0],
        b"helloworld".to_vec()
    );
}

#[tokio::test]
async fn rejected_write_batch_replies_access_denied() {
    let peripheral = spawn_peripheral(true);
    // nothing published: the update path refuses the write
    peripheral
        .events
        .send(PeripheralEvent::WriteRequested {
            requests: vec![WriteRequest {
                id: RequestId(9),
                characteristic: PATH,
                value: b"data".to_vec(),
                offset: 0,
            }],
        })
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            peripheral.radio.calls().contains(&PeripheralCall::RespondToWrite(
                RequestId(9),
                RequestResponse::WriteNotPermitted,
            ))
        })
        .await
    );
    assert_eq!(
        peripheral.handle.last_error().await.unwrap(),
        Some(Error::UpdateValue("characteristic is not published".into()))
    );
}

#[tokio::test]
async fn restore_state_replaces_services_and_subscribers() {
    let peripheral = spawn_peripheral(true);
    peripheral.handle.add_service(read_only_service(b"stale")).await.unwrap();

    let restored_subscriber = Subscriber {
        id: SubscriberId(Uuid::from_u128(0xB1)),
        max_update_len: 64,
    };
    peripheral
        .events
        .send(PeripheralEvent::RestoreState {
            services: vec![writable_service()],
            subscribers: vec![(PATH, vec![restored_subscriber.clone()])],
        })
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            peripheral.handle.subscribers(PATH).await.unwrap() == vec![restored_subscriber.clone()]
        })
        .await
    );
    let services = peripheral.handle.services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert!(services[0].characteristics[0].value.is_none());
}

#[tokio::test]
async fn errors_clear_after_the_configured_delay() {
    let peripheral = spawn_with_config(
        false,
        PeripheralConfig {
            error_clear_delay: Duration::from_millis(40),
        },
    );
    assert_eq!(
        peripheral.handle.add_service(writable_service()).await,
        Err(Error::BluetoothNotAvailable)
    );
    assert_eq!(
        peripheral.handle.last_error().await.unwrap(),
        Some(Error::BluetoothNotAvailable)
    );
    assert!(
        eventually(|| async { peripheral.handle.last_error().await.unwrap().is_none() }).await
    );
}
