use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;
use crate::api::peripheral_event::{
    CharacteristicPath, ReadRequestResponse, RequestId, SubscriberId, WriteRequestResponse,
};
use crate::api::service::Service;

/// Command surface of the underlying peripheral-role radio stack.
///
/// As on the central side, commands complete asynchronously through
/// [`PeripheralEvent`](crate::api::peripheral_event::PeripheralEvent)s on the
/// manager's event channel.
#[async_trait]
pub trait PeripheralRadio: Send + Sync {
    async fn is_powered(&self) -> Result<bool>;

    async fn add_service(&self, service: &Service) -> Result<()>;

    async fn remove_service(&self, service: Uuid) -> Result<()>;

    async fn start_advertising(&self, services: &[Uuid]) -> Result<()>;

    async fn stop_advertising(&self) -> Result<()>;

    /// Pushes a value to subscribers, or stores it when the characteristic has
    /// none. `subscribers: None` targets every subscriber of the
    /// characteristic. Returns `false` when the outbound queue is full and the
    /// value was not sent; the stack signals readiness to retry with
    /// [`PeripheralEvent::ReadyToUpdateSubscribers`](crate::api::peripheral_event::PeripheralEvent::ReadyToUpdateSubscribers).
    async fn update_value(
        &self,
        characteristic: CharacteristicPath,
        value: Vec<u8>,
        subscribers: Option<Vec<SubscriberId>>,
    ) -> Result<bool>;

    async fn respond_to_read(
        &self,
        request: RequestId,
        response: ReadRequestResponse,
    ) -> Result<()>;

    async fn respond_to_write(
        &self,
        request: RequestId,
        response: WriteRequestResponse,
    ) -> Result<()>;
}
