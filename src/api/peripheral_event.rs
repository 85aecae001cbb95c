use uuid::Uuid;

use crate::api::service::Service;

/// Asynchronous notifications from the peripheral-role radio stack.
#[derive(Debug, Clone)]
pub enum PeripheralEvent {
    StateChanged {
        is_powered: bool,
    },
    /// System-delivered restoration: the published set is replaced wholesale
    /// and per-characteristic subscriber lists are rebuilt from the
    /// stack-reported state.
    RestoreState {
        services: Vec<Service>,
        subscribers: Vec<(CharacteristicPath, Vec<Subscriber>)>,
    },
    Subscribed {
        subscriber: Subscriber,
        characteristic: CharacteristicPath,
    },
    Unsubscribed {
        subscriber: SubscriberId,
        characteristic: CharacteristicPath,
    },
    ReadRequested {
        request: ReadRequest,
    },
    /// One ATT transaction may arrive as several fragments; they are serviced
    /// as a single batch.
    WriteRequested {
        requests: Vec<WriteRequest>,
    },
    /// The outbound queue drained after a refused update. Acknowledged only;
    /// re-sending is the caller's responsibility.
    ReadyToUpdateSubscribers,
}

/// Path of a locally published characteristic.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CharacteristicPath {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// Identity of a remote central subscribed to a local characteristic.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubscriberId(pub Uuid);

/// A remote central together with its negotiated maximum notification payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub max_update_len: usize,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestId(pub u64);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadRequest {
    pub id: RequestId,
    pub characteristic: CharacteristicPath,
    pub offset: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteRequest {
    pub id: RequestId,
    pub characteristic: CharacteristicPath,
    pub value: Vec<u8>,
    /// Leading bytes of `value` already covered by an earlier fragment.
    pub offset: usize,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReadRequestResponse {
    pub value: Option<Vec<u8>>,
    pub response: RequestResponse,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WriteRequestResponse {
    pub response: RequestResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResponse {
    Success,
    InvalidHandle,
    RequestNotSupported,
    InvalidOffset,
    WriteNotPermitted,
    UnlikelyError,
}
