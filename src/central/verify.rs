use std::time::Duration;

use tokio::task::JoinHandle;

use crate::Error;
use crate::api::central::CharacteristicRef;
use crate::central::CentralHandle;

/// Application-level confirmation for a write without response.
///
/// The radio gives no delivery guarantee for these writes, so the task
/// re-reads the characteristic once per interval and compares the newest
/// received value against the written payload. It only touches manager state
/// through the handle's read API; the manager keeps the `JoinHandle` and
/// aborts it when the write becomes irrelevant (device disconnected, newer
/// write to the same characteristic).
pub(crate) fn spawn_verification(
    handle: CentralHandle,
    characteristic: CharacteristicRef,
    payload: Vec<u8>,
    interval: Duration,
    attempts: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current = 0;
        while current < attempts && !matches_newest(&handle, characteristic, &payload).await {
            if handle.read_characteristic(characteristic).await.is_err() {
                // manager is gone, nothing left to confirm against
                return;
            }
            tokio::time::sleep(interval).await;
            current += 1;
        }

        if current == attempts && !matches_newest(&handle, characteristic, &payload).await {
            handle
                .report_error(Error::WriteCharacteristic(
                    "write without response may have failed".into(),
                ))
                .await;
        }
    })
}

async fn matches_newest(
    handle: &CentralHandle,
    characteristic: CharacteristicRef,
    payload: &[u8],
) -> bool {
    handle
        .received_values(characteristic)
        .await
        .ok()
        .and_then(|values| values.into_iter().next())
        .is_some_and(|newest| newest == payload)
}
