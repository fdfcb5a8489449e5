//! Cursor-based polling for newly received messages

use crate::error::Result;
use crate::store::{Notification, Store};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Most notifications returned by one poll.
pub const POLL_LIMIT: i64 = 10;

/// Poll interval used when none is given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Longest `message` preview handed out by a poll, in characters.
pub const PREVIEW_CHARS: usize = 200;

/// Notifications newer than `last_seen`, oldest first, with message
/// previews shortened to [`PREVIEW_CHARS`].
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn poll(store: &Store, last_seen: i64) -> Result<Vec<Notification>> {
    let mut batch = store.messages_after(last_seen, POLL_LIMIT).await?;
    for notification in &mut batch {
        if notification.message.chars().count() > PREVIEW_CHARS {
            notification.message = notification.message.chars().take(PREVIEW_CHARS).collect();
        }
    }
    Ok(batch)
}

/// Poll every `interval`, forwarding each notification to `sender` and
/// advancing the cursor past it.
///
/// Stops when `cancel` fires or the receiver is dropped. The handle
/// resolves to the last cursor, so a later poller can resume from it.
#[must_use]
pub fn spawn_poller(
    store: Store,
    interval: Duration,
    last_seen: i64,
    cancel: CancellationToken,
    sender: mpsc::Sender<Notification>,
) -> JoinHandle<i64> {
    tokio::spawn(async move {
        let mut cursor = last_seen;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let batch = match poll(&store, cursor).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Notification poll failed: {}", e);
                    continue;
                }
            };

            for notification in batch {
                let id = notification.id;
                if sender.send(notification).await.is_err() {
                    debug!("Notification receiver dropped at cursor {}", cursor);
                    return cursor;
                }
                cursor = id;
            }
        }

        debug!("Notification poller stopped at cursor {}", cursor);
        cursor
    })
}
