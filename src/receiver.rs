//! Mailbox ingestion into the notification table
//!
//! Scans the whole folder and records one notification per message
//! addressed to a known alias. Recording is keyed on `Message-ID`, so
//! running it again only adds what is new.

use crate::config::ImapConfig;
use crate::decoder;
use crate::error::Result;
use crate::mailbox::{Mailbox, MessageSource};
use crate::message::Headers;
use crate::store::Store;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counts from one receiver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveReport {
    /// Messages in the folder.
    pub scanned: usize,
    /// Notifications newly recorded.
    pub stored: usize,
}

/// Open the mailbox, ingest it, and close it again.
///
/// # Errors
///
/// Returns an error if the mailbox cannot be opened or searched, or on
/// a database error.
pub async fn receive(store: &Store, config: &ImapConfig) -> Result<ReceiveReport> {
    let mut mailbox = Mailbox::open(config).await?;
    let report = ingest(store, &mut mailbox).await;
    mailbox.close().await;
    report
}

/// Record every message in `source` that is addressed to a known alias.
///
/// # Errors
///
/// Returns an error if `SEARCH ALL` fails or on a database error.
/// Messages whose header cannot be read are skipped.
pub async fn ingest<S: MessageSource>(store: &Store, source: &mut S) -> Result<ReceiveReport> {
    let mut all = source.search("ALL").await?;
    all.sort_unstable_by(|a, b| b.cmp(a));

    let mut report = ReceiveReport {
        scanned: all.len(),
        stored: 0,
    };

    for sequence in all {
        let raw = match source.header(sequence).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping message {}: {}", sequence, e);
                continue;
            }
        };
        let headers = Headers::parse(&raw);

        let mut alias = None;
        for to in &headers.to {
            if let Some(found) = store.alias_by_email(to).await? {
                alias = Some(found);
                break;
            }
        }
        let Some(alias) = alias else {
            debug!("Message {} is for no known alias", sequence);
            continue;
        };

        let message_id = headers
            .message_id
            .clone()
            .unwrap_or_else(|| fingerprint(&raw));
        if store.has_message(&message_id).await? {
            debug!("Message {} already recorded", sequence);
            continue;
        }

        let message = decoder::assemble(source, sequence, &headers).await;

        if store
            .record_message(alias.id, &message.subject, &message.body, &message_id)
            .await?
        {
            info!("Stored \"{}\" for {}", message.subject, alias.email);
            report.stored += 1;
        }
    }

    info!(
        "Receiver scanned {} messages, stored {}",
        report.scanned, report.stored
    );
    Ok(report)
}

fn fingerprint(raw_header: &[u8]) -> String {
    Sha256::digest(raw_header)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Run [`receive`] every `interval` until `cancel` fires. Failed runs
/// are logged and retried on the next tick.
#[must_use]
pub fn spawn_periodic(
    store: Store,
    config: ImapConfig,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = receive(&store, &config).await {
                        warn!("Receiver run failed: {}", e);
                    }
                }
            }
        }
        debug!("Receiver stopped");
    })
}
