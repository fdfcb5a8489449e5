//! Mailbox health check
//!
//! Opens the catch-all mailbox the same way an inbox view does, reports
//! what it holds, and shows which recipient search finds a given
//! address. Useful when an inbox stays empty and it is unclear whether
//! the server, the login or the search is at fault.

use crate::config::ImapConfig;
use crate::error::Result;
use crate::locator::{self, Strategy};
use crate::mailbox::{Mailbox, MessageSource};
use crate::message::Headers;
use serde::Serialize;
use tracing::{info, warn};

/// Everything [`check`] found out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub folder: String,
    #[serde(flatten)]
    pub contents: MailboxContents,
}

/// What a selected folder holds, as seen by [`inspect`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MailboxContents {
    /// Messages in the folder.
    pub total: usize,
    pub newest: Option<NewestMessage>,
    pub address: Option<AddressCheck>,
}

/// Header summary of the highest-numbered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewestMessage {
    pub sequence: u32,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
}

/// Every locator strategy run on its own for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressCheck {
    pub address: String,
    pub strategies: Vec<StrategyOutcome>,
    /// The strategy an inbox view would settle on, if any.
    pub matched: Option<Strategy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyOutcome {
    pub strategy: Strategy,
    pub found: usize,
    /// Set when the server rejected the search.
    pub error: Option<String>,
}

/// Open the mailbox, [`inspect`] it, and close it again.
///
/// # Errors
///
/// Returns an error if the connection, login or SELECT fails, or if
/// `SEARCH ALL` is rejected. The mailbox is logged out in every case
/// where it was opened.
pub async fn check(config: &ImapConfig, address: Option<&str>) -> Result<CheckReport> {
    info!(
        "Checking {}:{} as {}",
        config.host, config.port, config.username
    );
    let mut mailbox = Mailbox::open(config).await?;
    info!("Logged in and selected {}", config.folder);

    let contents = inspect(&mut mailbox, address).await;
    mailbox.close().await;

    Ok(CheckReport {
        host: config.host.clone(),
        port: config.port,
        username: config.username.clone(),
        folder: config.folder.clone(),
        contents: contents?,
    })
}

/// Count the messages in `source`, read the newest header, and try
/// each recipient strategy for `address`.
///
/// # Errors
///
/// Returns an error if `SEARCH ALL` fails. A failed recipient search
/// is recorded in the report instead.
pub async fn inspect<S: MessageSource>(
    source: &mut S,
    address: Option<&str>,
) -> Result<MailboxContents> {
    let all = source.search("ALL").await?;
    info!("Folder holds {} messages", all.len());

    let newest = match all.iter().max() {
        Some(&sequence) => newest_message(source, sequence).await,
        None => None,
    };

    let address = match address {
        Some(address) => Some(check_address(source, &all, address).await),
        None => None,
    };

    Ok(MailboxContents {
        total: all.len(),
        newest,
        address,
    })
}

async fn newest_message<S: MessageSource>(source: &mut S, sequence: u32) -> Option<NewestMessage> {
    match source.header(sequence).await {
        Ok(raw) => {
            let headers = Headers::parse(&raw);
            Some(NewestMessage {
                sequence,
                from: headers.from,
                to: headers.to,
                subject: headers.subject,
                date: headers.date,
            })
        }
        Err(e) => {
            warn!("Cannot read header of message {}: {}", sequence, e);
            None
        }
    }
}

async fn check_address<S: MessageSource>(
    source: &mut S,
    all: &[u32],
    address: &str,
) -> AddressCheck {
    let address = address.replace('"', "");
    let mut strategies = Vec::with_capacity(3);

    for strategy in [Strategy::QuotedRecipient, Strategy::BareRecipient] {
        let outcome = match source.search(&strategy.query(&address)).await {
            Ok(found) => StrategyOutcome {
                strategy,
                found: found.len(),
                error: None,
            },
            Err(e) => StrategyOutcome {
                strategy,
                found: 0,
                error: Some(e.to_string()),
            },
        };
        strategies.push(outcome);
    }

    let scanned = locator::scan(source, all, &address).await;
    strategies.push(StrategyOutcome {
        strategy: Strategy::FullScan,
        found: scanned.len(),
        error: None,
    });

    let matched = strategies
        .iter()
        .find(|outcome| outcome.found > 0)
        .map(|outcome| outcome.strategy);
    match matched {
        Some(strategy) => info!("{} is found by the {}", address, strategy),
        None => info!("No strategy finds {}", address),
    }

    AddressCheck {
        address,
        strategies,
        matched,
    }
}
