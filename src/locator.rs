//! Finding an alias's messages in the shared mailbox
//!
//! Servers disagree on how `SEARCH TO` treats quoting and partial
//! addresses, so three strategies are tried in order and the first that
//! yields anything wins. The last one scans every message client-side.

use crate::mailbox::MessageSource;
use crate::message::Headers;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// How a set of messages was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// `SEARCH TO "<address>"`
    QuotedRecipient,
    /// `SEARCH TO <address>`
    BareRecipient,
    /// `SEARCH ALL` filtered on the parsed `To` header.
    FullScan,
}

impl Strategy {
    /// The server-side query for this strategy.
    #[must_use]
    pub fn query(self, address: &str) -> String {
        match self {
            Self::QuotedRecipient => format!("TO \"{address}\""),
            Self::BareRecipient => format!("TO {address}"),
            Self::FullScan => "ALL".to_string(),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QuotedRecipient => "quoted recipient search",
            Self::BareRecipient => "bare recipient search",
            Self::FullScan => "full mailbox scan",
        })
    }
}

/// Outcome of [`locate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// Sequence numbers, newest (highest) first. Never empty.
    Found {
        strategy: Strategy,
        sequence: Vec<u32>,
    },
    Missing {
        reason: String,
    },
}

/// Loose recipient comparison: case-insensitive, and either side may
/// be a substring of the other. An empty side never matches.
#[must_use]
pub fn recipient_matches(recipient: &str, target: &str) -> bool {
    let recipient = recipient.trim().to_lowercase();
    let target = target.trim().to_lowercase();
    if recipient.is_empty() || target.is_empty() {
        return false;
    }
    recipient.contains(&target) || target.contains(&recipient)
}

/// Find every message addressed to `address`.
///
/// Search errors count as "nothing found"; the next strategy runs.
pub async fn locate<S: MessageSource>(source: &mut S, address: &str) -> Located {
    let address = address.replace('"', "");

    for strategy in [Strategy::QuotedRecipient, Strategy::BareRecipient] {
        match source.search(&strategy.query(&address)).await {
            Ok(found) if !found.is_empty() => return found_by(strategy, found),
            Ok(_) => debug!("{} found nothing for {}", strategy, address),
            Err(e) => debug!("{} failed for {}: {}", strategy, address, e),
        }
    }

    let all = match source.search(&Strategy::FullScan.query(&address)).await {
        Ok(all) => all,
        Err(e) => {
            return Located::Missing {
                reason: format!("Mailbox search failed: {e}"),
            };
        }
    };

    let matched = scan(source, &all, &address).await;
    if matched.is_empty() {
        return Located::Missing {
            reason: format!(
                "No messages addressed to {address} among {} scanned",
                all.len()
            ),
        };
    }

    found_by(Strategy::FullScan, matched)
}

/// The messages among `sequence` with a `To` recipient that loosely
/// matches `address`. Unreadable headers are skipped.
pub async fn scan<S: MessageSource>(source: &mut S, sequence: &[u32], address: &str) -> Vec<u32> {
    let mut matched = Vec::new();
    for &seq in sequence {
        let Ok(raw) = source.header(seq).await else {
            continue;
        };
        let headers = Headers::parse(&raw);
        if headers.to.iter().any(|to| recipient_matches(to, address)) {
            matched.push(seq);
        }
    }
    matched
}

fn found_by(strategy: Strategy, mut sequence: Vec<u32>) -> Located {
    sequence.sort_unstable_by(|a, b| b.cmp(a));
    sequence.dedup();
    info!("Located {} messages via {}", sequence.len(), strategy);
    Located::Found { strategy, sequence }
}
