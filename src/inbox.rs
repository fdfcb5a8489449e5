//! One inbox view: locate an alias's messages, decode them, and cache
//! the newest subject on the alias

use crate::config::ImapConfig;
use crate::decoder;
use crate::error::{Error, Result};
use crate::locator::{self, Located, Strategy};
use crate::mailbox::{Mailbox, MessageSource};
use crate::message::Message;
use crate::store::{Alias, Store};
use serde::Serialize;
use tracing::{info, warn};

const SNIPPET_CHARS: usize = 50;

/// Everything an inbox page shows.
#[derive(Debug, Clone, Serialize)]
pub struct InboxView {
    pub alias: Alias,
    /// Newest first.
    pub messages: Vec<Message>,
    /// How the messages were found, if any were.
    pub strategy: Option<Strategy>,
    /// What the locator did, for display next to the list.
    pub diagnostic: Option<String>,
    /// Set when the mailbox could not be reached.
    pub error: Option<String>,
}

impl InboxView {
    fn unavailable(alias: Alias, error: String) -> Self {
        Self {
            alias,
            messages: Vec::new(),
            strategy: None,
            diagnostic: None,
            error: Some(error),
        }
    }
}

/// First 50 characters of a subject, as cached in `recent_message`.
#[must_use]
pub fn snippet(subject: &str) -> String {
    subject.chars().take(SNIPPET_CHARS).collect()
}

/// Build the inbox view for alias `alias_id` from a fresh mailbox
/// connection.
///
/// A mailbox that cannot be opened is reported in
/// [`InboxView::error`], not as an `Err`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the alias does not exist, or a
/// database error.
pub async fn view(store: &Store, config: &ImapConfig, alias_id: i64) -> Result<InboxView> {
    let alias = store
        .alias(alias_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Alias {alias_id}")))?;

    let mut mailbox = match Mailbox::open(config).await {
        Ok(mailbox) => mailbox,
        Err(e) => {
            warn!("Mailbox unavailable for {}: {}", alias.email, e);
            return Ok(InboxView::unavailable(
                alias,
                format!("Cannot connect to IMAP: {e}"),
            ));
        }
    };

    let result = collect(store, alias, &mut mailbox).await;
    mailbox.close().await;
    result
}

/// The mailbox-independent part of [`view`].
///
/// # Errors
///
/// Returns an error only if updating the alias fails.
pub async fn collect<S: MessageSource>(
    store: &Store,
    alias: Alias,
    source: &mut S,
) -> Result<InboxView> {
    let (strategy, sequence) = match locator::locate(source, &alias.email).await {
        Located::Found { strategy, sequence } => (strategy, sequence),
        Located::Missing { reason } => {
            return Ok(InboxView {
                alias,
                messages: Vec::new(),
                strategy: None,
                diagnostic: Some(reason),
                error: None,
            });
        }
    };

    let mut messages = Vec::with_capacity(sequence.len());
    for seq in sequence {
        messages.push(decoder::read_message(source, seq).await);
    }

    if let Some(newest) = messages.first() {
        store
            .set_recent_message(alias.id, &snippet(&newest.subject))
            .await?;
    }

    info!("{} messages for {}", messages.len(), alias.email);
    Ok(InboxView {
        diagnostic: Some(format!("{strategy}: found {} messages", messages.len())),
        alias,
        messages,
        strategy: Some(strategy),
        error: None,
    })
}
