//! Scoped access to the catch-all mailbox
//!
//! [`Mailbox`] owns one logged-in session with the folder already
//! selected. It is opened per request and closed with LOGOUT before the
//! request returns. The read operations the locator and decoder need
//! are expressed by [`MessageSource`], so both can run against any
//! source of messages.

use crate::config::ImapConfig;
use crate::connection::{self, ImapSession};
use crate::error::{Error, Result};
use crate::message::{Section, Structure};
use async_imap::imap_proto::types::SectionPath;
use async_imap::types::Fetch;
use futures::TryStreamExt;
use std::future::Future;
use tracing::{debug, warn};

/// Read access to a selected folder, addressed by sequence number.
pub trait MessageSource: Send {
    /// Run an IMAP `SEARCH` and return the matching sequence numbers
    /// in no particular order.
    fn search(&mut self, query: &str) -> impl Future<Output = Result<Vec<u32>>> + Send;

    /// Raw header block of a message.
    fn header(&mut self, sequence: u32) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Top-level MIME structure of a message.
    fn structure(&mut self, sequence: u32) -> impl Future<Output = Result<Structure>> + Send;

    /// Raw, still transfer-encoded bytes of one body section.
    fn section(
        &mut self,
        sequence: u32,
        section: Section,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// A logged-in session on the configured folder.
pub struct Mailbox {
    session: ImapSession,
}

impl Mailbox {
    /// Connect, log in and select `config.folder`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, login or SELECT fails. No
    /// retry is attempted.
    pub async fn open(config: &ImapConfig) -> Result<Self> {
        let mut session = connection::connect(config).await?;

        if let Err(e) = connection::select(&mut session, &config.folder).await {
            session.logout().await.ok();
            return Err(e);
        }

        Ok(Self { session })
    }

    /// Log out and drop the connection.
    pub async fn close(mut self) {
        if let Err(e) = self.session.logout().await {
            warn!("Logout failed: {}", e);
        }
    }

    async fn fetch_one(&mut self, sequence: u32, query: &str) -> Result<Fetch> {
        let fetches: Vec<Fetch> = self
            .session
            .fetch(sequence.to_string(), query)
            .await
            .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;

        fetches
            .into_iter()
            .find(|f| f.message == sequence)
            .ok_or_else(|| Error::Imap(format!("No data returned for message {sequence}")))
    }
}

impl MessageSource for Mailbox {
    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        let found = self
            .session
            .search(query)
            .await
            .map_err(|e| Error::Imap(format!("Search failed: {e}")))?;

        debug!("SEARCH {} matched {} messages", query, found.len());
        Ok(found.into_iter().collect())
    }

    async fn header(&mut self, sequence: u32) -> Result<Vec<u8>> {
        let fetch = self.fetch_one(sequence, "BODY.PEEK[HEADER]").await?;
        fetch
            .header()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::Imap(format!("No header for message {sequence}")))
    }

    async fn structure(&mut self, sequence: u32) -> Result<Structure> {
        let fetch = self.fetch_one(sequence, "BODYSTRUCTURE").await?;
        fetch
            .bodystructure()
            .map(Structure::from)
            .ok_or_else(|| Error::Imap(format!("No structure for message {sequence}")))
    }

    async fn section(&mut self, sequence: u32, section: Section) -> Result<Vec<u8>> {
        let query = format!("BODY.PEEK[{section}]");
        let fetch = self.fetch_one(sequence, &query).await?;

        let bytes = match section {
            Section::Text => fetch.text(),
            Section::Part(n) => fetch.section(&SectionPath::Part(vec![n], None)),
        };

        Ok(bytes.map(<[u8]>::to_vec).unwrap_or_default())
    }
}
