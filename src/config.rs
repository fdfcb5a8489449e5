//! Application configuration
//!
//! Everything is read from the environment (and a `.env` file when
//! present). The IMAP side points at the single catch-all mailbox that
//! receives mail for every alias on the domain.

use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

/// Connection settings for the shared catch-all mailbox
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    /// Skip certificate verification (self-signed or local servers).
    pub accept_invalid_certs: bool,
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `imap.gmail.com`)
    /// - `IMAP_PORT` (default: `993`)
    /// - `IMAP_FOLDER` (default: `INBOX`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            host: lookup("IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".to_string()),
            port: lookup("IMAP_PORT")
                .unwrap_or_else(|| "993".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            username: lookup("IMAP_USERNAME")
                .ok_or_else(|| Error::Config("IMAP_USERNAME not set".into()))?,
            password: lookup("IMAP_PASSWORD")
                .ok_or_else(|| Error::Config("IMAP_PASSWORD not set".into()))?,
            folder: lookup("IMAP_FOLDER").unwrap_or_else(|| "INBOX".to_string()),
            accept_invalid_certs: lookup("IMAP_ACCEPT_INVALID_CERTS")
                .map(|v| parse_flag("IMAP_ACCEPT_INVALID_CERTS", &v))
                .transpose()?
                .unwrap_or(false),
        })
    }
}

/// Full application configuration: mailbox, database, domain and
/// HTTP listener.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub imap: ImapConfig,
    pub database_url: String,
    /// Catch-all domain that generated aliases live on.
    pub alias_domain: String,
    pub bind_addr: String,
    /// Interval of the background receiver; `None` disables it.
    pub receive_interval: Option<Duration>,
}

impl AppConfig {
    /// Load the application configuration from environment variables
    ///
    /// On top of the IMAP variables read by [`ImapConfig::from_env`]:
    /// - `ALIAS_DOMAIN` (required)
    /// - `DATABASE_URL` (default: `sqlite://tempmail.db`)
    /// - `BIND_ADDR` (default: `127.0.0.1:8080`)
    /// - `RECEIVE_INTERVAL_SECS` (default: `0`, disabled)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let alias_domain = lookup("ALIAS_DOMAIN")
            .map(|d| d.trim().trim_start_matches('@').to_lowercase())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::Config("ALIAS_DOMAIN not set".into()))?;

        let receive_secs: u64 = lookup("RECEIVE_INTERVAL_SECS")
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RECEIVE_INTERVAL_SECS: {e}")))?;

        Ok(Self {
            imap: ImapConfig::from_lookup(&lookup)?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://tempmail.db".to_string()),
            alias_domain,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            receive_interval: (receive_secs > 0).then(|| Duration::from_secs(receive_secs)),
        })
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("Invalid {name}: {other}"))),
    }
}
