//! Disposable email addresses on a catch-all domain
//!
//! Users register, generate throwaway aliases on a domain whose mail
//! all lands in one shared IMAP mailbox, and read each alias's inbox
//! live. An inbox view connects to the mailbox, finds the messages
//! addressed to the alias (see [`locator`]) and extracts a readable
//! body from each (see [`decoder`]).
//!
//! Accounts and aliases live in SQLite ([`Store`]). The [`receiver`]
//! optionally copies incoming messages into a notification table that
//! clients poll through [`notify`]. [`web`] exposes all of it as a
//! JSON API, and [`check`] reports on the mailbox connection itself.

pub mod alias;
pub mod check;
mod config;
mod connection;
pub mod decoder;
mod error;
pub mod inbox;
pub mod locator;
mod mailbox;
mod message;
pub mod notify;
pub mod receiver;
mod store;
pub mod web;

pub use config::{AppConfig, ImapConfig};
pub use error::{Error, Result};
pub use mailbox::{Mailbox, MessageSource};
pub use message::{Headers, Message, Part, Section, Structure, TransferEncoding};
pub use store::{Alias, Notification, Store, User};
