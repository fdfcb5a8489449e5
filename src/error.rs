//! Error types for tempmail

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing error: {0}")]
    Password(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Invalid email or password")]
    Unauthorized,

    #[error("No unique alias found after {0} attempts")]
    AliasExhausted(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
