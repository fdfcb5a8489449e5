//! SQLite persistence for users, aliases and received-message
//! notifications

use crate::error::{Error, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};

/// A registered account.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    #[sqlx(rename = "password")]
    pub password_hash: String,
}

/// A generated temp address.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Alias {
    pub id: i64,
    pub email: String,
    /// Subject snippet of the newest message seen by an inbox view.
    pub recent_message: String,
}

/// A received message recorded for the notification poll.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: i64,
    pub email_id: i64,
    pub to_email: String,
    pub subject: String,
    pub message: String,
    pub received_at: NaiveDateTime,
}

/// Handle to the database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and make sure
    /// the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the file cannot be
    /// opened, or the schema cannot be created.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_db().await?;
        info!("Database ready at {}", url);
        Ok(store)
    }

    /// A private in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every connection to :memory: is its own database; keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS temp_emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                recent_message TEXT NOT NULL DEFAULT ''
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id INTEGER NOT NULL REFERENCES temp_emails(id) ON DELETE CASCADE,
                subject TEXT NOT NULL,
                message TEXT NOT NULL,
                message_id TEXT NOT NULL UNIQUE,
                received_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_email ON messages(email_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // -- users --

    /// Register an account. The password is stored as an Argon2id PHC
    /// string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the email is already registered.
    pub async fn create_user(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let password_hash = hash_password(password)?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO users (username, email, password) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!("User {email}")));
        }

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Check a login attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for an unknown email or a wrong
    /// password, without saying which.
    pub async fn verify_login(&self, email: &str, password: &str) -> Result<User> {
        let user = self.user_by_email(email).await?.ok_or(Error::Unauthorized)?;
        if verify_password(password, &user.password_hash) {
            Ok(user)
        } else {
            Err(Error::Unauthorized)
        }
    }

    // -- aliases --

    /// All aliases whose address contains `search`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn aliases(&self, search: Option<&str>) -> Result<Vec<Alias>> {
        let pattern = format!("%{}%", search.unwrap_or_default().trim());
        let aliases = sqlx::query_as::<_, Alias>(
            "SELECT id, email, recent_message FROM temp_emails WHERE email LIKE ? ORDER BY id DESC",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(aliases)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn alias(&self, id: i64) -> Result<Option<Alias>> {
        let alias = sqlx::query_as::<_, Alias>(
            "SELECT id, email, recent_message FROM temp_emails WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(alias)
    }

    /// Case-insensitive lookup by address.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn alias_by_email(&self, email: &str) -> Result<Option<Alias>> {
        let alias = sqlx::query_as::<_, Alias>(
            "SELECT id, email, recent_message FROM temp_emails WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(alias)
    }

    /// Insert a new alias. Returns `None`, and writes nothing, if the
    /// address is already taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn insert_alias(&self, email: &str) -> Result<Option<Alias>> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO temp_emails (email, recent_message) VALUES (?, '')")
                .bind(email)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            debug!("Alias {} already exists", email);
            return Ok(None);
        }

        Ok(Some(Alias {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            recent_message: String::new(),
        }))
    }

    /// Delete an alias and its recorded notifications. Returns whether
    /// anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn delete_alias(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM temp_emails WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn set_recent_message(&self, id: i64, snippet: &str) -> Result<()> {
        sqlx::query("UPDATE temp_emails SET recent_message = ? WHERE id = ?")
            .bind(snippet)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- notifications --

    /// Whether a message with `message_id` has already been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn has_message(&self, message_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE message_id = ?")
            .bind(message_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Record a received message. Returns `false` if `message_id` was
    /// already recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails, including when `email_id`
    /// names no alias.
    pub async fn record_message(
        &self,
        email_id: i64,
        subject: &str,
        message: &str,
        message_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO messages (email_id, subject, message, message_id) VALUES (?, ?, ?, ?)",
        )
        .bind(email_id)
        .bind(subject)
        .bind(message)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Up to `limit` notifications with an id above `last_id`, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn messages_after(&self, last_id: i64, limit: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r"
            SELECT m.id, m.email_id, t.email AS to_email, m.subject, m.message, m.received_at
            FROM messages m
            JOIN temp_emails t ON t.id = m.email_id
            WHERE m.id > ?
            ORDER BY m.id ASC
            LIMIT ?
            ",
        )
        .bind(last_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Password(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
