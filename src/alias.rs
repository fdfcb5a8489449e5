//! Random alias addresses on the catch-all domain

use crate::error::{Error, Result};
use crate::store::{Alias, Store};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Candidates tried before [`generate`] gives up.
pub const MAX_ATTEMPTS: usize = 8;

const LOCAL_PART_LEN: usize = 8;

/// A fresh random address: 8 lowercase hex characters of a SHA-256
/// fingerprint of 32 random bytes, at `domain`.
#[must_use]
pub fn candidate(domain: &str) -> String {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let digest = Sha256::digest(seed);

    let local: String = digest[..LOCAL_PART_LEN / 2]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{local}@{domain}")
}

/// Generate and persist a new unique alias on `domain`.
///
/// # Errors
///
/// Returns [`Error::AliasExhausted`] if every candidate collided, or a
/// database error.
pub async fn generate(store: &Store, domain: &str) -> Result<Alias> {
    generate_with(store, || candidate(domain)).await
}

/// [`generate`] with a caller-supplied candidate source.
///
/// # Errors
///
/// Same as [`generate`].
pub async fn generate_with(store: &Store, mut next: impl FnMut() -> String) -> Result<Alias> {
    for attempt in 1..=MAX_ATTEMPTS {
        let email = next();
        if let Some(alias) = store.insert_alias(&email).await? {
            info!("Generated alias {}", alias.email);
            return Ok(alias);
        }
        warn!("Alias {} taken (attempt {}/{})", email, attempt, MAX_ATTEMPTS);
    }
    Err(Error::AliasExhausted(MAX_ATTEMPTS))
}

/// Whether `address` looks like an alias this crate generates for
/// `domain`.
#[must_use]
pub fn is_valid(address: &str, domain: &str) -> bool {
    let Some((local, host)) = address.rsplit_once('@') else {
        return false;
    };
    local.len() == LOCAL_PART_LEN
        && local.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        && host.eq_ignore_ascii_case(domain)
}
