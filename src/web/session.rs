//! Server-side login sessions keyed by an opaque cookie

use super::AppState;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const SESSION_COOKIE: &str = "tempmail_session";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Idle lifetime of a session.
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub csrf_token: String,
    pub expires_at: Instant,
}

/// Shared map from cookie token to session.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    /// Start a session for `user_id`; returns the cookie token and the
    /// session.
    pub async fn create(&self, user_id: i64) -> (String, Session) {
        let token = random_token();
        let session = Session {
            user_id,
            csrf_token: random_token(),
            expires_at: Instant::now() + SESSION_TTL,
        };

        let mut sessions = self.inner.write().await;
        let now = Instant::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(token.clone(), session.clone());
        (token, session)
    }

    /// Look up a live session and push its expiry back.
    pub async fn get(&self, token: &str) -> Option<Session> {
        let mut sessions = self.inner.write().await;
        let now = Instant::now();
        match sessions.get_mut(token) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + SESSION_TTL;
                Some(session.clone())
            }
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub async fn remove(&self, token: &str) {
        self.inner.write().await.remove(token);
    }
}

/// 32 random bytes, hex encoded.
#[must_use]
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Value of the session cookie, if the request carries one.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        cookie
            .trim()
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    })
}

#[must_use]
pub fn session_cookie(token: &str) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        SESSION_TTL.as_secs()
    )
}

#[must_use]
pub fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

/// The logged-in session of the current request. Requests without one
/// are redirected to `/login`.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl CurrentSession {
    /// Reject state-changing requests whose `x-csrf-token` header does
    /// not match the session.
    ///
    /// # Errors
    ///
    /// Returns a 403 response on a missing or wrong token.
    pub fn check_csrf(&self, headers: &HeaderMap) -> Result<(), Response> {
        let sent = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !sent.is_empty() && sent == self.0.csrf_token {
            Ok(())
        } else {
            Err((StatusCode::FORBIDDEN, "Invalid request").into_response())
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or_else(|| Redirect::to("/login"))?;
        state
            .sessions
            .get(&token)
            .await
            .map(Self)
            .ok_or_else(|| Redirect::to("/login"))
    }
}
