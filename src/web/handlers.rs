//! Route handlers

use super::AppState;
use super::session::{self, CurrentSession};
use crate::alias;
use crate::error::{Error, Result};
use crate::inbox::{self, InboxView};
use crate::notify;
use crate::store::{Alias, Notification};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserInfo,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct AliasQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub last_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub success: bool,
    pub emails: Vec<Notification>,
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserInfo>)> {
    let username = req.username.trim();
    let email = req.email.trim();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(Error::Invalid("username, email and password are required".into()));
    }
    if !email.contains('@') {
        return Err(Error::Invalid("email address".into()));
    }

    let user = state.store.create_user(username, email, &req.password).await?;
    info!("Registered user {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(UserInfo {
            id: user.id,
            username: user.username,
            email: user.email,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    let user = state
        .store
        .verify_login(req.email.trim(), &req.password)
        .await?;
    let (token, session) = state.sessions.create(user.id).await;
    info!("User {} logged in", user.email);

    let body = LoginResponse {
        user: UserInfo {
            id: user.id,
            username: user.username,
            email: user.email,
        },
        csrf_token: session.csrf_token,
    };
    Ok((
        [(header::SET_COOKIE, session::session_cookie(&token))],
        Json(body),
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session::session_token(&headers) {
        state.sessions.remove(&token).await;
    }
    (
        [(header::SET_COOKIE, session::clear_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}

pub async fn list_aliases(
    _session: CurrentSession,
    State(state): State<AppState>,
    Query(query): Query<AliasQuery>,
) -> Result<Json<Vec<Alias>>> {
    let aliases = state.store.aliases(query.search.as_deref()).await?;
    Ok(Json(aliases))
}

pub async fn create_alias(
    session: CurrentSession,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    if let Err(rejection) = session.check_csrf(&headers) {
        return Ok(rejection);
    }
    let alias = alias::generate(&state.store, &state.alias_domain).await?;
    Ok((StatusCode::CREATED, Json(alias)).into_response())
}

pub async fn delete_alias(
    session: CurrentSession,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response> {
    if let Err(rejection) = session.check_csrf(&headers) {
        return Ok(rejection);
    }
    if state.store.delete_alias(id).await? {
        info!("Deleted alias {}", id);
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(Error::NotFound(format!("Alias {id}")))
    }
}

pub async fn inbox(
    _session: CurrentSession,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<InboxView>> {
    let view = inbox::view(&state.store, &state.imap, id).await?;
    Ok(Json(view))
}

pub async fn notifications(
    session: Option<CurrentSession>,
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> Response {
    if session.is_none() {
        return Json(json!({ "success": false, "error": "Not logged in" })).into_response();
    }

    let last_id = query
        .last_id
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0);

    match notify::poll(&state.store, last_id).await {
        Ok(emails) => Json(NotificationResponse {
            success: true,
            emails,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
