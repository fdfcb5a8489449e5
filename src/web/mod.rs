//! JSON HTTP surface
//!
//! Accounts, alias management, live inbox views and the notification
//! poll. Inbox views open their own mailbox connection per request.

mod handlers;
pub mod session;

use crate::config::{AppConfig, ImapConfig};
use crate::error::{Error, Result};
use crate::receiver;
use crate::store::Store;
use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use session::SessionStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub imap: Arc<ImapConfig>,
    pub alias_domain: Arc<str>,
    pub sessions: SessionStore,
}

impl AppState {
    #[must_use]
    pub fn new(store: Store, config: &AppConfig) -> Self {
        Self {
            store,
            imap: Arc::new(config.imap.clone()),
            alias_domain: Arc::from(config.alias_domain.as_str()),
            sessions: SessionStore::default(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route(
            "/aliases",
            get(handlers::list_aliases).post(handlers::create_alias),
        )
        .route("/aliases/:id", delete(handlers::delete_alias))
        .route("/aliases/:id/inbox", get(handlers::inbox))
        .route("/notifications", get(handlers::notifications))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `config.bind_addr` until `shutdown` fires. Also
/// runs the background receiver when an interval is configured.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server
/// fails.
pub async fn serve(config: &AppConfig, store: Store, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    let receiver = config.receive_interval.map(|interval| {
        info!("Background receiver every {:?}", interval);
        receiver::spawn_periodic(
            store.clone(),
            config.imap.clone(),
            interval,
            shutdown.child_token(),
        )
    });

    let app = router(AppState::new(store, config));
    let stop = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await;

    // The receiver stops with the server, whether or not it failed.
    shutdown.cancel();
    if let Some(handle) = receiver {
        handle.await.ok();
    }
    served?;
    info!("Server stopped");
    Ok(())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {}", self);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
            }
        };
        (status, self.to_string()).into_response()
    }
}
