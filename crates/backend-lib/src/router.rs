// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP transport.
//!
//! The osu! client POSTs packet streams to `/` and reads whatever was
//! queued for it from the response. Requests without an `osu-token`
//! header are logins.
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bancho_common::server::{self, PROTOCOL_VERSION};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::login;
use crate::dispatch::process_packets;
use crate::error::AppError;
use crate::sessions::SessionUpdate;
use crate::AppState;

/// Request header carrying the session token.
pub const TOKEN_HEADER: &str = "osu-token";
/// Response header carrying a new session token after login.
pub const CHO_TOKEN_HEADER: &str = "cho-token";
/// Response header announcing the protocol version.
pub const PROTOCOL_HEADER: &str = "cho-protocol";

/// Create the Bancho router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(banner).post(bancho))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn banner() -> &'static str {
    "bancho is running"
}

async fn bancho(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let Some(token) = headers.get(TOKEN_HEADER) else {
        let outcome = login(&state, &body).await.inspect_err(log_failure)?;
        return Ok(packet_response(outcome.body, Some(&outcome.token)));
    };

    let session_id = token.to_str().ok().and_then(|t| Uuid::parse_str(t).ok());
    let session = match session_id {
        Some(id) => state.sessions.fetch_by_id(id).await?,
        None => None,
    };
    let Some(session) = session else {
        debug!("poll with unknown token, asking client to restart");
        let mut out = server::notification("Server has restarted.");
        out.extend(server::restart(0));
        return Ok(packet_response(out, None));
    };

    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                last_seen_at: Some(Utc::now()),
                expires_at: Some(state.sessions.next_expiry()),
                ..SessionUpdate::default()
            },
        )
        .await?;

    process_packets(&state, session.session_id, &body)
        .await
        .inspect_err(log_failure)?;

    let queued = state.outbox.dequeue_all(session.session_id).await?;
    Ok(packet_response(queued.concat(), None))
}

fn log_failure(err: &AppError) {
    match err {
        AppError::Invariant(_) => error!(error = %err, "invariant violated while handling request"),
        _ => warn!(error = %err, code = err.error_code(), "request failed"),
    }
}

fn packet_response(body: Vec<u8>, token: Option<&str>) -> Response {
    let mut response = body.into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(PROTOCOL_HEADER, HeaderValue::from(PROTOCOL_VERSION));
    if let Some(value) = token.and_then(|t| HeaderValue::from_str(t).ok()) {
        headers.insert(CHO_TOKEN_HEADER, value);
    }

    response
}
