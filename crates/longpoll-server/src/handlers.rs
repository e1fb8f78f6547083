use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Form, FromRequest, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use longpoll_core::{AccessError, Endpoint, PostBody};
use longpoll_engine::is_loopback;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

/// `?token=...` on both poll and post.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Post body decoded from JSON or a url-encoded form.
///
/// Never rejects: an undecodable body becomes an empty [`PostBody`] and is refused later
/// as a missing type, after origin and token have been checked.
#[derive(Debug, Default)]
pub struct PostPayload(pub PostBody);

#[derive(Deserialize)]
struct FormPost {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<String>,
}

impl From<FormPost> for PostBody {
    fn from(form: FormPost) -> Self {
        Self {
            kind: form.kind,
            data: form
                .data
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl<S> FromRequest<S> for PostPayload
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let body = if is_form {
            Form::<FormPost>::from_request(req, state)
                .await
                .ok()
                .map(|Form(form)| PostBody::from(form))
        } else {
            // `type` must be a JSON string; `{"type": 5}` fails here and is refused as missing.
            Bytes::from_request(req, state)
                .await
                .ok()
                .and_then(|bytes| serde_json::from_slice::<PostBody>(&bytes).ok())
        };
        Ok(Self(body.unwrap_or_default()))
    }
}

/// Turn an access failure into the status and short body clients expect.
pub fn reject(err: &AccessError, endpoint: Endpoint) -> Response {
    let status = StatusCode::from_u16(err.status_for(endpoint)).unwrap_or(StatusCode::FORBIDDEN);
    tracing::warn!(kind = err.error_kind(), status = status.as_u16(), ?endpoint, "request rejected");
    (status, err.message()).into_response()
}

/// GET: long-poll for pending messages.
pub async fn poll_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let session = match state.engine.authorize(addr.ip(), query.token.as_deref()) {
        Ok(session) => session,
        Err(e) => return reject(&e, Endpoint::Poll),
    };
    let batch = state.engine.poll(&session).await;
    Json(batch).into_response()
}

/// POST: liveness ack, connect notice, or application message.
pub async fn post_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<TokenQuery>,
    PostPayload(body): PostPayload,
) -> Response {
    let session = match state.engine.authorize(addr.ip(), query.token.as_deref()) {
        Ok(session) => session,
        Err(e) => return reject(&e, Endpoint::Post),
    };
    match state.engine.post(&session, body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => reject(&e, Endpoint::Post),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionHealth {
    name: String,
    pending: usize,
    held: bool,
    lost: bool,
}

/// Loopback-only status endpoint.
pub async fn health_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    if !is_loopback(addr.ip()) {
        return reject(&AccessError::ForbiddenOrigin, Endpoint::Poll);
    }
    let sessions: Vec<SessionHealth> = state
        .engine
        .registry()
        .iter()
        .map(|s| SessionHealth {
            name: s.name().to_string(),
            pending: s.pending().len(),
            held: s.is_held(),
            lost: s.is_lost(),
        })
        .collect();

    Json(serde_json::json!({
        "status": "healthy",
        "sessions": sessions,
        "stats": state.engine.stats().snapshot(),
    }))
    .into_response()
}
