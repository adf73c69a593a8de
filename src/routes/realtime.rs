use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    auth::{self, AuthenticatedUser},
    error::AppError,
    realtime::socket,
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    token: Option<String>,
}

/// Identity is settled before the upgrade: a bad credential never gets a socket.
pub async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Option<Query<HandshakeQuery>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query.and_then(|Query(query)| query.token);
    let user = match authenticate_handshake(&state, &headers, token).await {
        Ok(user) => user,
        Err(err) => {
            debug!(error = %err, "realtime handshake refused");
            return err.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    info!(user_id = %user.id, "realtime handshake accepted");
    let service = state.trips.clone();
    ws.on_upgrade(move |socket| socket::run(socket, user, service))
}

async fn authenticate_handshake(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<String>,
) -> Result<AuthenticatedUser, AppError> {
    let token = query_token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| auth::session_token(headers, &state.cookie_key))
        .ok_or(AppError::Unauthorized)?;
    auth::authenticate_token(&state.db, &token).await
}
