use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{HistoryPage, HistoryRequest, MarkReadRequest, ReadCursor};

use crate::auth::bearer_token;
use crate::websocket::websocket_upgrade;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<u32>,
    limit: Option<u32>,
    /// RFC3339 时间戳，只取严格早于该时刻的消息
    before: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MarkReadPayload {
    last_seen_at: Option<DateTime<Utc>>,
    last_message_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct MarkReadResponse {
    success: bool,
    newly_read: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/{ride_id}/messages", get(get_history))
        .route("/chat/{ride_id}/read", post(mark_read))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ride_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let token = bearer_token(&headers)?;
    state.verify_credential(token).await?;

    let page = state
        .chat_service
        .fetch_history(HistoryRequest {
            ride_id,
            page: query.page,
            limit: query.limit,
            before: query.before,
        })
        .await?;

    Ok(Json(page))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<MarkReadPayload>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let identity = state.verify_credential(token).await?;

    // 两种游标二选一；同时给时以消息ID为准
    let cursor = match (payload.last_message_id, payload.last_seen_at) {
        (Some(id), _) => ReadCursor::LastMessageId(id),
        (None, Some(stamp)) => ReadCursor::LastSeenAt(stamp),
        (None, None) => {
            return Err(ApiError::bad_request(
                "last_seen_at or last_message_id is required",
            ))
        }
    };

    let outcome = state
        .chat_service
        .mark_read(MarkReadRequest {
            ride_id,
            reader: identity.user_id,
            cursor,
        })
        .await?;

    Ok(Json(MarkReadResponse {
        success: true,
        newly_read: outcome.newly_read,
    }))
}
