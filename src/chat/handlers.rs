use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, instrument};
use uuid::Uuid;

use super::dto::{HistoryQuery, MessageView, SubmitRequest, SubmitResponse};
use super::services;
use crate::app::optional_json;
use crate::auth::jwt::AuthUser;
use crate::meals::dto::{MealEdit, MealLog};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat/messages", get(list_messages).post(submit_message))
        .route("/chat/messages/:id/confirm", post(confirm_proposal))
        .route("/chat/messages/:id/discard", post(discard_proposal))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub message: MessageView,
    pub meal: MealLog,
}

#[instrument(skip(state, body))]
pub async fn submit_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    services::submit_turn(&state, user_id, body)
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, %user_id, "submit_message failed");
            e.into()
        })
}

#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageView>>, (StatusCode, String)> {
    services::history(&state, user_id, q.limit)
        .await
        .map(Json)
        .map_err(internal)
}

#[instrument(skip(state, body))]
pub async fn confirm_proposal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<ConfirmResponse>), (StatusCode, String)> {
    let edit: MealEdit = optional_json(&body)?;
    let (message, meal) = services::confirm(&state, user_id, id, edit)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, %id, "confirm_proposal failed");
            <(StatusCode, String)>::from(e)
        })?;
    Ok((StatusCode::CREATED, Json(ConfirmResponse { message, meal })))
}

#[instrument(skip(state))]
pub async fn discard_proposal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageView>, (StatusCode, String)> {
    services::discard(&state, user_id, id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, %user_id, %id, "discard_proposal failed");
            e.into()
        })
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}
