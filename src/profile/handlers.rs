use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{error, info, instrument};

use super::dto::{ProfileRequest, UserProfile};
use super::repo;
use crate::auth::jwt::AuthUser;
use crate::coach::generate_coach;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(put_profile))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    repo::get(&state.db, user_id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".into()))
}

#[instrument(skip(state, body))]
pub async fn put_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ProfileRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    body.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let existing = repo::get(&state.db, user_id).await.map_err(internal)?;
    let mut coach = existing.and_then(|p| p.coach);
    if coach.is_none() && body.onboarding_complete {
        coach = Some(generate_coach(state.llm.as_ref(), body.coach_style.as_deref()).await);
    }

    let profile = UserProfile::from_request(&body, coach);
    repo::upsert(&state.db, user_id, &profile)
        .await
        .map_err(internal)?;
    info!(%user_id, target_calories = profile.target_calories, "profile saved");
    Ok(Json(profile))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}
