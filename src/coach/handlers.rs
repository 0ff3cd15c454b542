use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument};

use super::persona::{generate_coach, CoachProfile};
use crate::app::optional_json;
use crate::auth::jwt::AuthUser;
use crate::profile::dto::RegenerateCoachRequest;
use crate::profile::repo as profile_repo;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/coach", get(get_coach))
        .route("/coach/regenerate", post(regenerate_coach))
}

#[instrument(skip(state))]
pub async fn get_coach(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CoachProfile>, (StatusCode, String)> {
    let profile = profile_repo::get(&state.db, user_id)
        .await
        .map_err(internal)?;
    Ok(Json(profile.map(|p| p.active_coach()).unwrap_or_default()))
}

#[instrument(skip(state, body))]
pub async fn regenerate_coach(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> Result<Json<CoachProfile>, (StatusCode, String)> {
    let req: RegenerateCoachRequest = optional_json(&body)?;
    let mut profile = profile_repo::get(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::CONFLICT, "complete your profile first".to_string()))?;

    let coach = generate_coach(state.llm.as_ref(), req.style_hint.as_deref()).await;
    profile.coach = Some(coach.clone());
    profile_repo::upsert(&state.db, user_id, &profile)
        .await
        .map_err(internal)?;
    info!(%user_id, coach = %coach.name, "coach regenerated");
    Ok(Json(coach))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn regenerate_rejects_malformed_body() {
        let res = regenerate_coach(
            State(AppState::fake()),
            AuthUser(Uuid::new_v4()),
            Bytes::from_static(br#"{"style_hint": 7}"#),
        )
        .await;
        let (status, _) = res.err().unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
