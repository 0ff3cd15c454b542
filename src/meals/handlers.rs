use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::dto::{DailySummary, DateQuery, MealEdit, MealLog, MealView};
use super::{repo, services};
use crate::auth::jwt::AuthUser;
use crate::images::services::resolve_image_ref;
use crate::profile;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal).put(update_meal).delete(delete_meal))
        .route("/summary", get(daily_summary))
}

async fn to_view(state: &AppState, meal: MealLog) -> MealView {
    let image_url = resolve_image_ref(state, meal.image_ref.as_deref()).await;
    MealView { meal, image_url }
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<Vec<MealView>>, (StatusCode, String)> {
    let day = services::resolve_day(&state, q.date.as_deref())
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let meals = services::meals_on(&state, user_id, day)
        .await
        .map_err(internal)?;
    let mut items = Vec::with_capacity(meals.len());
    for m in meals {
        items.push(to_view(&state, m).await);
    }
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MealView>, (StatusCode, String)> {
    let meal = repo::get(&state.db, user_id, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Meal not found".to_string()))?;
    Ok(Json(to_view(&state, meal).await))
}

#[instrument(skip(state, edit))]
pub async fn update_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(edit): Json<MealEdit>,
) -> Result<Json<MealView>, (StatusCode, String)> {
    let mut meal = repo::get(&state.db, user_id, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Meal not found".to_string()))?;
    edit.apply(&mut meal);
    if !repo::update(&state.db, user_id, &meal).await.map_err(internal)? {
        return Err((StatusCode::NOT_FOUND, "Meal not found".into()));
    }
    info!(%user_id, meal_id = %id, calories = meal.calories, "meal updated");
    Ok(Json(to_view(&state, meal).await))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if repo::delete(&state.db, user_id, id).await.map_err(internal)? {
        info!(%user_id, meal_id = %id, "meal deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Meal not found".into()))
    }
}

#[instrument(skip(state))]
pub async fn daily_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<DailySummary>, (StatusCode, String)> {
    let day = services::resolve_day(&state, q.date.as_deref())
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let profile = profile::repo::get(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::CONFLICT, "complete your profile first".to_string()))?;
    let meals = services::meals_on(&state, user_id, day)
        .await
        .map_err(internal)?;
    Ok(Json(services::summarize(day, profile.target_calories, &meals)))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}
