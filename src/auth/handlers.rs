use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::dto::{AuthResponse, Credentials, PublicUser, RefreshRequest};
use super::jwt::{AuthUser, JwtKeys, TokenKind};
use super::password::{hash_password, normalize_email, verify_password, MIN_PASSWORD_LEN};
use super::repo::{self, User};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/me", get(get_me))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}

fn unauthorized() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "Invalid credentials".into())
}

fn respond(state: &AppState, user: User) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let tokens = JwtKeys::from_ref(state)
        .issue_pair(user.id)
        .map_err(internal)?;
    Ok(Json(AuthResponse {
        tokens,
        user: PublicUser {
            id: user.id,
            email: user.email,
        },
    }))
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    let email = normalize_email(&body.email)
        .ok_or((StatusCode::BAD_REQUEST, "Invalid email".to_string()))?;
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let hash = hash_password(&body.password).map_err(internal)?;
    let user = repo::create(&state.db, &email, &hash)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            warn!(%email, "email already registered");
            (StatusCode::CONFLICT, "Email already registered".to_string())
        })?;

    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, respond(&state, user)?))
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = normalize_email(&body.email).ok_or_else(unauthorized)?;
    let user = repo::find_by_email(&state.db, &email)
        .await
        .map_err(internal)?
        .ok_or_else(unauthorized)?;

    if !verify_password(&body.password, &user.password_hash).map_err(internal)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(unauthorized());
    }

    info!(user_id = %user.id, "user logged in");
    respond(&state, user)
}

#[instrument(skip(state, body))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let claims = JwtKeys::from_ref(&state)
        .verify(&body.refresh_token, TokenKind::Refresh)
        .map_err(|e| {
            warn!(error = %e, "refresh rejected");
            (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
        })?;
    let user = repo::find_by_id(&state.db, claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    respond(&state, user)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = repo::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    Ok(Json(PublicUser {
        id: user.id,
        email: user.email,
    }))
}
