mod handlers;
mod persona;

use crate::state::AppState;
use axum::Router;

pub use persona::{generate_coach, CoachProfile};

pub fn router() -> Router<AppState> {
    handlers::routes()
}
