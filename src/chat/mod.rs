pub mod dto;
pub mod error;
mod handlers;
pub mod history;
pub mod intake;
pub mod pipeline;
mod repo;
pub mod responder;
mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
