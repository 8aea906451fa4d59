use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::AppState;

mod error;
mod handlers;
mod routes;

pub use error::AppError;

/// Base64 inflates the largest accepted image by a third.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::mural())
        .merge(routes::identity())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
