use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn mural() -> Router<AppState> {
    Router::new()
        .route("/mural", get(handlers::get_mural))
        .route("/mural/events", get(handlers::mural_events))
        .route("/mural/posts", post(handlers::submit_post))
        .route(
            "/mural/posts/:id",
            delete(handlers::delete_post).patch(handlers::edit_post),
        )
        .route("/mural/posts/:id/preview", delete(handlers::clear_preview))
        .route("/mural/posts/:id/vote", post(handlers::vote_post))
        .route("/mural/posts/:id/report", post(handlers::report_post))
        .route("/mural/sort", put(handlers::set_sort))
        .route("/mural/page", put(handlers::set_page))
        .route("/mural/reply/:id", post(handlers::start_reply))
        .route("/mural/reply", delete(handlers::cancel_reply))
}

pub fn identity() -> Router<AppState> {
    Router::new()
        .route("/identity", get(handlers::get_identity))
        .route(
            "/session",
            post(handlers::sign_in).delete(handlers::sign_out),
        )
}
