use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use crate::app::engine::{Notice, ReportOutcome, SubmitRequest};
use crate::app::permissions::SessionUser;
use crate::app::render::RenderedPage;
use crate::domain::post::{Coordinates, SortOrder};
use crate::domain::vote::VoteKind;
use crate::http::AppError;
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    connected: bool,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = match &state.db {
        Some(db) => db.ping().await.is_ok(),
        None => true,
    };
    let redis = match &state.cache {
        Some(cache) => cache.ping().await.is_ok(),
        None => true,
    };
    let connected = state.engine.view().await.connected;
    let status = if db && redis && connected { "ok" } else { "degraded" };

    Json(HealthResponse { status, connected })
}

pub async fn get_mural(State(state): State<AppState>) -> Json<RenderedPage> {
    Json(state.engine.view().await)
}

struct EventFeed {
    view: watch::Receiver<RenderedPage>,
    notices: broadcast::Receiver<Notice>,
    primed: bool,
}

/// Server-sent events: the current page first, then every re-render as
/// `view` and every toast as `notice`.
pub async fn mural_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let feed = EventFeed {
        view: state.engine.watch_view(),
        notices: state.engine.notices(),
        primed: false,
    };

    let stream = futures::stream::unfold(feed, |mut feed| async move {
        if !feed.primed {
            feed.primed = true;
            let page = feed.view.borrow_and_update().clone();
            return Some((Event::default().event("view").json_data(&page), feed));
        }

        loop {
            tokio::select! {
                changed = feed.view.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let page = feed.view.borrow_and_update().clone();
                    return Some((Event::default().event("view").json_data(&page), feed));
                }
                notice = feed.notices.recv() => match notice {
                    Ok(notice) => {
                        return Some((Event::default().event("notice").json_data(&notice), feed));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event stream fell behind on notices");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
pub struct SubmitPostRequest {
    pub message: String,
    pub display_name: Option<String>,
    pub parent_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Raw base64 or a `data:` URL.
    pub image: Option<String>,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, AppError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::bad_request("invalid image encoding"))
}

pub async fn submit_post(
    State(state): State<AppState>,
    Json(payload): Json<SubmitPostRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let display_name = match payload.display_name {
        Some(name) => name,
        None => state.engine.default_display_name().await.unwrap_or_default(),
    };
    let coords = match (payload.latitude, payload.longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };
    let image = payload.image.as_deref().map(decode_image).transpose()?;

    let id = state
        .engine
        .submit(SubmitRequest {
            message: payload.message,
            display_name,
            parent_id: payload.parent_id,
            coords,
            image,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[derive(Deserialize)]
pub struct EditPostRequest {
    pub message: String,
}

pub async fn edit_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EditPostRequest>,
) -> Result<StatusCode, AppError> {
    state.engine.edit(&id, &payload.message).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub confirm: Option<bool>,
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .delete(&id, query.confirm.unwrap_or(false))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.engine.clear_preview(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub kind: VoteKind,
}

#[derive(Serialize)]
pub struct VoteResponse {
    pub active_vote: Option<VoteKind>,
}

pub async fn vote_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let active_vote = state.engine.vote(&id, payload.kind).await?;
    Ok(Json(VoteResponse { active_vote }))
}

#[derive(Serialize)]
pub struct ReportResponse {
    pub outcome: ReportOutcome,
}

pub async fn report_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportResponse>, AppError> {
    let outcome = state.engine.report(&id).await?;
    Ok(Json(ReportResponse { outcome }))
}

#[derive(Deserialize)]
pub struct SortRequest {
    pub sort: SortOrder,
}

pub async fn set_sort(
    State(state): State<AppState>,
    Json(payload): Json<SortRequest>,
) -> Json<RenderedPage> {
    state.engine.set_sort_order(payload.sort).await;
    Json(state.engine.view().await)
}

#[derive(Deserialize)]
pub struct PageRequest {
    pub page: usize,
}

pub async fn set_page(
    State(state): State<AppState>,
    Json(payload): Json<PageRequest>,
) -> Result<Json<RenderedPage>, AppError> {
    state.engine.set_page(payload.page).await?;
    Ok(Json(state.engine.view().await))
}

pub async fn start_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RenderedPage>, AppError> {
    state.engine.start_reply(&id).await?;
    Ok(Json(state.engine.view().await))
}

pub async fn cancel_reply(State(state): State<AppState>) -> Json<RenderedPage> {
    state.engine.cancel_reply().await;
    Json(state.engine.view().await)
}

#[derive(Serialize)]
pub struct IdentityResponse {
    pub author_id: String,
    pub display_name: Option<String>,
    pub signed_in: bool,
    pub is_admin: bool,
}

async fn identity_response(state: &AppState) -> IdentityResponse {
    let viewer = state.engine.viewer().await;
    IdentityResponse {
        author_id: viewer.author_id,
        display_name: state.engine.default_display_name().await,
        signed_in: viewer.session.is_some(),
        is_admin: viewer.is_admin,
    }
}

pub async fn get_identity(State(state): State<AppState>) -> Json<IdentityResponse> {
    Json(identity_response(&state).await)
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub user_id: String,
    pub display_name: String,
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<IdentityResponse>, AppError> {
    let user_id = payload.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::bad_request("user_id is required"));
    }

    state
        .engine
        .sign_in(SessionUser {
            user_id: user_id.to_string(),
            display_name: payload.display_name,
        })
        .await;
    Ok(Json(identity_response(&state).await))
}

pub async fn sign_out(State(state): State<AppState>) -> StatusCode {
    state.engine.sign_out().await;
    StatusCode::NO_CONTENT
}
