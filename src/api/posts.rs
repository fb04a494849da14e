//! Post endpoints: creation, deletion, ballots, and seen marks

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::PostResponse;
use crate::auth::CurrentUser;
use crate::data::PostContent;
use crate::error::AppError;
use crate::events;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};
use crate::service::{BallotService, IngestService, SeenService, SeenStatus, TallySnapshot};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: PostContent,
    #[serde(default)]
    pub enable_chat: bool,
    /// Members to seed the chat with; the author is always included.
    #[serde(default)]
    pub chat_participant_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option_index: usize,
}

fn ingest_service(state: &AppState) -> IngestService {
    IngestService::new(
        state.db.clone(),
        state.http_client.clone(),
        state.config.enrichment.clone(),
    )
}

/// POST /api/circles/:id/posts
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(circle_id): Path<String>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/circles/:id/posts"])
        .start_timer();

    let post = ingest_service(&state)
        .create(
            &circle_id,
            &session.user_id,
            &session.username,
            req.content,
            req.enable_chat,
            &req.chat_participant_ids,
        )
        .await?;

    // Membership fan-out happens off the request path; a slow or failed
    // store never blocks the author.
    events::spawn_post_fanout(
        state.db.clone(),
        state.config.events.delivery_timeout_seconds,
        post.clone(),
    );

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/circles/:id/posts", "201"])
        .inc();

    Ok((StatusCode::CREATED, Json(PostResponse::from_post(&post)?)))
}

/// DELETE /api/posts/:id (author, moderators, and admins)
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Json<PostResponse>, AppError> {
    let post = ingest_service(&state)
        .delete(&post_id, &session.user_id, &session.username)
        .await?;

    tracing::info!(post_id = %post.id, circle_id = %post.circle_id, "Post deleted");
    Ok(Json(PostResponse::from_post(&post)?))
}

/// POST /api/posts/:id/vote
///
/// Casting again moves the ballot; there is never more than one active
/// vote per member per poll.
pub async fn vote(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<TallySnapshot>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/posts/:id/vote"])
        .start_timer();

    let ballots = BallotService::new(state.db.clone());
    let tally = ballots
        .vote(&post_id, &session.user_id, &session.username, req.option_index)
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/posts/:id/vote", "200"])
        .inc();

    Ok(Json(tally))
}

/// POST /api/posts/:id/seen (idempotent)
pub async fn mark_seen(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let seen = SeenService::new(state.db.clone());
    let seen_by_count = seen
        .mark_seen(&post_id, &session.user_id, &session.username)
        .await?;

    Ok(Json(serde_json::json!({ "seen_by_count": seen_by_count })))
}

/// GET /api/posts/:id/seen
///
/// Who has and has not seen a post; restricted to the author and
/// privileged members.
pub async fn seen_status(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Json<SeenStatus>, AppError> {
    let seen = SeenService::new(state.db.clone());
    let status = seen
        .seen_status(&post_id, &session.user_id, &session.username)
        .await?;

    Ok(Json(status))
}
