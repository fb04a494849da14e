//! Feed endpoints
//!
//! Offset-paginated, newest first. Both feeds go through
//! `FeedService`, which owns visibility rules and per-viewer
//! enrichment, so anonymous and member views of the same circle are
//! shaped by one code path.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::AppError;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};
use crate::service::{FeedPage, FeedService};

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    /// Comma-separated tag filter; a post must carry every tag listed.
    pub tags: Option<String>,
}

impl FeedParams {
    fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    fn limit(&self, state: &AppState) -> i64 {
        self.limit
            .unwrap_or(state.config.feed.default_limit as i64)
            .min(state.config.feed.max_limit as i64)
            .max(1)
    }

    fn tags(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|raw| raw.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// GET /api/circles/:id/posts
///
/// Anonymous viewers can read public circles; private circles require
/// membership.
pub async fn circle_feed(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(circle_id): Path<String>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedPage>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/api/circles/:id/posts"])
        .start_timer();

    let viewer = viewer
        .as_ref()
        .map(|session| (session.user_id.as_str(), session.username.as_str()));

    let feed = FeedService::new(state.db.clone());
    let page = feed
        .circle_feed(
            &circle_id,
            viewer,
            &params.tags(),
            params.skip(),
            params.limit(&state),
        )
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/circles/:id/posts", "200"])
        .inc();

    Ok(Json(page))
}

/// GET /api/feed
///
/// Everything from the caller's circles, merged newest first.
pub async fn home_feed(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedPage>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/api/feed"])
        .start_timer();

    let feed = FeedService::new(state.db.clone());
    let page = feed
        .home_feed(
            &session.user_id,
            &params.tags(),
            params.skip(),
            params.limit(&state),
        )
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/feed", "200"])
        .inc();

    Ok(Json(page))
}
