//! Notification endpoints

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::NotificationResponse;
use crate::auth::CurrentUser;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    pub limit: Option<usize>,
    pub unread: Option<bool>,
}

/// GET /api/notifications (newest first)
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<NotificationParams>,
) -> Result<Json<Vec<NotificationResponse>>, AppError> {
    let limit = params.limit.unwrap_or(20).min(40);
    let unread_only = params.unread.unwrap_or(false);

    let notifications = state
        .db
        .get_notifications(&session.user_id, limit, unread_only)
        .await?;

    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    ))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(notification_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state
        .db
        .mark_notification_read(&session.user_id, &notification_id)
        .await?;
    if !updated {
        return Err(AppError::NotFound);
    }

    Ok(Json(serde_json::json!({})))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .db
        .mark_all_notifications_read(&session.user_id)
        .await?;

    Ok(Json(serde_json::json!({})))
}
