//! Circle endpoints: creation, detail, settings, membership management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::{CircleDetailResponse, CircleResponse, MemberResponse};
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::{Circle, EntityId, NotificationKind, Role};
use crate::error::AppError;
use crate::events;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};
use crate::service::MembershipService;

const MAX_NAME_LENGTH: usize = 100;
const MAX_DESCRIPTION_LENGTH: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CreateCircleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Deserialize)]
pub struct UpdateCircleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

fn normalize_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation(
            "Circle name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "Circle name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name)
}

fn normalize_description(raw: &str) -> Result<String, AppError> {
    let description = raw.trim().to_string();
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(AppError::Validation(format!(
            "Circle description must be at most {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    Ok(description)
}

async fn load_circle(state: &AppState, circle_id: &str) -> Result<Circle, AppError> {
    state
        .db
        .get_circle(circle_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// POST /api/circles
///
/// The creator's admin membership is materialized immediately so the
/// circle is usable without a separate join step.
pub async fn create_circle(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<CreateCircleRequest>,
) -> Result<(StatusCode, Json<CircleResponse>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/circles"])
        .start_timer();

    let circle = Circle {
        id: EntityId::new().0,
        name: normalize_name(&req.name)?,
        description: normalize_description(&req.description)?,
        owner_id: session.user_id.clone(),
        is_public: req.is_public,
        created_at: Utc::now(),
    };
    state.db.create_circle(&circle).await?;

    let membership = MembershipService::new(state.db.clone());
    let role = membership
        .authorize(&circle, &session.user_id, &session.username)
        .await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/circles", "201"])
        .inc();

    Ok((
        StatusCode::CREATED,
        Json(CircleResponse::new(
            &circle,
            1,
            Some(role.as_str().to_string()),
        )),
    ))
}

/// GET /api/circles
///
/// Circles the caller belongs to, owned circles included even when the
/// owner's membership row has not been materialized yet.
pub async fn list_my_circles(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<CircleResponse>>, AppError> {
    let circles = state.db.get_circles_for_user(&session.user_id).await?;

    let mut responses = Vec::with_capacity(circles.len());
    for circle in circles {
        let member_count = state.db.count_members(&circle.id).await?;
        let user_role = match state.db.get_member(&circle.id, &session.user_id).await? {
            Some(member) => Some(member.role),
            None if circle.owner_id == session.user_id => Some(Role::Admin.as_str().to_string()),
            None => None,
        };
        responses.push(CircleResponse::new(&circle, member_count, user_role));
    }

    Ok(Json(responses))
}

/// GET /api/circles/:id
///
/// Private circles require membership. The member list is only included
/// for members; everyone else gets the summary with a member count.
pub async fn get_circle(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(circle_id): Path<String>,
) -> Result<Json<CircleDetailResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/api/circles/:id"])
        .start_timer();

    let circle = load_circle(&state, &circle_id).await?;
    let membership = MembershipService::new(state.db.clone());

    let user_role = match &viewer {
        Some(session) if session.user_id == circle.owner_id => Some(
            membership
                .authorize(&circle, &session.user_id, &session.username)
                .await?
                .as_str()
                .to_string(),
        ),
        Some(session) => membership
            .get_member(&circle.id, &session.user_id)
            .await?
            .map(|member| member.role),
        None => None,
    };

    if !circle.is_public && user_role.is_none() {
        return Err(match viewer {
            None => AppError::Unauthorized,
            Some(_) => AppError::Forbidden,
        });
    }

    let members = if user_role.is_some() {
        let members = membership.list_members(&circle.id).await?;
        Some(members.into_iter().map(MemberResponse::from).collect())
    } else {
        None
    };
    let member_count = state.db.count_members(&circle.id).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/circles/:id", "200"])
        .inc();

    Ok(Json(CircleDetailResponse {
        circle: CircleResponse::new(&circle, member_count, user_role),
        members,
    }))
}

/// PATCH /api/circles/:id (admin only)
pub async fn update_circle(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(circle_id): Path<String>,
    Json(req): Json<UpdateCircleRequest>,
) -> Result<Json<CircleResponse>, AppError> {
    let circle = load_circle(&state, &circle_id).await?;

    let membership = MembershipService::new(state.db.clone());
    let role = membership
        .authorize(&circle, &session.user_id, &session.username)
        .await?;
    if role != Role::Admin {
        return Err(AppError::Forbidden);
    }

    let name = match &req.name {
        Some(raw) => normalize_name(raw)?,
        None => circle.name.clone(),
    };
    let description = match &req.description {
        Some(raw) => normalize_description(raw)?,
        None => circle.description.clone(),
    };
    let is_public = req.is_public.unwrap_or(circle.is_public);

    let updated = state
        .db
        .update_circle_details(&circle.id, &name, &description, is_public)
        .await?;
    if !updated {
        return Err(AppError::NotFound);
    }

    let circle = load_circle(&state, &circle_id).await?;
    let member_count = state.db.count_members(&circle.id).await?;
    Ok(Json(CircleResponse::new(
        &circle,
        member_count,
        Some(role.as_str().to_string()),
    )))
}

/// DELETE /api/circles/:id (owner only, removes everything in the circle)
pub async fn delete_circle(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(circle_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let circle = load_circle(&state, &circle_id).await?;
    if circle.owner_id != session.user_id {
        return Err(AppError::Forbidden);
    }

    let deleted = state.db.delete_circle(&circle.id).await?;
    if !deleted {
        return Err(AppError::NotFound);
    }

    tracing::info!(circle_id = %circle.id, "Circle deleted");
    Ok(Json(serde_json::json!({})))
}

/// POST /api/circles/:id/leave
pub async fn leave_circle(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(circle_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let circle = load_circle(&state, &circle_id).await?;

    let membership = MembershipService::new(state.db.clone());
    membership.leave(&circle, &session.user_id).await?;

    Ok(Json(serde_json::json!({})))
}

/// PUT /api/circles/:id/members/:user_id/role
pub async fn set_member_role(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((circle_id, user_id)): Path<(String, String)>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<MemberResponse>, AppError> {
    let new_role = Role::parse(&req.role).ok_or_else(|| {
        AppError::Validation("Role must be one of member, moderator, admin".to_string())
    })?;

    let circle = load_circle(&state, &circle_id).await?;
    let membership = MembershipService::new(state.db.clone());

    let previous = membership
        .get_member(&circle.id, &user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let updated = membership
        .set_role(&circle, &session.user_id, &session.username, &user_id, new_role)
        .await?;

    if previous.role != updated.role {
        events::spawn_store(
            state.db.clone(),
            state.config.events.delivery_timeout_seconds,
            NotificationKind::RoleChanged,
            events::role_changed_notification(&user_id, &circle, &updated.role),
        );
    }

    Ok(Json(MemberResponse::from(updated)))
}

/// DELETE /api/circles/:id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((circle_id, user_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let circle = load_circle(&state, &circle_id).await?;

    let membership = MembershipService::new(state.db.clone());
    membership
        .remove_member(&circle, &session.user_id, &session.username, &user_id)
        .await?;

    events::spawn_store(
        state.db.clone(),
        state.config.events.delivery_timeout_seconds,
        NotificationKind::RemovedFromCircle,
        events::removed_from_circle_notification(&user_id, &circle),
    );

    Ok(Json(serde_json::json!({})))
}
