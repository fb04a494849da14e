//! Invitation endpoints
//!
//! Two ways into a circle: shareable invite links (tokens) that anyone
//! can redeem, and direct invitations addressed to a registered user,
//! which the invitee accepts or rejects.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::{CircleResponse, InvitationResponse, InviteInspectResponse};
use crate::auth::CurrentUser;
use crate::data::{
    Circle, EntityId, Invitation, InvitationStatus, InviteToken, NotificationKind,
};
use crate::error::AppError;
use crate::events;
use crate::service::MembershipService;

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    /// Omit for a link that never expires.
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InviteUserRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
}

async fn load_circle(state: &AppState, circle_id: &str) -> Result<Circle, AppError> {
    state
        .db
        .get_circle(circle_id)
        .await?
        .ok_or(AppError::NotFound)
}

fn check_not_lapsed(token: &InviteToken) -> Result<(), AppError> {
    if let Some(expires_at) = token.expires_at {
        if expires_at < Utc::now() {
            return Err(AppError::Expired(
                "This invite link has expired".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /api/circles/:id/invites (members only)
pub async fn create_invite_token(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(circle_id): Path<String>,
    Json(req): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<InviteToken>), AppError> {
    let circle = load_circle(&state, &circle_id).await?;

    let membership = MembershipService::new(state.db.clone());
    membership
        .authorize(&circle, &session.user_id, &session.username)
        .await?;

    let expires_at = match req.expires_in_hours {
        Some(hours) if hours <= 0 => {
            return Err(AppError::Validation(
                "expires_in_hours must be positive".to_string(),
            ));
        }
        Some(hours) => Some(Utc::now() + Duration::hours(hours)),
        None => None,
    };

    let token = InviteToken {
        token: EntityId::new().0,
        circle_id: circle.id.clone(),
        created_by: session.user_id.clone(),
        created_at: Utc::now(),
        expires_at,
    };
    state.db.insert_invite_token(&token).await?;

    Ok((StatusCode::CREATED, Json(token)))
}

/// GET /api/invites/:token
///
/// Public lookup so an invite link can show what it leads to before the
/// visitor signs in.
pub async fn inspect_invite_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<InviteInspectResponse>, AppError> {
    let invite = state
        .db
        .get_invite_token(&token)
        .await?
        .ok_or(AppError::NotFound)?;
    check_not_lapsed(&invite)?;

    let circle = load_circle(&state, &invite.circle_id).await?;
    let member_count = state.db.count_members(&circle.id).await?;

    Ok(Json(InviteInspectResponse {
        circle_id: circle.id,
        circle_name: circle.name,
        description: circle.description,
        is_public: circle.is_public,
        member_count,
        expires_at: invite.expires_at,
    }))
}

/// POST /api/invites/:token/join
///
/// Redeeming when already a member is a no-op success.
pub async fn redeem_invite_token(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<CircleResponse>, AppError> {
    let invite = state
        .db
        .get_invite_token(&token)
        .await?
        .ok_or(AppError::NotFound)?;
    check_not_lapsed(&invite)?;

    let circle = load_circle(&state, &invite.circle_id).await?;
    let membership = MembershipService::new(state.db.clone());
    let joined = membership
        .join(
            &circle,
            &session.user_id,
            &session.username,
            Some(invite.created_by.clone()),
        )
        .await?;
    if joined {
        tracing::info!(circle_id = %circle.id, user_id = %session.user_id, "Invite redeemed");
    }

    let member_count = state.db.count_members(&circle.id).await?;
    let user_role = membership
        .get_member(&circle.id, &session.user_id)
        .await?
        .map(|member| member.role);

    Ok(Json(CircleResponse::new(&circle, member_count, user_role)))
}

/// POST /api/circles/:id/invitations (members only)
pub async fn invite_user(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(circle_id): Path<String>,
    Json(req): Json<InviteUserRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), AppError> {
    let circle = load_circle(&state, &circle_id).await?;

    let membership = MembershipService::new(state.db.clone());
    membership
        .authorize(&circle, &session.user_id, &session.username)
        .await?;

    let invitee = state
        .db
        .get_user_by_username(&req.username)
        .await?
        .ok_or(AppError::NotFound)?;

    let already_member = invitee.id == circle.owner_id
        || membership.get_member(&circle.id, &invitee.id).await?.is_some();
    if already_member {
        return Err(AppError::Conflict(
            "User is already a member of this circle".to_string(),
        ));
    }

    let invitation = Invitation {
        id: EntityId::new().0,
        circle_id: circle.id.clone(),
        inviter_id: session.user_id.clone(),
        inviter_username: session.username.clone(),
        invitee_id: invitee.id.clone(),
        status: InvitationStatus::Pending.as_str().to_string(),
        created_at: Utc::now(),
    };
    let inserted = state.db.insert_invitation_if_absent(&invitation).await?;
    if !inserted {
        return Err(AppError::Conflict(
            "User already has a pending invitation to this circle".to_string(),
        ));
    }

    events::spawn_store(
        state.db.clone(),
        state.config.events.delivery_timeout_seconds,
        NotificationKind::CircleInvitation,
        events::circle_invitation_notification(
            &invitee.id,
            &circle,
            &session.username,
            &invitation.id,
        ),
    );

    Ok((
        StatusCode::CREATED,
        Json(InvitationResponse::new(&invitation, circle.name.clone())),
    ))
}

/// GET /api/invitations
///
/// The caller's pending invitations, newest first.
pub async fn list_my_invitations(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<InvitationResponse>>, AppError> {
    let invitations = state.db.list_pending_invitations(&session.user_id).await?;

    let mut responses = Vec::with_capacity(invitations.len());
    for invitation in invitations {
        // A circle deleted mid-listing takes its invitations with it
        let Some(circle) = state.db.get_circle(&invitation.circle_id).await? else {
            continue;
        };
        responses.push(InvitationResponse::new(&invitation, circle.name));
    }

    Ok(Json(responses))
}

/// POST /api/invitations/:id/respond (invitee only)
///
/// First answer wins; any later answer gets a conflict.
pub async fn respond_to_invitation(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(invitation_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<InvitationResponse>, AppError> {
    let mut invitation = state
        .db
        .get_invitation(&invitation_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if invitation.invitee_id != session.user_id {
        return Err(AppError::Forbidden);
    }

    let circle = load_circle(&state, &invitation.circle_id).await?;

    let new_status = if req.accept {
        InvitationStatus::Accepted
    } else {
        InvitationStatus::Rejected
    };
    let updated = state
        .db
        .set_invitation_status(
            &invitation.id,
            InvitationStatus::Pending.as_str(),
            new_status.as_str(),
        )
        .await?;
    if !updated {
        return Err(AppError::Conflict(
            "Invitation has already been answered".to_string(),
        ));
    }
    invitation.status = new_status.as_str().to_string();

    if req.accept {
        let membership = MembershipService::new(state.db.clone());
        membership
            .join(
                &circle,
                &session.user_id,
                &session.username,
                Some(invitation.inviter_id.clone()),
            )
            .await?;

        events::spawn_store(
            state.db.clone(),
            state.config.events.delivery_timeout_seconds,
            NotificationKind::InvitationAccepted,
            events::invitation_accepted_notification(
                &invitation.inviter_id,
                &circle,
                &session.username,
            ),
        );
    }

    Ok(Json(InvitationResponse::new(&invitation, circle.name)))
}
