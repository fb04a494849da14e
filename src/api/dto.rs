//! Response DTOs for the HTTP API
//!
//! Request bodies live next to the handlers that consume them; the
//! shapes collected here are returned from more than one endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{ChatParticipant, Circle, CircleMember, Invitation, Notification, Post, PostContent};
use crate::error::AppError;

/// A circle together with viewer-relative context.
#[derive(Debug, Serialize)]
pub struct CircleResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub member_count: i64,
    /// The viewer's own role, absent for anonymous viewers and
    /// non-members looking at a public circle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
}

impl CircleResponse {
    pub fn new(circle: &Circle, member_count: i64, user_role: Option<String>) -> Self {
        Self {
            id: circle.id.clone(),
            name: circle.name.clone(),
            description: circle.description.clone(),
            owner_id: circle.owner_id.clone(),
            is_public: circle.is_public,
            created_at: circle.created_at,
            member_count,
            user_role,
        }
    }
}

/// Circle detail. The member list is only populated for members.
#[derive(Debug, Serialize)]
pub struct CircleDetailResponse {
    #[serde(flatten)]
    pub circle: CircleResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberResponse>>,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: String,
    pub username: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invited_by: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl From<CircleMember> for MemberResponse {
    fn from(member: CircleMember) -> Self {
        Self {
            user_id: member.user_id,
            username: member.username,
            role: member.role,
            invited_by: member.invited_by,
            joined_at: member.joined_at,
        }
    }
}

/// A post with its content parsed back into a typed body.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: String,
    pub circle_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: PostContent,
    pub comment_count: i64,
    pub is_chat_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl PostResponse {
    /// Stored content is serialized JSON; a row that fails to parse
    /// surfaces as an internal error.
    pub fn from_post(post: &Post) -> Result<Self, AppError> {
        let content = PostContent::from_json(&post.content)?;
        Ok(Self {
            id: post.id.clone(),
            circle_id: post.circle_id.clone(),
            author_id: post.author_id.clone(),
            author_username: post.author_username.clone(),
            content,
            comment_count: post.comment_count,
            is_chat_enabled: post.is_chat_enabled,
            created_at: post.created_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ChatParticipantResponse {
    pub user_id: String,
    pub username: String,
}

impl From<ChatParticipant> for ChatParticipantResponse {
    fn from(participant: ChatParticipant) -> Self {
        Self {
            user_id: participant.user_id,
            username: participant.username,
        }
    }
}

/// What an invite link resolves to before joining. The bearer is not
/// yet a member and only sees summary fields.
#[derive(Debug, Serialize)]
pub struct InviteInspectResponse {
    pub circle_id: String,
    pub circle_name: String,
    pub description: String,
    pub is_public: bool,
    pub member_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: String,
    pub circle_id: String,
    pub circle_name: String,
    pub inviter_id: String,
    pub inviter_username: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl InvitationResponse {
    pub fn new(invitation: &Invitation, circle_name: String) -> Self {
        Self {
            id: invitation.id.clone(),
            circle_id: invitation.circle_id.clone(),
            circle_name,
            inviter_id: invitation.inviter_id.clone(),
            inviter_username: invitation.inviter_username.clone(),
            status: invitation.status.clone(),
            created_at: invitation.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        // Payloads are written by us; an unparseable one degrades to null
        // instead of failing the whole listing.
        let payload = serde_json::from_str(&notification.payload).unwrap_or_default();
        Self {
            id: notification.id,
            kind: notification.kind,
            payload,
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}
