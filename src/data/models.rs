//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Users
// =============================================================================

/// A registered user
///
/// Usernames are stored lowercase; the unique index is on the stored form.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 hash, never serialized outward
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Circles and membership
// =============================================================================

/// A circle: a named group with public/private visibility
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Circle {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// One membership row per (circle, user)
///
/// `username` is a snapshot taken at join time and is not updated on rename.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CircleMember {
    pub circle_id: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub invited_by: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// Role within a circle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Moderator or admin
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Moderator | Self::Admin)
    }
}

// =============================================================================
// Posts
// =============================================================================

/// A post within a circle
///
/// `content` holds the serialized tagged variant. Poll ballots and seen
/// marks live in their own tables and are joined in at read time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub circle_id: String,
    pub author_id: String,
    pub author_username: String,
    /// Serialized PostContent (JSON)
    pub content: String,
    /// Adjusted by the external comment subsystem; read-only here
    pub comment_count: i64,
    pub is_chat_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// A single poll ballot: one row per voter per poll
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollVote {
    pub post_id: String,
    pub voter_id: String,
    pub option_index: i64,
    pub voted_at: DateTime<Utc>,
}

/// A seen mark on a post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeenMark {
    pub post_id: String,
    pub user_id: String,
    pub username: String,
    pub seen_at: DateTime<Utc>,
}

/// A chat participant on a chat-enabled post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatParticipant {
    pub post_id: String,
    pub user_id: String,
    pub username: String,
}

/// An append-only chat message
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub post_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Invitations
// =============================================================================

/// A shareable invite token for a circle
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InviteToken {
    pub token: String,
    pub circle_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A direct user-to-user invitation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: String,
    pub circle_id: String,
    pub inviter_id: String,
    pub inviter_username: String,
    pub invitee_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Invitation lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Fan-out notification persisted for a recipient
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    /// Kind: circle_post, circle_invitation, invitation_accepted,
    /// role_changed, removed_from_circle
    pub kind: String,
    /// Kind-specific JSON payload
    pub payload: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    CirclePost,
    CircleInvitation,
    InvitationAccepted,
    RoleChanged,
    RemovedFromCircle,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CirclePost => "circle_post",
            Self::CircleInvitation => "circle_invitation",
            Self::InvitationAccepted => "invitation_accepted",
            Self::RoleChanged => "role_changed",
            Self::RemovedFromCircle => "removed_from_circle",
        }
    }
}
