//! Per-post chat endpoints
//!
//! Chat rooms hang off individual posts. Reading and writing is scoped
//! to the participant set chosen by the author; other circle members
//! only see that a chat exists.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::ChatParticipantResponse;
use crate::auth::CurrentUser;
use crate::data::{ChatMessage, ChatParticipant, EntityId, Post};
use crate::error::AppError;

const DEFAULT_MESSAGE_LIMIT: usize = 100;
const MAX_MESSAGE_LIMIT: usize = 500;
const MAX_MESSAGE_LENGTH: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct MessageParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceParticipantsRequest {
    pub participant_ids: Vec<String>,
}

/// Posts without chat reject every chat operation the same way.
async fn load_chat_post(state: &AppState, post_id: &str) -> Result<Post, AppError> {
    let post = state
        .db
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !post.is_chat_enabled {
        return Err(AppError::Validation(
            "Chat is not enabled on this post".to_string(),
        ));
    }
    Ok(post)
}

async fn require_participant(
    state: &AppState,
    post_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    if !state.db.is_chat_participant(post_id, user_id).await? {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// GET /api/posts/:id/chat/messages
pub async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
    Query(params): Query<MessageParams>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let post = load_chat_post(&state, &post_id).await?;
    require_participant(&state, &post.id, &session.user_id).await?;

    let limit = params
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .min(MAX_MESSAGE_LIMIT);
    let messages = state.db.list_chat_messages(&post.id, limit).await?;

    Ok(Json(messages))
}

/// POST /api/posts/:id/chat/messages
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), AppError> {
    let post = load_chat_post(&state, &post_id).await?;
    require_participant(&state, &post.id, &session.user_id).await?;

    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::Validation(
            "Message must not be empty".to_string(),
        ));
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(AppError::Validation(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }

    let message = ChatMessage {
        id: EntityId::new().0,
        post_id: post.id.clone(),
        sender_id: session.user_id.clone(),
        sender_username: session.username.clone(),
        content,
        created_at: Utc::now(),
    };
    state.db.insert_chat_message(&message).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/posts/:id/chat/participants
pub async fn get_participants(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Json<Vec<ChatParticipantResponse>>, AppError> {
    let post = load_chat_post(&state, &post_id).await?;
    require_participant(&state, &post.id, &session.user_id).await?;

    let participants = state.db.list_chat_participants(&post.id).await?;
    Ok(Json(
        participants
            .into_iter()
            .map(ChatParticipantResponse::from)
            .collect(),
    ))
}

/// PUT /api/posts/:id/chat/participants (author only)
///
/// Replaces the whole participant set. The author stays in regardless
/// of the submitted list, and everyone else must be a member of the
/// post's circle.
pub async fn replace_participants(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<ReplaceParticipantsRequest>,
) -> Result<Json<Vec<ChatParticipantResponse>>, AppError> {
    let post = load_chat_post(&state, &post_id).await?;
    if post.author_id != session.user_id {
        return Err(AppError::Forbidden);
    }

    let mut participants = vec![ChatParticipant {
        post_id: post.id.clone(),
        user_id: session.user_id.clone(),
        username: session.username.clone(),
    }];
    for user_id in &req.participant_ids {
        if *user_id == session.user_id {
            continue;
        }
        let member = state
            .db
            .get_member(&post.circle_id, user_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Chat participant {} is not a member of the circle",
                    user_id
                ))
            })?;
        if participants.iter().any(|p| p.user_id == member.user_id) {
            continue;
        }
        participants.push(ChatParticipant {
            post_id: post.id.clone(),
            user_id: member.user_id,
            username: member.username,
        });
    }

    state
        .db
        .replace_chat_participants(&post.id, &participants)
        .await?;

    let participants = state.db.list_chat_participants(&post.id).await?;
    Ok(Json(
        participants
            .into_iter()
            .map(ChatParticipantResponse::from)
            .collect(),
    ))
}
