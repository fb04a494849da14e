//! Post ingestion service
//!
//! Validates, enriches, and stores new posts, and handles post deletion.
//! Chat participant snapshots and poll expiry stamps happen here so every
//! stored post is already in its final shape.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::EnrichmentConfig;
use crate::data::{
    ChatParticipant, Database, EntityId, Post, PostBody, PostContent, normalize_tags,
};
use crate::enrich;
use crate::error::AppError;
use crate::metrics::POSTS_CREATED_TOTAL;
use crate::service::MembershipService;

/// Post ingestion service
pub struct IngestService {
    db: Arc<Database>,
    membership: MembershipService,
    http_client: Arc<reqwest::Client>,
    enrichment: EnrichmentConfig,
}

impl IngestService {
    /// Create new ingestion service
    pub fn new(
        db: Arc<Database>,
        http_client: Arc<reqwest::Client>,
        enrichment: EnrichmentConfig,
    ) -> Self {
        let membership = MembershipService::new(db.clone());
        Self {
            db,
            membership,
            http_client,
            enrichment,
        }
    }

    /// Create a post in a circle.
    ///
    /// The author must be a member. Content is enriched (bare image links
    /// become image posts) and validated, tags are normalized, and polls
    /// get their expiry stamped from `duration_hours`. When chat is
    /// enabled the participant set is the author plus any requested
    /// members, with usernames snapshotted at creation time.
    pub async fn create(
        &self,
        circle_id: &str,
        author_id: &str,
        author_username: &str,
        content: PostContent,
        enable_chat: bool,
        chat_participant_ids: &[String],
    ) -> Result<Post, AppError> {
        let circle = self
            .db
            .get_circle(circle_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.membership
            .authorize(&circle, author_id, author_username)
            .await?;

        let mut content = enrich::reclassify_image_link(&self.http_client, &self.enrichment, content).await;
        content.validate()?;
        content.tags = normalize_tags(&content.tags);

        if let PostBody::Poll {
            duration_hours,
            expires_at,
            ..
        } = &mut content.body
        {
            *expires_at = Some(Utc::now() + Duration::hours(*duration_hours));
        }

        if !enable_chat && !chat_participant_ids.is_empty() {
            return Err(AppError::Validation(
                "Chat participants require chat to be enabled".to_string(),
            ));
        }

        let post_id = EntityId::new().0;

        let mut participants: Vec<ChatParticipant> = Vec::new();
        if enable_chat {
            participants.push(ChatParticipant {
                post_id: post_id.clone(),
                user_id: author_id.to_string(),
                username: author_username.to_string(),
            });
            for user_id in chat_participant_ids {
                if user_id == author_id || participants.iter().any(|p| &p.user_id == user_id) {
                    continue;
                }
                let member = self
                    .db
                    .get_member(circle_id, user_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Validation(
                            "Chat participants must be members of the circle".to_string(),
                        )
                    })?;
                participants.push(ChatParticipant {
                    post_id: post_id.clone(),
                    user_id: member.user_id,
                    username: member.username,
                });
            }
        }

        let post = Post {
            id: post_id,
            circle_id: circle.id.clone(),
            author_id: author_id.to_string(),
            author_username: author_username.to_string(),
            content: content.to_json()?,
            comment_count: 0,
            is_chat_enabled: enable_chat,
            created_at: Utc::now(),
        };

        self.db
            .insert_post(&post, &content.tags, &participants)
            .await?;

        POSTS_CREATED_TOTAL
            .with_label_values(&[content.body.post_type()])
            .inc();

        Ok(post)
    }

    /// Delete a post.
    ///
    /// The author may always delete their own post. Anyone else needs a
    /// moderator or admin role in the post's circle.
    ///
    /// # Returns
    /// The deleted post.
    pub async fn delete(
        &self,
        post_id: &str,
        actor_id: &str,
        actor_username: &str,
    ) -> Result<Post, AppError> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if post.author_id != actor_id {
            let circle = self
                .db
                .get_circle(&post.circle_id)
                .await?
                .ok_or(AppError::NotFound)?;
            let role = self
                .membership
                .authorize(&circle, actor_id, actor_username)
                .await?;
            if !role.is_privileged() {
                return Err(AppError::Forbidden);
            }
        }

        self.db.delete_post(post_id).await?;
        Ok(post)
    }

    /// Fetch a post by id.
    pub async fn get_post(&self, post_id: &str) -> Result<Post, AppError> {
        self.db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}
