//! Feed service
//!
//! Pages through posts and enriches each one for the requesting viewer:
//! seen counts and samples, poll tallies, and chat participant lists.
//! Enrichment data is fetched in one batch query per concern per page,
//! never per post.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{
    ChatParticipant, Database, PollVote, PostBody, PostContent, PostFilter, SeenMark,
    normalize_tags,
};
use crate::error::AppError;
use crate::metrics::FEED_REQUESTS_TOTAL;
use crate::service::{MembershipService, TallySnapshot, tally_from_votes};

/// How many usernames the seen-by sample carries.
const SEEN_SAMPLE_SIZE: usize = 4;

/// A post decorated with everything the viewer is allowed to see.
#[derive(Debug, Serialize)]
pub struct EnrichedPost {
    pub id: String,
    pub circle_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: PostContent,
    pub comment_count: i64,
    pub is_chat_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub seen_by_count: i64,
    pub is_seen_by_user: bool,
    /// Usernames of the earliest markers, oldest first.
    pub seen_by_sample: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_results: Option<TallySnapshot>,
    /// Present only when chat is enabled and the viewer participates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_participants: Option<Vec<String>>,
}

/// One page of a feed.
#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub posts: Vec<EnrichedPost>,
    pub total: i64,
    pub has_more: bool,
}

/// Feed service
pub struct FeedService {
    db: Arc<Database>,
    membership: MembershipService,
}

impl FeedService {
    /// Create new feed service
    pub fn new(db: Arc<Database>) -> Self {
        let membership = MembershipService::new(db.clone());
        Self { db, membership }
    }

    /// Read one circle's feed.
    ///
    /// Public circles are readable by anyone, including anonymous
    /// viewers. Private circles require an authenticated member:
    /// anonymous viewers get `Unauthorized`, non-members `Forbidden`.
    pub async fn circle_feed(
        &self,
        circle_id: &str,
        viewer: Option<(&str, &str)>,
        tags: &[String],
        skip: i64,
        limit: i64,
    ) -> Result<FeedPage, AppError> {
        let circle = self
            .db
            .get_circle(circle_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !circle.is_public {
            let (viewer_id, viewer_username) = viewer.ok_or(AppError::Unauthorized)?;
            self.membership
                .authorize(&circle, viewer_id, viewer_username)
                .await?;
        }

        FEED_REQUESTS_TOTAL.with_label_values(&["circle"]).inc();

        let filter = PostFilter {
            circle_ids: Some(vec![circle.id]),
            tags: normalize_tags(tags),
        };
        self.compose(&filter, viewer.map(|(id, _)| id), skip, limit)
            .await
    }

    /// Read the viewer's home feed: posts from every circle they belong
    /// to or own, merged newest first.
    pub async fn home_feed(
        &self,
        viewer_id: &str,
        tags: &[String],
        skip: i64,
        limit: i64,
    ) -> Result<FeedPage, AppError> {
        FEED_REQUESTS_TOTAL.with_label_values(&["home"]).inc();

        let circle_ids: Vec<String> = self
            .db
            .get_circles_for_user(viewer_id)
            .await?
            .into_iter()
            .map(|circle| circle.id)
            .collect();
        let filter = PostFilter {
            circle_ids: Some(circle_ids),
            tags: normalize_tags(tags),
        };
        self.compose(&filter, Some(viewer_id), skip, limit).await
    }

    async fn compose(
        &self,
        filter: &PostFilter,
        viewer_id: Option<&str>,
        skip: i64,
        limit: i64,
    ) -> Result<FeedPage, AppError> {
        let posts = self.db.list_posts_page(filter, skip, limit).await?;
        let total = self.db.count_posts(filter).await?;

        let post_ids: Vec<String> = posts.iter().map(|post| post.id.clone()).collect();
        let mut seen_by_post = group_by_post(self.db.list_seen_batch(&post_ids).await?, |mark: &SeenMark| &mark.post_id);
        let mut votes_by_post = group_by_post(self.db.list_votes_batch(&post_ids).await?, |vote: &PollVote| &vote.post_id);
        let mut chat_by_post = group_by_post(
            self.db.list_chat_participants_batch(&post_ids).await?,
            |participant: &ChatParticipant| &participant.post_id,
        );

        let mut enriched = Vec::with_capacity(posts.len());
        for post in posts {
            let content = PostContent::from_json(&post.content)?;
            let seen = seen_by_post.remove(&post.id).unwrap_or_default();
            let votes = votes_by_post.remove(&post.id).unwrap_or_default();
            let chat = chat_by_post.remove(&post.id).unwrap_or_default();

            let is_seen_by_user =
                viewer_id.map_or(false, |id| seen.iter().any(|mark| mark.user_id == id));
            let seen_by_sample = seen
                .iter()
                .take(SEEN_SAMPLE_SIZE)
                .map(|mark| mark.username.clone())
                .collect();

            let poll_results = match &content.body {
                PostBody::Poll {
                    options,
                    expires_at,
                    ..
                } => Some(tally_from_votes(options, *expires_at, &votes, viewer_id)),
                _ => None,
            };

            let chat_participants = if post.is_chat_enabled
                && viewer_id.map_or(false, |id| chat.iter().any(|p| p.user_id == id))
            {
                Some(chat.into_iter().map(|p| p.username).collect())
            } else {
                None
            };

            enriched.push(EnrichedPost {
                id: post.id,
                circle_id: post.circle_id,
                author_id: post.author_id,
                author_username: post.author_username,
                content,
                comment_count: post.comment_count,
                is_chat_enabled: post.is_chat_enabled,
                created_at: post.created_at,
                seen_by_count: seen.len() as i64,
                is_seen_by_user,
                seen_by_sample,
                poll_results,
                chat_participants,
            });
        }

        let has_more = skip + (enriched.len() as i64) < total;
        Ok(FeedPage {
            posts: enriched,
            total,
            has_more,
        })
    }
}

fn group_by_post<T, F>(rows: Vec<T>, post_id: F) -> HashMap<String, Vec<T>>
where
    F: Fn(&T) -> &str,
{
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(post_id(&row).to_string()).or_default().push(row);
    }
    grouped
}
