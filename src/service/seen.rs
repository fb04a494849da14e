//! Seen state service
//!
//! Records which members have seen a post and reports the breakdown to
//! the post author and circle staff. Marking is idempotent per user;
//! a re-mark refreshes the timestamp on the existing row.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{Database, SeenMark};
use crate::error::AppError;
use crate::metrics::SEEN_MARKS_TOTAL;
use crate::service::MembershipService;

/// A member who has seen the post.
#[derive(Debug, Clone, Serialize)]
pub struct SeenUser {
    pub user_id: String,
    pub username: String,
    pub seen_at: DateTime<Utc>,
}

/// A member who has not seen the post yet.
#[derive(Debug, Clone, Serialize)]
pub struct UnseenUser {
    pub user_id: String,
    pub username: String,
}

/// The current member list partitioned by seen state.
#[derive(Debug, Serialize)]
pub struct SeenStatus {
    pub seen: Vec<SeenUser>,
    pub unseen: Vec<UnseenUser>,
}

/// Seen state service
pub struct SeenService {
    db: Arc<Database>,
    membership: MembershipService,
}

impl SeenService {
    /// Create new seen state service
    pub fn new(db: Arc<Database>) -> Self {
        let membership = MembershipService::new(db.clone());
        Self { db, membership }
    }

    /// Mark a post as seen by a member.
    ///
    /// # Returns
    /// The number of members who have seen the post after this mark.
    pub async fn mark_seen(
        &self,
        post_id: &str,
        viewer_id: &str,
        viewer_username: &str,
    ) -> Result<i64, AppError> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let circle = self
            .db
            .get_circle(&post.circle_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.membership
            .authorize(&circle, viewer_id, viewer_username)
            .await?;

        let mark = SeenMark {
            post_id: post.id.clone(),
            user_id: viewer_id.to_string(),
            username: viewer_username.to_string(),
            seen_at: Utc::now(),
        };
        self.db.upsert_seen(&mark).await?;
        SEEN_MARKS_TOTAL.inc();

        let marks = self.db.list_seen(&post.id).await?;
        Ok(marks.len() as i64)
    }

    /// Report who has and has not seen a post.
    ///
    /// Restricted to the post author and privileged members. The report
    /// covers the current member list; marks from users who have since
    /// left the circle are not shown.
    pub async fn seen_status(
        &self,
        post_id: &str,
        actor_id: &str,
        actor_username: &str,
    ) -> Result<SeenStatus, AppError> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let circle = self
            .db
            .get_circle(&post.circle_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let role = self
            .membership
            .authorize(&circle, actor_id, actor_username)
            .await?;

        if actor_id != post.author_id && !role.is_privileged() {
            return Err(AppError::Forbidden);
        }

        let marks: HashMap<String, SeenMark> = self
            .db
            .list_seen(&post.id)
            .await?
            .into_iter()
            .map(|mark| (mark.user_id.clone(), mark))
            .collect();

        let mut status = SeenStatus {
            seen: Vec::new(),
            unseen: Vec::new(),
        };
        for member in self.db.list_members(&circle.id).await? {
            match marks.get(&member.user_id) {
                Some(mark) => status.seen.push(SeenUser {
                    user_id: member.user_id,
                    username: member.username,
                    seen_at: mark.seen_at,
                }),
                None => status.unseen.push(UnseenUser {
                    user_id: member.user_id,
                    username: member.username,
                }),
            }
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::data::{Circle, EntityId, Post, PostBody, PostContent, Role, User};

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-seen.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    async fn seed_user(db: &Database, username: &str) -> User {
        let user = User {
            id: EntityId::new().0,
            username: username.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        };
        db.create_user(&user).await.unwrap();
        user
    }

    async fn seed_circle(db: &Arc<Database>, owner: &User) -> Circle {
        let circle = Circle {
            id: EntityId::new().0,
            name: "club".to_string(),
            description: String::new(),
            owner_id: owner.id.clone(),
            is_public: false,
            created_at: Utc::now(),
        };
        db.create_circle(&circle).await.unwrap();
        MembershipService::new(db.clone())
            .authorize(&circle, &owner.id, &owner.username)
            .await
            .unwrap();
        circle
    }

    async fn seed_member(db: &Arc<Database>, circle: &Circle, user: &User) {
        MembershipService::new(db.clone())
            .join(circle, &user.id, &user.username, None)
            .await
            .unwrap();
    }

    async fn seed_post(db: &Database, circle: &Circle, author: &User) -> Post {
        let content = PostContent {
            body: PostBody::Standard {
                text: Some("hello".to_string()),
                link: None,
            },
            tags: vec![],
        };
        let post = Post {
            id: EntityId::new().0,
            circle_id: circle.id.clone(),
            author_id: author.id.clone(),
            author_username: author.username.clone(),
            content: content.to_json().unwrap(),
            comment_count: 0,
            is_chat_enabled: false,
            created_at: Utc::now(),
        };
        db.insert_post(&post, &[], &[]).await.unwrap();
        post
    }

    #[tokio::test]
    async fn remark_keeps_count_at_one() {
        let (db, _temp_dir) = create_test_db().await;
        let owner = seed_user(&db, "owner").await;
        let circle = seed_circle(&db, &owner).await;
        let post = seed_post(&db, &circle, &owner).await;
        let service = SeenService::new(db);

        let count = service
            .mark_seen(&post.id, &owner.id, &owner.username)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let count = service
            .mark_seen(&post.id, &owner.id, &owner.username)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn marking_requires_membership() {
        let (db, _temp_dir) = create_test_db().await;
        let owner = seed_user(&db, "owner").await;
        let outsider = seed_user(&db, "outsider").await;
        let circle = seed_circle(&db, &owner).await;
        let post = seed_post(&db, &circle, &owner).await;
        let service = SeenService::new(db);

        let error = service
            .mark_seen(&post.id, &outsider.id, &outsider.username)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));
    }

    #[tokio::test]
    async fn status_is_restricted_to_author_and_staff() {
        let (db, _temp_dir) = create_test_db().await;
        let owner = seed_user(&db, "owner").await;
        let author = seed_user(&db, "author").await;
        let bystander = seed_user(&db, "bystander").await;
        let moderator = seed_user(&db, "mod").await;
        let circle = seed_circle(&db, &owner).await;
        seed_member(&db, &circle, &author).await;
        seed_member(&db, &circle, &bystander).await;
        seed_member(&db, &circle, &moderator).await;
        MembershipService::new(db.clone())
            .set_role(
                &circle,
                &owner.id,
                &owner.username,
                &moderator.id,
                Role::Moderator,
            )
            .await
            .unwrap();
        let post = seed_post(&db, &circle, &author).await;
        let service = SeenService::new(db);

        let error = service
            .seen_status(&post.id, &bystander.id, &bystander.username)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));

        service
            .seen_status(&post.id, &author.id, &author.username)
            .await
            .unwrap();
        service
            .seen_status(&post.id, &moderator.id, &moderator.username)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn status_partitions_current_members() {
        let (db, _temp_dir) = create_test_db().await;
        let owner = seed_user(&db, "owner").await;
        let reader = seed_user(&db, "reader").await;
        let slacker = seed_user(&db, "slacker").await;
        let leaver = seed_user(&db, "leaver").await;
        let circle = seed_circle(&db, &owner).await;
        seed_member(&db, &circle, &reader).await;
        seed_member(&db, &circle, &slacker).await;
        seed_member(&db, &circle, &leaver).await;
        let post = seed_post(&db, &circle, &owner).await;
        let service = SeenService::new(db.clone());

        service
            .mark_seen(&post.id, &reader.id, &reader.username)
            .await
            .unwrap();
        service
            .mark_seen(&post.id, &leaver.id, &leaver.username)
            .await
            .unwrap();
        MembershipService::new(db.clone())
            .leave(&circle, &leaver.id)
            .await
            .unwrap();

        let status = service
            .seen_status(&post.id, &owner.id, &owner.username)
            .await
            .unwrap();

        assert_eq!(status.seen.len(), 1);
        assert_eq!(status.seen[0].user_id, reader.id);
        let unseen_ids: Vec<&str> = status.unseen.iter().map(|u| u.user_id.as_str()).collect();
        assert!(unseen_ids.contains(&owner.id.as_str()));
        assert!(unseen_ids.contains(&slacker.id.as_str()));
        assert!(!unseen_ids.contains(&leaver.id.as_str()));
        assert_eq!(status.unseen.len(), 2);
    }
}
