//! Notification fan-out
//!
//! Builds stored notifications and persists them off the request path.
//! Fan-out runs after the triggering write has already committed, so a
//! failure here never rolls anything back; it is logged and counted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::data::{Circle, Database, EntityId, Notification, NotificationKind, Post};
use crate::error::AppError;
use crate::metrics::{EVENT_DELIVERY_FAILURES_TOTAL, EVENTS_EMITTED_TOTAL};

/// Store a single notification in the background.
pub fn spawn_store(
    db: Arc<Database>,
    timeout_seconds: u64,
    kind: NotificationKind,
    notification: Notification,
) {
    EVENTS_EMITTED_TOTAL.with_label_values(&[kind.as_str()]).inc();
    spawn_best_effort_store(kind.as_str(), timeout_seconds, async move {
        db.insert_notification(&notification).await
    });
}

/// Notify every member of a post's circle except the author.
pub fn spawn_post_fanout(db: Arc<Database>, timeout_seconds: u64, post: Post) {
    EVENTS_EMITTED_TOTAL
        .with_label_values(&[NotificationKind::CirclePost.as_str()])
        .inc();
    spawn_best_effort_store(
        NotificationKind::CirclePost.as_str(),
        timeout_seconds,
        store_post_fanout(db, post),
    );
}

async fn store_post_fanout(db: Arc<Database>, post: Post) -> Result<(), AppError> {
    // The circle can disappear between post creation and fan-out
    let Some(circle) = db.get_circle(&post.circle_id).await? else {
        return Ok(());
    };

    for member in db.list_members(&circle.id).await? {
        if member.user_id == post.author_id {
            continue;
        }
        let notification = circle_post_notification(&member.user_id, &circle, &post);
        db.insert_notification(&notification).await?;
    }

    Ok(())
}

fn spawn_best_effort_store<F>(kind: &'static str, timeout_seconds: u64, future: F)
where
    F: Future<Output = Result<(), AppError>> + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::time::timeout(Duration::from_secs(timeout_seconds), future).await {
            Ok(Ok(())) => {
                tracing::debug!(kind, "Notification fan-out completed");
            }
            Ok(Err(error)) => {
                EVENT_DELIVERY_FAILURES_TOTAL.with_label_values(&[kind]).inc();
                tracing::warn!(
                    kind,
                    %error,
                    "Notification fan-out failed (no retry policy configured)"
                );
            }
            Err(_) => {
                EVENT_DELIVERY_FAILURES_TOTAL.with_label_values(&[kind]).inc();
                tracing::warn!(
                    kind,
                    timeout_seconds,
                    "Notification fan-out timed out (no retry policy configured)"
                );
            }
        }
    });
}

fn build_notification(recipient_id: &str, kind: NotificationKind, payload: serde_json::Value) -> Notification {
    Notification {
        id: EntityId::new().0,
        recipient_id: recipient_id.to_string(),
        kind: kind.as_str().to_string(),
        payload: payload.to_string(),
        is_read: false,
        created_at: Utc::now(),
    }
}

fn circle_post_notification(recipient_id: &str, circle: &Circle, post: &Post) -> Notification {
    build_notification(
        recipient_id,
        NotificationKind::CirclePost,
        serde_json::json!({
            "circle_id": circle.id,
            "circle_name": circle.name,
            "post_id": post.id,
            "author_username": post.author_username,
        }),
    )
}

pub fn circle_invitation_notification(
    recipient_id: &str,
    circle: &Circle,
    inviter_username: &str,
    invitation_id: &str,
) -> Notification {
    build_notification(
        recipient_id,
        NotificationKind::CircleInvitation,
        serde_json::json!({
            "circle_id": circle.id,
            "circle_name": circle.name,
            "inviter_username": inviter_username,
            "invitation_id": invitation_id,
        }),
    )
}

pub fn invitation_accepted_notification(
    recipient_id: &str,
    circle: &Circle,
    invitee_username: &str,
) -> Notification {
    build_notification(
        recipient_id,
        NotificationKind::InvitationAccepted,
        serde_json::json!({
            "circle_id": circle.id,
            "circle_name": circle.name,
            "invitee_username": invitee_username,
        }),
    )
}

pub fn role_changed_notification(recipient_id: &str, circle: &Circle, new_role: &str) -> Notification {
    build_notification(
        recipient_id,
        NotificationKind::RoleChanged,
        serde_json::json!({
            "circle_id": circle.id,
            "circle_name": circle.name,
            "new_role": new_role,
        }),
    )
}

pub fn removed_from_circle_notification(recipient_id: &str, circle: &Circle) -> Notification {
    build_notification(
        recipient_id,
        NotificationKind::RemovedFromCircle,
        serde_json::json!({
            "circle_id": circle.id,
            "circle_name": circle.name,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::data::{CircleMember, PostBody, PostContent, Role, User};

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("events.db");
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

    async fn seed_member(db: &Database, circle: &Circle, user: &User) {
        db.insert_member_if_absent(&CircleMember {
            circle_id: circle.id.clone(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: Role::Member.as_str().to_string(),
            invited_by: None,
            joined_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn post_fanout_notifies_everyone_but_the_author() {
        let (db, _temp_dir) = create_test_db().await;
        let author = seed_user(&db, "author").await;
        let reader = seed_user(&db, "reader").await;
        let other = seed_user(&db, "other").await;

        let circle = Circle {
            id: EntityId::new().0,
            name: "club".to_string(),
            description: String::new(),
            owner_id: author.id.clone(),
            is_public: false,
            created_at: Utc::now(),
        };
        db.create_circle(&circle).await.unwrap();
        seed_member(&db, &circle, &author).await;
        seed_member(&db, &circle, &reader).await;
        seed_member(&db, &circle, &other).await;

        let content = PostContent {
            body: PostBody::Standard {
                text: Some("news".to_string()),
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

        store_post_fanout(db.clone(), post.clone()).await.unwrap();

        assert!(db
            .get_notifications(&author.id, 10, false)
            .await
            .unwrap()
            .is_empty());

        let received = db.get_notifications(&reader.id, 10, false).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, "circle_post");
        let payload: serde_json::Value = serde_json::from_str(&received[0].payload).unwrap();
        assert_eq!(payload["post_id"], post.id);
        assert_eq!(payload["circle_name"], "club");
        assert_eq!(payload["author_username"], "author");

        assert_eq!(
            db.get_notifications(&other.id, 10, false).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn fanout_for_missing_circle_is_a_quiet_no_op() {
        let (db, _temp_dir) = create_test_db().await;
        let post = Post {
            id: EntityId::new().0,
            circle_id: "gone".to_string(),
            author_id: "a".to_string(),
            author_username: "a".to_string(),
            content: "{}".to_string(),
            comment_count: 0,
            is_chat_enabled: false,
            created_at: Utc::now(),
        };

        store_post_fanout(db, post).await.unwrap();
    }

    #[test]
    fn builders_stamp_kind_and_payload() {
        let circle = Circle {
            id: "c1".to_string(),
            name: "club".to_string(),
            description: String::new(),
            owner_id: "o".to_string(),
            is_public: false,
            created_at: Utc::now(),
        };

        let invitation = circle_invitation_notification("bob", &circle, "alice", "inv1");
        assert_eq!(invitation.kind, "circle_invitation");
        assert_eq!(invitation.recipient_id, "bob");
        assert!(!invitation.is_read);
        let payload: serde_json::Value = serde_json::from_str(&invitation.payload).unwrap();
        assert_eq!(payload["inviter_username"], "alice");
        assert_eq!(payload["invitation_id"], "inv1");

        let accepted = invitation_accepted_notification("alice", &circle, "bob");
        assert_eq!(accepted.kind, "invitation_accepted");
        let payload: serde_json::Value = serde_json::from_str(&accepted.payload).unwrap();
        assert_eq!(payload["invitee_username"], "bob");

        let role = role_changed_notification("bob", &circle, "moderator");
        assert_eq!(role.kind, "role_changed");
        let payload: serde_json::Value = serde_json::from_str(&role.payload).unwrap();
        assert_eq!(payload["new_role"], "moderator");

        let removed = removed_from_circle_notification("bob", &circle);
        assert_eq!(removed.kind, "removed_from_circle");
        let payload: serde_json::Value = serde_json::from_str(&removed.payload).unwrap();
        assert_eq!(payload["circle_name"], "club");
    }
}
