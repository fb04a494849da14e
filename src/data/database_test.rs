//! Database tests

use super::*;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn test_user(username: &str) -> User {
    User {
        id: EntityId::new().0,
        username: username.to_string(),
        password_hash: "argon2-test-hash".to_string(),
        created_at: Utc::now(),
    }
}

fn test_circle(owner: &User, name: &str) -> Circle {
    Circle {
        id: EntityId::new().0,
        name: name.to_string(),
        description: "a test circle".to_string(),
        owner_id: owner.id.clone(),
        is_public: false,
        created_at: Utc::now(),
    }
}

fn test_member(circle: &Circle, user: &User, role: Role) -> CircleMember {
    CircleMember {
        circle_id: circle.id.clone(),
        user_id: user.id.clone(),
        username: user.username.clone(),
        role: role.as_str().to_string(),
        invited_by: None,
        joined_at: Utc::now(),
    }
}

fn test_post(circle: &Circle, author: &User, created_at: DateTime<Utc>) -> Post {
    let content = PostContent {
        body: PostBody::Standard {
            text: Some("hello".to_string()),
            link: None,
        },
        tags: Vec::new(),
    };
    Post {
        id: EntityId::new().0,
        circle_id: circle.id.clone(),
        author_id: author.id.clone(),
        author_username: author.username.clone(),
        content: content.to_json().unwrap(),
        comment_count: 0,
        is_chat_enabled: false,
        created_at,
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
    // Connection successful if we get here without panicking
}

#[tokio::test]
async fn test_user_crud_and_username_conflict() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();

    let retrieved = db.get_user(&alice.id).await.unwrap().unwrap();
    assert_eq!(retrieved.username, "alice");

    // Lookup normalizes case
    let retrieved = db.get_user_by_username("  ALICE ").await.unwrap();
    assert!(retrieved.is_some());

    // Same username again is a conflict
    let duplicate = test_user("alice");
    let result = db.create_user(&duplicate).await;
    assert!(matches!(result, Err(crate::error::AppError::Conflict(_))));
}

#[tokio::test]
async fn test_circle_crud() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();

    let circle = test_circle(&alice, "book club");
    db.create_circle(&circle).await.unwrap();

    let retrieved = db.get_circle(&circle.id).await.unwrap().unwrap();
    assert_eq!(retrieved.name, "book club");
    assert!(!retrieved.is_public);

    // Same owner, same name is a conflict
    let duplicate = test_circle(&alice, "book club");
    let result = db.create_circle(&duplicate).await;
    assert!(matches!(result, Err(crate::error::AppError::Conflict(_))));

    // A different owner can reuse the name
    let bob = test_user("bob");
    db.create_user(&bob).await.unwrap();
    db.create_circle(&test_circle(&bob, "book club"))
        .await
        .unwrap();

    // Update
    let updated = db
        .update_circle_details(&circle.id, "book club", "now public", true)
        .await
        .unwrap();
    assert!(updated);
    let retrieved = db.get_circle(&circle.id).await.unwrap().unwrap();
    assert!(retrieved.is_public);
    assert_eq!(retrieved.description, "now public");

    let missing = db
        .update_circle_details("no-such-id", "x", "y", false)
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn test_circles_for_user_includes_owned_without_member_row() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();

    // Owned circle with no membership row yet
    let owned = test_circle(&alice, "mine");
    db.create_circle(&owned).await.unwrap();

    // Membership in someone else's circle
    let bob = test_user("bob");
    db.create_user(&bob).await.unwrap();
    let bobs = test_circle(&bob, "bobs");
    db.create_circle(&bobs).await.unwrap();
    db.insert_member_if_absent(&test_member(&bobs, &alice, Role::Member))
        .await
        .unwrap();

    let circles = db.get_circles_for_user(&alice.id).await.unwrap();
    let ids: Vec<&str> = circles.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(circles.len(), 2);
    assert!(ids.contains(&owned.id.as_str()));
    assert!(ids.contains(&bobs.id.as_str()));
}

#[tokio::test]
async fn test_membership_insert_if_absent_is_idempotent() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();

    let member = test_member(&circle, &alice, Role::Admin);
    assert!(db.insert_member_if_absent(&member).await.unwrap());
    // Second insert is a no-op, not a duplicate row
    assert!(!db.insert_member_if_absent(&member).await.unwrap());

    assert_eq!(db.count_members(&circle.id).await.unwrap(), 1);

    let stored = db.get_member(&circle.id, &alice.id).await.unwrap().unwrap();
    assert_eq!(stored.role, "admin");

    // Role update
    assert!(db
        .update_member_role(&circle.id, &alice.id, "moderator")
        .await
        .unwrap());
    let stored = db.get_member(&circle.id, &alice.id).await.unwrap().unwrap();
    assert_eq!(stored.role, "moderator");

    // Removal
    assert!(db.delete_member(&circle.id, &alice.id).await.unwrap());
    assert!(!db.delete_member(&circle.id, &alice.id).await.unwrap());
    assert_eq!(db.count_members(&circle.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_post_insert_and_cascade_delete() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();

    let mut post = test_post(&circle, &alice, Utc::now());
    post.is_chat_enabled = true;
    let participants = vec![ChatParticipant {
        post_id: post.id.clone(),
        user_id: alice.id.clone(),
        username: alice.username.clone(),
    }];
    db.insert_post(&post, &["books".to_string()], &participants)
        .await
        .unwrap();

    let retrieved = db.get_post(&post.id).await.unwrap().unwrap();
    assert!(retrieved.is_chat_enabled);

    db.upsert_seen(&SeenMark {
        post_id: post.id.clone(),
        user_id: alice.id.clone(),
        username: alice.username.clone(),
        seen_at: Utc::now(),
    })
    .await
    .unwrap();

    assert!(db.delete_post(&post.id).await.unwrap());
    assert!(db.get_post(&post.id).await.unwrap().is_none());
    assert!(db.list_seen(&post.id).await.unwrap().is_empty());
    assert!(db
        .list_chat_participants(&post.id)
        .await
        .unwrap()
        .is_empty());

    // Deleting again reports not found
    assert!(!db.delete_post(&post.id).await.unwrap());
}

#[tokio::test]
async fn test_vote_upsert_moves_single_ballot() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();
    let post = test_post(&circle, &alice, Utc::now());
    db.insert_post(&post, &[], &[]).await.unwrap();

    db.upsert_vote(&PollVote {
        post_id: post.id.clone(),
        voter_id: alice.id.clone(),
        option_index: 0,
        voted_at: Utc::now(),
    })
    .await
    .unwrap();

    // Re-vote transfers the ballot instead of adding a second one
    db.upsert_vote(&PollVote {
        post_id: post.id.clone(),
        voter_id: alice.id.clone(),
        option_index: 2,
        voted_at: Utc::now(),
    })
    .await
    .unwrap();

    let votes = db.list_votes(&post.id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].option_index, 2);
}

#[tokio::test]
async fn test_seen_remark_keeps_single_row_and_moves_to_end() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    let bob = test_user("bob");
    let carol = test_user("carol");
    for user in [&alice, &bob, &carol] {
        db.create_user(user).await.unwrap();
    }
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();
    let post = test_post(&circle, &alice, Utc::now());
    db.insert_post(&post, &[], &[]).await.unwrap();

    let base = Utc::now();
    for (user, offset) in [(&alice, 0), (&bob, 1), (&carol, 2)] {
        db.upsert_seen(&SeenMark {
            post_id: post.id.clone(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            seen_at: base + Duration::seconds(offset),
        })
        .await
        .unwrap();
    }

    // Alice marks again later: still one row, now last in order
    db.upsert_seen(&SeenMark {
        post_id: post.id.clone(),
        user_id: alice.id.clone(),
        username: alice.username.clone(),
        seen_at: base + Duration::seconds(10),
    })
    .await
    .unwrap();

    let marks = db.list_seen(&post.id).await.unwrap();
    assert_eq!(marks.len(), 3);
    assert_eq!(marks[0].username, "bob");
    assert_eq!(marks[1].username, "carol");
    assert_eq!(marks[2].username, "alice");
}

#[tokio::test]
async fn test_post_filter_requires_all_tags() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();

    let tagged_both = test_post(&circle, &alice, Utc::now());
    db.insert_post(&tagged_both, &["books".to_string(), "scifi".to_string()], &[])
        .await
        .unwrap();

    let tagged_one = test_post(&circle, &alice, Utc::now());
    db.insert_post(&tagged_one, &["books".to_string()], &[])
        .await
        .unwrap();

    let filter = PostFilter {
        circle_ids: Some(vec![circle.id.clone()]),
        tags: vec!["books".to_string(), "scifi".to_string()],
    };
    let posts = db.list_posts_page(&filter, 0, 10).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, tagged_both.id);
    assert_eq!(db.count_posts(&filter).await.unwrap(), 1);

    // A single tag matches both
    let filter = PostFilter {
        circle_ids: Some(vec![circle.id.clone()]),
        tags: vec!["books".to_string()],
    };
    assert_eq!(db.count_posts(&filter).await.unwrap(), 2);

    // No accessible circles matches nothing
    let filter = PostFilter {
        circle_ids: Some(Vec::new()),
        tags: Vec::new(),
    };
    assert_eq!(db.count_posts(&filter).await.unwrap(), 0);
    assert!(db.list_posts_page(&filter, 0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_posts_page_is_newest_first_and_count_ignores_paging() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();

    let base = Utc::now();
    let mut ids = Vec::new();
    for offset in 0..5 {
        let post = test_post(&circle, &alice, base + Duration::seconds(offset));
        db.insert_post(&post, &[], &[]).await.unwrap();
        ids.push(post.id);
    }

    let filter = PostFilter {
        circle_ids: Some(vec![circle.id.clone()]),
        tags: Vec::new(),
    };

    let first_page = db.list_posts_page(&filter, 0, 2).await.unwrap();
    assert_eq!(first_page.len(), 2);
    assert_eq!(first_page[0].id, ids[4]);
    assert_eq!(first_page[1].id, ids[3]);

    let second_page = db.list_posts_page(&filter, 2, 2).await.unwrap();
    assert_eq!(second_page[0].id, ids[2]);

    let last_page = db.list_posts_page(&filter, 4, 2).await.unwrap();
    assert_eq!(last_page.len(), 1);
    assert_eq!(last_page[0].id, ids[0]);

    assert_eq!(db.count_posts(&filter).await.unwrap(), 5);
}

#[tokio::test]
async fn test_circle_delete_cascades() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();
    db.insert_member_if_absent(&test_member(&circle, &alice, Role::Admin))
        .await
        .unwrap();

    let post = test_post(&circle, &alice, Utc::now());
    db.insert_post(&post, &["books".to_string()], &[])
        .await
        .unwrap();
    db.upsert_vote(&PollVote {
        post_id: post.id.clone(),
        voter_id: alice.id.clone(),
        option_index: 0,
        voted_at: Utc::now(),
    })
    .await
    .unwrap();

    assert!(db.delete_circle(&circle.id).await.unwrap());

    assert!(db.get_circle(&circle.id).await.unwrap().is_none());
    assert!(db.get_post(&post.id).await.unwrap().is_none());
    assert!(db.list_votes(&post.id).await.unwrap().is_empty());
    assert_eq!(db.count_members(&circle.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_invitation_if_absent_and_single_response() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    let bob = test_user("bob");
    db.create_user(&alice).await.unwrap();
    db.create_user(&bob).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();

    let invitation = Invitation {
        id: EntityId::new().0,
        circle_id: circle.id.clone(),
        inviter_id: alice.id.clone(),
        inviter_username: alice.username.clone(),
        invitee_id: bob.id.clone(),
        status: InvitationStatus::Pending.as_str().to_string(),
        created_at: Utc::now(),
    };
    assert!(db.insert_invitation_if_absent(&invitation).await.unwrap());

    // A second pending invitation to the same invitee is suppressed
    let repeat = Invitation {
        id: EntityId::new().0,
        ..invitation.clone()
    };
    assert!(!db.insert_invitation_if_absent(&repeat).await.unwrap());

    let pending = db.list_pending_invitations(&bob.id).await.unwrap();
    assert_eq!(pending.len(), 1);

    // First response wins, the second is a no-op
    assert!(db
        .set_invitation_status(&invitation.id, "pending", "accepted")
        .await
        .unwrap());
    assert!(!db
        .set_invitation_status(&invitation.id, "pending", "rejected")
        .await
        .unwrap());

    let stored = db.get_invitation(&invitation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "accepted");
    assert!(db.list_pending_invitations(&bob.id).await.unwrap().is_empty());

    // Once resolved, a new pending invitation may be issued
    let fresh = Invitation {
        id: EntityId::new().0,
        ..invitation.clone()
    };
    assert!(db.insert_invitation_if_absent(&fresh).await.unwrap());
}

#[tokio::test]
async fn test_invite_token_round_trip() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();

    let token = InviteToken {
        token: "tok-abc123".to_string(),
        circle_id: circle.id.clone(),
        created_by: alice.id.clone(),
        created_at: Utc::now(),
        expires_at: Some(Utc::now() + Duration::hours(24)),
    };
    db.insert_invite_token(&token).await.unwrap();

    let stored = db.get_invite_token("tok-abc123").await.unwrap().unwrap();
    assert_eq!(stored.circle_id, circle.id);
    assert!(stored.expires_at.is_some());

    assert!(db.get_invite_token("tok-missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_chat_participants_and_messages() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    let bob = test_user("bob");
    db.create_user(&alice).await.unwrap();
    db.create_user(&bob).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();

    let mut post = test_post(&circle, &alice, Utc::now());
    post.is_chat_enabled = true;
    let participants = vec![ChatParticipant {
        post_id: post.id.clone(),
        user_id: alice.id.clone(),
        username: alice.username.clone(),
    }];
    db.insert_post(&post, &[], &participants).await.unwrap();

    assert!(db.is_chat_participant(&post.id, &alice.id).await.unwrap());
    assert!(!db.is_chat_participant(&post.id, &bob.id).await.unwrap());

    // Widen the participant set
    let widened = vec![
        ChatParticipant {
            post_id: post.id.clone(),
            user_id: alice.id.clone(),
            username: alice.username.clone(),
        },
        ChatParticipant {
            post_id: post.id.clone(),
            user_id: bob.id.clone(),
            username: bob.username.clone(),
        },
    ];
    db.replace_chat_participants(&post.id, &widened)
        .await
        .unwrap();
    assert!(db.is_chat_participant(&post.id, &bob.id).await.unwrap());
    assert_eq!(db.list_chat_participants(&post.id).await.unwrap().len(), 2);

    let base = Utc::now();
    for (offset, text) in [(0, "first"), (1, "second")] {
        db.insert_chat_message(&ChatMessage {
            id: EntityId::new().0,
            post_id: post.id.clone(),
            sender_id: alice.id.clone(),
            sender_username: alice.username.clone(),
            content: text.to_string(),
            created_at: base + Duration::seconds(offset),
        })
        .await
        .unwrap();
    }

    let messages = db.list_chat_messages(&post.id, 50).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "first");
    assert_eq!(messages[1].content, "second");
}

#[tokio::test]
async fn test_comment_count_adjustment_floors_at_zero() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();
    let circle = test_circle(&alice, "club");
    db.create_circle(&circle).await.unwrap();
    let post = test_post(&circle, &alice, Utc::now());
    db.insert_post(&post, &[], &[]).await.unwrap();

    assert!(db.adjust_comment_count(&post.id, 3).await.unwrap());
    assert_eq!(db.get_post(&post.id).await.unwrap().unwrap().comment_count, 3);

    assert!(db.adjust_comment_count(&post.id, -5).await.unwrap());
    assert_eq!(db.get_post(&post.id).await.unwrap().unwrap().comment_count, 0);

    assert!(!db.adjust_comment_count("no-such-post", 1).await.unwrap());
}

#[tokio::test]
async fn test_notifications() {
    let (db, _temp_dir) = create_test_db().await;

    let alice = test_user("alice");
    db.create_user(&alice).await.unwrap();

    let base = Utc::now();
    let mut ids = Vec::new();
    for offset in 0..2 {
        let notification = Notification {
            id: EntityId::new().0,
            recipient_id: alice.id.clone(),
            kind: NotificationKind::CirclePost.as_str().to_string(),
            payload: r#"{"circle_id":"c1"}"#.to_string(),
            is_read: false,
            created_at: base + Duration::seconds(offset),
        };
        db.insert_notification(&notification).await.unwrap();
        ids.push(notification.id);
    }

    let all = db.get_notifications(&alice.id, 10, false).await.unwrap();
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0].id, ids[1]);

    assert!(db.mark_notification_read(&alice.id, &ids[0]).await.unwrap());
    let unread = db.get_notifications(&alice.id, 10, true).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, ids[1]);

    // A recipient can only mark their own
    assert!(!db
        .mark_notification_read("someone-else", &ids[1])
        .await
        .unwrap());

    db.mark_all_notifications_read(&alice.id).await.unwrap();
    assert!(db
        .get_notifications(&alice.id, 10, true)
        .await
        .unwrap()
        .is_empty());
}
