//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx for queries; the schema is applied from ./migrations.

use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db_error| db_error.is_unique_violation())
        .unwrap_or(false)
}

/// Filter for post listing and counting.
///
/// The page query and the total-count query share this filter so that
/// `has_more` is always computed against the same selection.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Restrict to these circles. `None` means no circle restriction;
    /// an empty list matches nothing (a viewer with no memberships).
    pub circle_ids: Option<Vec<String>>,
    /// Every tag must be present on the post (canonical form)
    pub tags: Vec<String>,
}

fn push_post_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    if let Some(circle_ids) = &filter.circle_ids {
        if circle_ids.is_empty() {
            builder.push(" AND 0");
        } else {
            builder.push(" AND p.circle_id IN (");
            {
                let mut separated = builder.separated(", ");
                for circle_id in circle_ids {
                    separated.push_bind(circle_id.clone());
                }
            }
            builder.push(")");
        }
    }

    if !filter.tags.is_empty() {
        builder
            .push(" AND (SELECT COUNT(*) FROM post_tags t WHERE t.post_id = p.id AND t.tag IN (");
        {
            let mut separated = builder.separated(", ");
            for tag in &filter.tags {
                separated.push_bind(tag.clone());
            }
        }
        builder.push(")) = ");
        builder.push_bind(filter.tags.len() as i64);
    }
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Cheap liveness probe for the health endpoint
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user
    ///
    /// # Errors
    /// Returns `Conflict` if the username is already taken.
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                Err(AppError::Conflict("username is already taken".to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Look up a user by username (case-insensitive; stored form is lowercase)
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Fetch several users at once (used to resolve username snapshots)
    pub async fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for id in ids {
                separated.push_bind(id.clone());
            }
        }
        query_builder.push(")");

        let users = query_builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    // =========================================================================
    // Circles
    // =========================================================================

    /// Insert a new circle
    ///
    /// # Errors
    /// Returns `Conflict` if the owner already has a circle with this name.
    pub async fn create_circle(&self, circle: &Circle) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO circles (id, name, description, owner_id, is_public, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&circle.id)
        .bind(&circle.name)
        .bind(&circle.description)
        .bind(&circle.owner_id)
        .bind(circle.is_public)
        .bind(circle.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(
                "you already own a circle with this name".to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn get_circle(&self, id: &str) -> Result<Option<Circle>, AppError> {
        let circle = sqlx::query_as::<_, Circle>("SELECT * FROM circles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(circle)
    }

    /// Update a circle's mutable fields
    ///
    /// # Returns
    /// `false` if the circle does not exist.
    pub async fn update_circle_details(
        &self,
        id: &str,
        name: &str,
        description: &str,
        is_public: bool,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE circles SET name = ?, description = ?, is_public = ? WHERE id = ?")
                .bind(name)
                .bind(description)
                .bind(is_public)
                .bind(id)
                .execute(&self.pool)
                .await;

        match result {
            Ok(updated) => Ok(updated.rows_affected() > 0),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(
                "you already own a circle with this name".to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    /// Delete a circle and everything it owns.
    ///
    /// Notification history is deliberately retained.
    pub async fn delete_circle(&self, id: &str) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<bool, AppError> = async {
            for table in [
                "chat_messages",
                "chat_participants",
                "poll_votes",
                "post_seen",
                "post_tags",
            ] {
                let sql = format!(
                    "DELETE FROM {table} WHERE post_id IN (SELECT id FROM posts WHERE circle_id = ?)"
                );
                sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
            }

            sqlx::query("DELETE FROM posts WHERE circle_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM circle_members WHERE circle_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM invite_tokens WHERE circle_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            sqlx::query("DELETE FROM invitations WHERE circle_id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;

            let deleted = sqlx::query("DELETE FROM circles WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;

            Ok(deleted.rows_affected() > 0)
        }
        .await;

        match result {
            Ok(deleted) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(deleted)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// List circles the user belongs to.
    ///
    /// Includes circles the user owns even when the owner membership row has
    /// not been materialized yet.
    pub async fn get_circles_for_user(&self, user_id: &str) -> Result<Vec<Circle>, AppError> {
        let circles = sqlx::query_as::<_, Circle>(
            r#"
            SELECT DISTINCT c.* FROM circles c
            LEFT JOIN circle_members m ON m.circle_id = c.id AND m.user_id = ?
            WHERE m.user_id IS NOT NULL OR c.owner_id = ?
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(circles)
    }

    // =========================================================================
    // Circle members
    // =========================================================================

    pub async fn get_member(
        &self,
        circle_id: &str,
        user_id: &str,
    ) -> Result<Option<CircleMember>, AppError> {
        let member = sqlx::query_as::<_, CircleMember>(
            "SELECT * FROM circle_members WHERE circle_id = ? AND user_id = ?",
        )
        .bind(circle_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    /// Insert a membership row only if none exists for this (circle, user).
    ///
    /// This is atomic at the SQL statement level, so concurrent joins and
    /// the owner self-heal converge safely.
    ///
    /// # Returns
    /// `true` if inserted, `false` if the membership already existed.
    pub async fn insert_member_if_absent(&self, member: &CircleMember) -> Result<bool, AppError> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO circle_members (
                circle_id, user_id, username, role, invited_by, joined_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&member.circle_id)
        .bind(&member.user_id)
        .bind(&member.username)
        .bind(&member.role)
        .bind(&member.invited_by)
        .bind(member.joined_at)
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() > 0)
    }

    pub async fn list_members(&self, circle_id: &str) -> Result<Vec<CircleMember>, AppError> {
        let members = sqlx::query_as::<_, CircleMember>(
            "SELECT * FROM circle_members WHERE circle_id = ? ORDER BY joined_at, user_id",
        )
        .bind(circle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    pub async fn count_members(&self, circle_id: &str) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM circle_members WHERE circle_id = ?")
                .bind(circle_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Set a member's role. Re-applying the current role is a no-op success.
    ///
    /// # Returns
    /// `false` if no such membership exists.
    pub async fn update_member_role(
        &self,
        circle_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<bool, AppError> {
        let updated =
            sqlx::query("UPDATE circle_members SET role = ? WHERE circle_id = ? AND user_id = ?")
                .bind(role)
                .bind(circle_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(updated.rows_affected() > 0)
    }

    /// Remove a membership row
    ///
    /// # Returns
    /// `false` if no such membership exists.
    pub async fn delete_member(&self, circle_id: &str, user_id: &str) -> Result<bool, AppError> {
        let deleted = sqlx::query("DELETE FROM circle_members WHERE circle_id = ? AND user_id = ?")
            .bind(circle_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected() > 0)
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Insert a post together with its tag rows and chat participant set.
    pub async fn insert_post(
        &self,
        post: &Post,
        tags: &[String],
        chat_participants: &[ChatParticipant],
    ) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<(), AppError> = async {
            sqlx::query(
                r#"
                INSERT INTO posts (
                    id, circle_id, author_id, author_username, content,
                    comment_count, is_chat_enabled, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&post.id)
            .bind(&post.circle_id)
            .bind(&post.author_id)
            .bind(&post.author_username)
            .bind(&post.content)
            .bind(post.comment_count)
            .bind(post.is_chat_enabled)
            .bind(post.created_at)
            .execute(&mut *conn)
            .await?;

            for tag in tags {
                sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag) VALUES (?, ?)")
                    .bind(&post.id)
                    .bind(tag)
                    .execute(&mut *conn)
                    .await?;
            }

            for participant in chat_participants {
                sqlx::query(
                    "INSERT OR IGNORE INTO chat_participants (post_id, user_id, username) VALUES (?, ?, ?)",
                )
                .bind(&participant.post_id)
                .bind(&participant.user_id)
                .bind(&participant.username)
                .execute(&mut *conn)
                .await?;
            }

            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    /// Delete a post and everything it owns
    ///
    /// # Returns
    /// `false` if the post does not exist.
    pub async fn delete_post(&self, id: &str) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<bool, AppError> = async {
            for table in [
                "chat_messages",
                "chat_participants",
                "poll_votes",
                "post_seen",
                "post_tags",
            ] {
                let sql = format!("DELETE FROM {table} WHERE post_id = ?");
                sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
            }

            let deleted = sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;

            Ok(deleted.rows_affected() > 0)
        }
        .await;

        match result {
            Ok(deleted) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(deleted)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// Adjust the denormalized comment counter (external comment subsystem
    /// boundary). The counter never goes below zero.
    pub async fn adjust_comment_count(&self, post_id: &str, delta: i64) -> Result<bool, AppError> {
        let updated =
            sqlx::query("UPDATE posts SET comment_count = MAX(comment_count + ?, 0) WHERE id = ?")
                .bind(delta)
                .bind(post_id)
                .execute(&self.pool)
                .await?;

        Ok(updated.rows_affected() > 0)
    }

    // =========================================================================
    // Feed queries
    // =========================================================================

    /// One page of posts matching the filter, newest first.
    pub async fn list_posts_page(
        &self,
        filter: &PostFilter,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Post>, AppError> {
        let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT p.* FROM posts p WHERE 1 = 1");
        push_post_filter(&mut query_builder, filter);
        query_builder.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(skip);

        let posts = query_builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    /// Total number of posts matching the filter, ignoring pagination.
    pub async fn count_posts(&self, filter: &PostFilter) -> Result<i64, AppError> {
        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts p WHERE 1 = 1");
        push_post_filter(&mut query_builder, filter);

        let count = query_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Seen marks
    // =========================================================================

    /// Record or refresh a seen mark.
    ///
    /// Single-statement upsert keyed on (post_id, user_id): re-marking
    /// replaces the timestamp atomically, so a user is never counted twice.
    pub async fn upsert_seen(&self, mark: &SeenMark) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO post_seen (post_id, user_id, username, seen_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (post_id, user_id)
            DO UPDATE SET seen_at = excluded.seen_at, username = excluded.username
            "#,
        )
        .bind(&mark.post_id)
        .bind(&mark.user_id)
        .bind(&mark.username)
        .bind(mark.seen_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All seen marks for one post, oldest mark first.
    ///
    /// A re-mark refreshes `seen_at` and therefore moves that user to the
    /// end, which is the order the preview sample relies on.
    pub async fn list_seen(&self, post_id: &str) -> Result<Vec<SeenMark>, AppError> {
        let marks = sqlx::query_as::<_, SeenMark>(
            "SELECT * FROM post_seen WHERE post_id = ? ORDER BY seen_at, user_id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(marks)
    }

    /// Seen marks for a page of posts, grouped by the caller.
    pub async fn list_seen_batch(&self, post_ids: &[String]) -> Result<Vec<SeenMark>, AppError> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM post_seen WHERE post_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for post_id in post_ids {
                separated.push_bind(post_id.clone());
            }
        }
        query_builder.push(") ORDER BY post_id, seen_at, user_id");

        let marks = query_builder
            .build_query_as::<SeenMark>()
            .fetch_all(&self.pool)
            .await?;

        Ok(marks)
    }

    // =========================================================================
    // Poll ballots
    // =========================================================================

    /// Record or transfer a ballot.
    ///
    /// Single-statement upsert keyed on (post_id, voter_id): a re-vote moves
    /// the voter's single ballot to the new option atomically, so the voter
    /// can never be observed in zero or two options.
    pub async fn upsert_vote(&self, vote: &PollVote) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO poll_votes (post_id, voter_id, option_index, voted_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (post_id, voter_id)
            DO UPDATE SET option_index = excluded.option_index, voted_at = excluded.voted_at
            "#,
        )
        .bind(&vote.post_id)
        .bind(&vote.voter_id)
        .bind(vote.option_index)
        .bind(vote.voted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_votes(&self, post_id: &str) -> Result<Vec<PollVote>, AppError> {
        let votes = sqlx::query_as::<_, PollVote>(
            "SELECT * FROM poll_votes WHERE post_id = ? ORDER BY option_index, voted_at",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(votes)
    }

    /// Ballots for a page of posts, grouped by the caller.
    pub async fn list_votes_batch(&self, post_ids: &[String]) -> Result<Vec<PollVote>, AppError> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM poll_votes WHERE post_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for post_id in post_ids {
                separated.push_bind(post_id.clone());
            }
        }
        query_builder.push(") ORDER BY post_id, option_index, voted_at");

        let votes = query_builder
            .build_query_as::<PollVote>()
            .fetch_all(&self.pool)
            .await?;

        Ok(votes)
    }

    // =========================================================================
    // Chat
    // =========================================================================

    pub async fn is_chat_participant(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_participants WHERE post_id = ? AND user_id = ?",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    pub async fn list_chat_participants(
        &self,
        post_id: &str,
    ) -> Result<Vec<ChatParticipant>, AppError> {
        let participants = sqlx::query_as::<_, ChatParticipant>(
            "SELECT * FROM chat_participants WHERE post_id = ? ORDER BY username",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }

    /// Chat participants for a page of posts, grouped by the caller.
    pub async fn list_chat_participants_batch(
        &self,
        post_ids: &[String],
    ) -> Result<Vec<ChatParticipant>, AppError> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT * FROM chat_participants WHERE post_id IN (");
        {
            let mut separated = query_builder.separated(", ");
            for post_id in post_ids {
                separated.push_bind(post_id.clone());
            }
        }
        query_builder.push(") ORDER BY post_id, username");

        let participants = query_builder
            .build_query_as::<ChatParticipant>()
            .fetch_all(&self.pool)
            .await?;

        Ok(participants)
    }

    /// Replace the whole participant set for a post.
    pub async fn replace_chat_participants(
        &self,
        post_id: &str,
        participants: &[ChatParticipant],
    ) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<(), AppError> = async {
            sqlx::query("DELETE FROM chat_participants WHERE post_id = ?")
                .bind(post_id)
                .execute(&mut *conn)
                .await?;

            for participant in participants {
                sqlx::query(
                    "INSERT OR IGNORE INTO chat_participants (post_id, user_id, username) VALUES (?, ?, ?)",
                )
                .bind(post_id)
                .bind(&participant.user_id)
                .bind(&participant.username)
                .execute(&mut *conn)
                .await?;
            }

            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    pub async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, post_id, sender_id, sender_username, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.post_id)
        .bind(&message.sender_id)
        .bind(&message.sender_username)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Chat messages for a post, oldest first.
    pub async fn list_chat_messages(
        &self,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE post_id = ? ORDER BY created_at, id LIMIT ?",
        )
        .bind(post_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    // =========================================================================
    // Invite tokens
    // =========================================================================

    pub async fn insert_invite_token(&self, token: &InviteToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO invite_tokens (token, circle_id, created_by, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.token)
        .bind(&token.circle_id)
        .bind(&token.created_by)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_invite_token(&self, token: &str) -> Result<Option<InviteToken>, AppError> {
        let invite =
            sqlx::query_as::<_, InviteToken>("SELECT * FROM invite_tokens WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        Ok(invite)
    }

    // =========================================================================
    // Invitations
    // =========================================================================

    /// Insert a direct invitation unless a pending one already exists for
    /// this (circle, invitee). Atomic at the statement level.
    ///
    /// # Returns
    /// `true` if inserted, `false` if a pending invitation already existed.
    pub async fn insert_invitation_if_absent(
        &self,
        invitation: &Invitation,
    ) -> Result<bool, AppError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO invitations (
                id, circle_id, inviter_id, inviter_username, invitee_id, status, created_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM invitations
                WHERE circle_id = ? AND invitee_id = ? AND status = 'pending'
            )
            "#,
        )
        .bind(&invitation.id)
        .bind(&invitation.circle_id)
        .bind(&invitation.inviter_id)
        .bind(&invitation.inviter_username)
        .bind(&invitation.invitee_id)
        .bind(&invitation.status)
        .bind(invitation.created_at)
        .bind(&invitation.circle_id)
        .bind(&invitation.invitee_id)
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() > 0)
    }

    pub async fn get_invitation(&self, id: &str) -> Result<Option<Invitation>, AppError> {
        let invitation = sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invitation)
    }

    /// Pending invitations addressed to a user, newest first.
    pub async fn list_pending_invitations(
        &self,
        invitee_id: &str,
    ) -> Result<Vec<Invitation>, AppError> {
        let invitations = sqlx::query_as::<_, Invitation>(
            "SELECT * FROM invitations WHERE invitee_id = ? AND status = 'pending' ORDER BY created_at DESC",
        )
        .bind(invitee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(invitations)
    }

    /// Flip an invitation's status, but only from the expected prior state.
    ///
    /// The state check inside the UPDATE makes double-responding a
    /// detectable no-op rather than a lost update.
    ///
    /// # Returns
    /// `true` if the transition happened.
    pub async fn set_invitation_status(
        &self,
        id: &str,
        expected: &str,
        new_status: &str,
    ) -> Result<bool, AppError> {
        let updated = sqlx::query("UPDATE invitations SET status = ? WHERE id = ? AND status = ?")
            .bind(new_status)
            .bind(id)
            .bind(expected)
            .execute(&self.pool)
            .await?;

        Ok(updated.rows_affected() > 0)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    pub async fn insert_notification(&self, notification: &Notification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, kind, payload, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.recipient_id)
        .bind(&notification.kind)
        .bind(&notification.payload)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a user's notifications (paginated, newest first)
    pub async fn get_notifications(
        &self,
        recipient_id: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications = if unread_only {
            sqlx::query_as::<_, Notification>(
                "SELECT * FROM notifications WHERE recipient_id = ? AND is_read = 0 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(recipient_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Notification>(
                "SELECT * FROM notifications WHERE recipient_id = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(recipient_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(notifications)
    }

    /// Mark one of the recipient's notifications as read
    ///
    /// # Returns
    /// `false` if the notification does not exist or belongs to someone else.
    pub async fn mark_notification_read(
        &self,
        recipient_id: &str,
        id: &str,
    ) -> Result<bool, AppError> {
        let updated =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND recipient_id = ?")
                .bind(id)
                .bind(recipient_id)
                .execute(&self.pool)
                .await?;

        Ok(updated.rows_affected() > 0)
    }

    /// Mark all of the recipient's notifications as read
    pub async fn mark_all_notifications_read(&self, recipient_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE recipient_id = ?")
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
