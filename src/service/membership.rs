//! Membership service
//!
//! Owns circle membership records and role semantics. Every role check,
//! role mutation, removal, and leave goes through here.

use std::sync::Arc;

use chrono::Utc;

use crate::data::{Circle, CircleMember, Database, Role};
use crate::error::AppError;

/// Membership service
pub struct MembershipService {
    db: Arc<Database>,
}

impl MembershipService {
    /// Create new membership service
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Authorize an actor against a circle and return their role.
    ///
    /// The circle owner is always authorized: if their membership row is
    /// missing it is inserted with role `admin` as a side effect, so an
    /// owner can never be locked out of their own circle. The insert is
    /// if-absent, so concurrent calls converge on a single row.
    ///
    /// # Errors
    /// Returns `Forbidden` for anyone who is neither owner nor member.
    pub async fn authorize(
        &self,
        circle: &Circle,
        user_id: &str,
        username: &str,
    ) -> Result<Role, AppError> {
        if let Some(member) = self.db.get_member(&circle.id, user_id).await? {
            return parse_role(&member.role);
        }

        if circle.owner_id == user_id {
            let member = CircleMember {
                circle_id: circle.id.clone(),
                user_id: user_id.to_string(),
                username: username.to_string(),
                role: Role::Admin.as_str().to_string(),
                invited_by: None,
                joined_at: Utc::now(),
            };
            self.db.insert_member_if_absent(&member).await?;
            return Ok(Role::Admin);
        }

        Err(AppError::Forbidden)
    }

    /// Look up a member without triggering the owner self-heal.
    pub async fn get_member(
        &self,
        circle_id: &str,
        user_id: &str,
    ) -> Result<Option<CircleMember>, AppError> {
        self.db.get_member(circle_id, user_id).await
    }

    /// List all members of a circle, oldest joiner first.
    pub async fn list_members(&self, circle_id: &str) -> Result<Vec<CircleMember>, AppError> {
        self.db.list_members(circle_id).await
    }

    /// Join a circle with role `member`.
    ///
    /// The owner joins their own circle as `admin`, whichever path
    /// brought them here (circle creation, invite link, invitation).
    ///
    /// # Returns
    /// `true` if a membership row was inserted, `false` if the user was
    /// already a member (idempotent join).
    pub async fn join(
        &self,
        circle: &Circle,
        user_id: &str,
        username: &str,
        invited_by: Option<String>,
    ) -> Result<bool, AppError> {
        let role = if user_id == circle.owner_id {
            Role::Admin
        } else {
            Role::Member
        };
        let member = CircleMember {
            circle_id: circle.id.clone(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            role: role.as_str().to_string(),
            invited_by,
            joined_at: Utc::now(),
        };
        self.db.insert_member_if_absent(&member).await
    }

    /// Change a member's role.
    ///
    /// Rules:
    /// - plain members may not change roles at all
    /// - moderators may only touch plain members, and only at member level
    /// - admins may set any role, but the owner can never be demoted
    /// - re-applying the current role is a no-op success
    ///
    /// # Returns
    /// The target's membership row with the new role applied.
    pub async fn set_role(
        &self,
        circle: &Circle,
        actor_id: &str,
        actor_username: &str,
        target_user_id: &str,
        new_role: Role,
    ) -> Result<CircleMember, AppError> {
        let actor_role = self.authorize(circle, actor_id, actor_username).await?;

        let mut target = self
            .db
            .get_member(&circle.id, target_user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let target_role = parse_role(&target.role)?;

        match actor_role {
            Role::Member => return Err(AppError::Forbidden),
            Role::Moderator => {
                if target_role != Role::Member || new_role != Role::Member {
                    return Err(AppError::Forbidden);
                }
            }
            Role::Admin => {
                if target_user_id == circle.owner_id && new_role != Role::Admin {
                    return Err(AppError::Forbidden);
                }
            }
        }

        if new_role != target_role {
            self.db
                .update_member_role(&circle.id, target_user_id, new_role.as_str())
                .await?;
        }

        target.role = new_role.as_str().to_string();
        Ok(target)
    }

    /// Remove a member from a circle.
    ///
    /// The owner can never be removed, and an actor cannot remove
    /// themselves here (leaving is `leave`). Admins may remove anyone
    /// else; moderators only plain members.
    ///
    /// # Returns
    /// The removed membership row.
    pub async fn remove_member(
        &self,
        circle: &Circle,
        actor_id: &str,
        actor_username: &str,
        target_user_id: &str,
    ) -> Result<CircleMember, AppError> {
        if target_user_id == circle.owner_id || target_user_id == actor_id {
            return Err(AppError::Forbidden);
        }

        let actor_role = self.authorize(circle, actor_id, actor_username).await?;

        let target = self
            .db
            .get_member(&circle.id, target_user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let target_role = parse_role(&target.role)?;

        match actor_role {
            Role::Member => return Err(AppError::Forbidden),
            Role::Moderator => {
                if target_role != Role::Member {
                    return Err(AppError::Forbidden);
                }
            }
            Role::Admin => {}
        }

        self.db.delete_member(&circle.id, target_user_id).await?;
        Ok(target)
    }

    /// Leave a circle voluntarily.
    ///
    /// The owner may not leave their own circle.
    pub async fn leave(&self, circle: &Circle, user_id: &str) -> Result<(), AppError> {
        if user_id == circle.owner_id {
            return Err(AppError::Forbidden);
        }

        let deleted = self.db.delete_member(&circle.id, user_id).await?;
        if !deleted {
            return Err(AppError::NotFound);
        }

        Ok(())
    }
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    Role::parse(raw)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown role in member row: {}", raw)))
}
