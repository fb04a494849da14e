//! Poll ballot service
//!
//! Casts votes on poll posts and computes tallies. Each voter holds at
//! most one ballot per poll; re-voting moves the ballot to the new
//! option in a single upsert, so no window exists where a voter counts
//! twice or not at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::{Database, PollOption, PollVote, PostBody, PostContent};
use crate::error::AppError;
use crate::metrics::VOTES_CAST_TOTAL;
use crate::service::MembershipService;

/// One poll option with its vote count.
#[derive(Debug, Clone, Serialize)]
pub struct TallyOption {
    pub text: String,
    pub votes: i64,
}

/// Aggregate poll results as shown to one viewer. Only counts are
/// exposed; voter identities never leave the service except for the
/// viewer's own choice.
#[derive(Debug, Clone, Serialize)]
pub struct TallySnapshot {
    pub total_votes: i64,
    pub options: Vec<TallyOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_voted_index: Option<i64>,
    pub is_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Compute a tally snapshot from raw ballots.
pub fn tally_from_votes(
    options: &[PollOption],
    expires_at: Option<DateTime<Utc>>,
    votes: &[PollVote],
    viewer_id: Option<&str>,
) -> TallySnapshot {
    let mut counts = vec![0i64; options.len()];
    let mut user_voted_index = None;

    for vote in votes {
        if let Some(slot) = counts.get_mut(vote.option_index as usize) {
            *slot += 1;
        }
        if viewer_id == Some(vote.voter_id.as_str()) {
            user_voted_index = Some(vote.option_index);
        }
    }

    TallySnapshot {
        total_votes: votes.len() as i64,
        options: options
            .iter()
            .zip(counts)
            .map(|(option, votes)| TallyOption {
                text: option.text.clone(),
                votes,
            })
            .collect(),
        user_voted_index,
        is_expired: expires_at.map_or(false, |at| Utc::now() >= at),
        expires_at,
    }
}

/// Poll ballot service
pub struct BallotService {
    db: Arc<Database>,
    membership: MembershipService,
}

impl BallotService {
    /// Create new ballot service
    pub fn new(db: Arc<Database>) -> Self {
        let membership = MembershipService::new(db.clone());
        Self { db, membership }
    }

    /// Cast or move a ballot on a poll post.
    ///
    /// The voter must be a member of the post's circle, the poll must
    /// still be open, and the option index must exist. A repeat vote
    /// replaces the voter's previous choice.
    ///
    /// # Returns
    /// The tally after the ballot landed, from the voter's perspective.
    pub async fn vote(
        &self,
        post_id: &str,
        voter_id: &str,
        voter_username: &str,
        option_index: usize,
    ) -> Result<TallySnapshot, AppError> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let content = PostContent::from_json(&post.content)?;
        let PostBody::Poll {
            options,
            expires_at,
            ..
        } = content.body
        else {
            return Err(AppError::Validation("Post is not a poll".to_string()));
        };

        let circle = self
            .db
            .get_circle(&post.circle_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.membership
            .authorize(&circle, voter_id, voter_username)
            .await?;

        if let Some(at) = expires_at {
            if Utc::now() >= at {
                return Err(AppError::Expired("This poll has closed".to_string()));
            }
        }

        if option_index >= options.len() {
            return Err(AppError::Validation(format!(
                "Option index {} is out of range",
                option_index
            )));
        }

        let vote = PollVote {
            post_id: post.id.clone(),
            voter_id: voter_id.to_string(),
            option_index: option_index as i64,
            voted_at: Utc::now(),
        };
        self.db.upsert_vote(&vote).await?;
        VOTES_CAST_TOTAL.inc();

        let votes = self.db.list_votes(&post.id).await?;
        Ok(tally_from_votes(&options, expires_at, &votes, Some(voter_id)))
    }
}
