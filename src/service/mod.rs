//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database access and authorization checks.

mod ballot;
mod feed;
mod ingest;
mod membership;
mod seen;

pub use ballot::{BallotService, TallyOption, TallySnapshot, tally_from_votes};
pub use feed::{EnrichedPost, FeedPage, FeedService};
pub use ingest::IngestService;
pub use membership::MembershipService;
pub use seen::{SeenService, SeenStatus, SeenUser, UnseenUser};
