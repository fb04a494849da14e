//! Post content variants
//!
//! A post's content is a tagged variant: exactly one payload shape per
//! `post_type`. Validation is pure and exhaustive over the variants, so
//! adding a type means adding a case, not another flag check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 10;

/// A single poll option. Ballots reference options by index; vote sets are
/// stored relationally, never inside the content JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
}

/// Stored post content: the tagged payload plus free-form tags.
///
/// Tags are canonicalized (trimmed, lowercased, deduplicated, sorted)
/// before storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostContent {
    #[serde(flatten)]
    pub body: PostBody,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// The per-type payload, tagged by `post_type`.
///
/// Payloads produced by external collaborators (video entries, wishlist
/// items, upload descriptors, resolved playlist metadata) are kept as
/// opaque JSON values; their shape is owned by the producing side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum PostBody {
    Standard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    YtPlaylist {
        playlist_name: String,
        videos: Vec<serde_json::Value>,
    },
    Poll {
        question: String,
        options: Vec<PollOption>,
        duration_hours: i64,
        /// Set at ingestion time from `duration_hours`; absent on submission
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
    Wishlist {
        items: Vec<serde_json::Value>,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    SpotifyPlaylist {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        playlist: Option<serde_json::Value>,
    },
}

fn is_blank(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
}

impl PostBody {
    /// The wire tag for this variant
    pub fn post_type(&self) -> &'static str {
        match self {
            Self::Standard { .. } => "standard",
            Self::YtPlaylist { .. } => "yt_playlist",
            Self::Poll { .. } => "poll",
            Self::Wishlist { .. } => "wishlist",
            Self::Image { .. } => "image",
            Self::SpotifyPlaylist { .. } => "spotify_playlist",
        }
    }

    pub fn is_poll(&self) -> bool {
        matches!(self, Self::Poll { .. })
    }
}

impl PostContent {
    /// Validate the payload against its declared type's required fields.
    ///
    /// Pure: no I/O, no clock reads. Poll expiry is checked at vote time,
    /// not here.
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.body {
            PostBody::Standard { text, link } => {
                if is_blank(text) && is_blank(link) {
                    return Err(AppError::Validation(
                        "standard posts require text or a link".to_string(),
                    ));
                }
            }
            PostBody::YtPlaylist {
                playlist_name,
                videos,
            } => {
                if playlist_name.trim().is_empty() {
                    return Err(AppError::Validation(
                        "playlist posts require a playlist name".to_string(),
                    ));
                }
                if videos.is_empty() {
                    return Err(AppError::Validation(
                        "playlist posts require at least one video".to_string(),
                    ));
                }
            }
            PostBody::Poll {
                question,
                options,
                duration_hours,
                ..
            } => {
                if question.trim().is_empty() {
                    return Err(AppError::Validation(
                        "poll posts require a question".to_string(),
                    ));
                }
                if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&options.len()) {
                    return Err(AppError::Validation(format!(
                        "poll options must be between {} and {}",
                        MIN_POLL_OPTIONS, MAX_POLL_OPTIONS
                    )));
                }
                if options.iter().any(|option| option.text.trim().is_empty()) {
                    return Err(AppError::Validation(
                        "poll options must not be empty".to_string(),
                    ));
                }
                if *duration_hours <= 0 {
                    return Err(AppError::Validation(
                        "poll duration must be a positive number of hours".to_string(),
                    ));
                }
            }
            PostBody::Wishlist { items } => {
                if items.is_empty() {
                    return Err(AppError::Validation(
                        "wishlist posts require at least one item".to_string(),
                    ));
                }
            }
            PostBody::Image { image, link } => {
                if image.is_none() && is_blank(link) {
                    return Err(AppError::Validation(
                        "image posts require an image or a direct link".to_string(),
                    ));
                }
            }
            PostBody::SpotifyPlaylist { link, playlist } => {
                if is_blank(link) && playlist.is_none() {
                    return Err(AppError::Validation(
                        "spotify playlist posts require a link or playlist metadata".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Serialize for storage
    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize content: {e}")))
    }

    /// Deserialize a stored content column
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("stored content is malformed: {e}")))
    }
}

/// Canonicalize free-form tags: trim, lowercase, drop empties, dedup, sort.
///
/// Idempotent: `normalize_tags(&normalize_tags(t)) == normalize_tags(t)`.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}
