//! Link enrichment
//!
//! Inspects links on plain posts and reclassifies them as image posts
//! when the link clearly points at an image. Enrichment is best effort:
//! any parse or network failure leaves the post untouched.

use std::time::Duration;

use crate::config::EnrichmentConfig;
use crate::data::{PostBody, PostContent};
use crate::metrics::ENRICHMENT_OUTCOMES_TOTAL;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Reclassify a plain link-only post as an image post when the link is
/// recognizably an image. Applies only to standard posts with no text;
/// everything else passes through unchanged.
pub async fn reclassify_image_link(
    client: &reqwest::Client,
    config: &EnrichmentConfig,
    content: PostContent,
) -> PostContent {
    let link = match &content.body {
        PostBody::Standard { text, link: Some(link) }
            if text.as_deref().map_or(true, |t| t.trim().is_empty()) =>
        {
            link.clone()
        }
        _ => return content,
    };

    if link_has_image_extension(&link) {
        ENRICHMENT_OUTCOMES_TOTAL
            .with_label_values(&["promoted"])
            .inc();
        return PostContent {
            body: PostBody::Image {
                image: None,
                link: Some(link),
            },
            tags: content.tags,
        };
    }

    if config.probe_links {
        if probe_is_image(client, &link, config.probe_timeout_ms).await {
            ENRICHMENT_OUTCOMES_TOTAL
                .with_label_values(&["promoted"])
                .inc();
            return PostContent {
                body: PostBody::Image {
                    image: None,
                    link: Some(link),
                },
                tags: content.tags,
            };
        }
        ENRICHMENT_OUTCOMES_TOTAL
            .with_label_values(&["failed"])
            .inc();
    } else {
        ENRICHMENT_OUTCOMES_TOTAL
            .with_label_values(&["unchanged"])
            .inc();
    }

    content
}

/// Check whether the URL path ends in a known image extension.
fn link_has_image_extension(link: &str) -> bool {
    let Ok(url) = url::Url::parse(link) else {
        return false;
    };

    let path = url.path().to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext)))
}

/// Issue a HEAD request and check whether the response advertises an
/// image content type. Any error or timeout counts as "not an image".
async fn probe_is_image(client: &reqwest::Client, link: &str, timeout_ms: u64) -> bool {
    let response = match client
        .head(link)
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
    {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(link = %link, error = %error, "link probe failed");
            return false;
        }
    };

    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("image/"))
        .unwrap_or(false)
}
