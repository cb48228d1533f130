use crate::extractor::models::MediaInfo;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Core trait for metadata extraction and direct-URL resolution
///
/// The pipelines only need these two read-only operations from the
/// extractor, which keeps them testable without a real yt-dlp.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Returns a unique identifier for this extractor (e.g. "yt-dlp")
    fn id(&self) -> &'static str;

    /// Reads title, duration, thumbnail and the format catalog without
    /// fetching any media
    async fn probe(&self, url: &str) -> Result<MediaInfo>;

    /// Resolves a direct stream URL for `expression` without fetching it
    async fn resolve_direct_url(&self, url: &str, expression: &str) -> Result<String>;
}
