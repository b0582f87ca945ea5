use std::hash::{Hash, Hasher};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub mod curated;
pub mod suggest;
pub mod youtube;

pub use curated::CuratedCatalog;
pub use youtube::YouTubeCatalog;

/// Catalog category id for music.
pub const MUSIC_CATEGORY: &str = "10";

/// A playable catalog entry. Identity is the catalog id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default, alias = "channel")]
    pub channel_name: String,
    #[serde(default, alias = "thumbnail", skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TrackDetails>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), channel_name: channel_name.into(), thumbnail_url: None, details: None }
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDetails {
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub category: Option<String>,
}

impl SearchRequest {
    pub fn music(query: impl Into<String>, max_results: u32) -> Self {
        Self { query: query.into(), max_results, category: Some(MUSIC_CATEGORY.to_string()) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("catalog rate limited")]
    RateLimited,
    #[error("catalog api error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid catalog url: {0}")]
    Url(#[from] url::ParseError),
}

impl CatalogError {
    /// Quota and rate-limit errors switch the caller to curated content instead of failing.
    pub fn is_quota(&self) -> bool {
        matches!(self, CatalogError::QuotaExceeded(_) | CatalogError::RateLimited)
    }
}

/// Search provider returning ranked candidate tracks.
pub trait CatalogClient: Send + Sync {
    fn search<'a>(&'a self, req: &'a SearchRequest) -> BoxFuture<'a, Result<Vec<Track>, CatalogError>>;

    fn details<'a>(
        &'a self,
        _ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<(String, TrackDetails)>, CatalogError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn name(&self) -> &'static str;
}

/// Attach details fetched by id onto the matching tracks.
pub fn merge_details(tracks: &mut [Track], details: Vec<(String, TrackDetails)>) {
    for (id, d) in details {
        if let Some(t) = tracks.iter_mut().find(|t| t.id == id) {
            t.details = Some(d);
        }
    }
}
