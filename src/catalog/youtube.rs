use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{CatalogClient, CatalogError, SearchRequest, Track, TrackDetails};
use crate::utils::fmt::parse_iso_duration;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube Data API v3 search client.
pub struct YouTubeCatalog {
    http: Client,
    base_url: String,
    api_key: String,
}

impl YouTubeCatalog {
    pub fn new(api_key: &str, base_url: &str, timeout_ms: u64) -> Result<Self, CatalogError> {
        let http = Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?;
        Url::parse(base_url)?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), api_key: api_key.to_string() })
    }

    fn search_url(&self, req: &SearchRequest) -> Result<Url, CatalogError> {
        let max = req.max_results.clamp(1, 50).to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("part", "snippet"),
            ("type", "video"),
            ("maxResults", max.as_str()),
            ("q", req.query.as_str()),
        ];
        if let Some(cat) = &req.category {
            params.push(("videoCategoryId", cat.as_str()));
        }
        params.push(("key", self.api_key.as_str()));
        Ok(Url::parse_with_params(&format!("{}/search", self.base_url), &params)?)
    }

    fn videos_url(&self, ids: &[String]) -> Result<Url, CatalogError> {
        let joined = ids.join(",");
        Ok(Url::parse_with_params(
            &format!("{}/videos", self.base_url),
            &[("part", "snippet,statistics,contentDetails"), ("id", joined.as_str()), ("key", self.api_key.as_str())],
        )?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        decode_body(status, &body)
    }
}

impl CatalogClient for YouTubeCatalog {
    fn search<'a>(&'a self, req: &'a SearchRequest) -> BoxFuture<'a, Result<Vec<Track>, CatalogError>> {
        Box::pin(async move {
            let url = self.search_url(req)?;
            debug!(query = %req.query, max = req.max_results, "catalog search");
            let page: SearchPage = self.get_json(url).await?;
            Ok(page.into_tracks())
        })
    }

    fn details<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<(String, TrackDetails)>, CatalogError>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let url = self.videos_url(ids)?;
            let page: VideosPage = self.get_json(url).await?;
            Ok(page.into_details())
        })
    }

    fn name(&self) -> &'static str {
        "youtube"
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: String,
}

fn classify(err: ApiErrorBody, status: StatusCode) -> CatalogError {
    let code = if err.code == 0 { status.as_u16() } else { err.code };
    let quota_reason =
        err.errors.iter().any(|e| e.reason.to_lowercase().contains("quota") || e.reason == "dailyLimitExceeded");
    if code == 403 && (err.message.to_lowercase().contains("quota") || quota_reason) {
        return CatalogError::QuotaExceeded(err.message);
    }
    if code == 429 {
        return CatalogError::RateLimited;
    }
    CatalogError::Api { code, message: err.message }
}

pub(crate) fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, CatalogError> {
    if let Ok(env) = serde_json::from_slice::<ErrorEnvelope>(body) {
        return Err(classify(env.error, status));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CatalogError::RateLimited);
    }
    if !status.is_success() {
        return Err(CatalogError::Api {
            code: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown").to_string(),
        });
    }
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize, Default)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl SearchPage {
    fn into_tracks(self) -> Vec<Track> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id.filter(|v| !v.is_empty())?;
                let thumbs = item.snippet.thumbnails;
                let thumbnail_url = thumbs.medium.or(thumbs.high).or(thumbs.default).map(|t| t.url);
                Some(Track {
                    id,
                    title: unescape_html(&item.snippet.title),
                    channel_name: unescape_html(&item.snippet.channel_title),
                    thumbnail_url,
                    details: None,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct VideosPage {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    #[serde(default)]
    statistics: Option<Statistics>,
    #[serde(rename = "contentDetails", default)]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

impl VideosPage {
    fn into_details(self) -> Vec<(String, TrackDetails)> {
        self.items
            .into_iter()
            .map(|v| {
                let stats = v.statistics.as_ref();
                let details = TrackDetails {
                    view_count: stats.and_then(|s| s.view_count.as_deref()).and_then(|c| c.parse().ok()),
                    like_count: stats.and_then(|s| s.like_count.as_deref()).and_then(|c| c.parse().ok()),
                    duration_secs: v
                        .content_details
                        .as_ref()
                        .and_then(|c| c.duration.as_deref())
                        .and_then(parse_iso_duration),
                };
                (v.id, details)
            })
            .collect()
    }
}

// The search endpoint returns titles HTML-escaped.
fn unescape_html(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
