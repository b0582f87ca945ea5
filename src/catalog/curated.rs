use futures::future::BoxFuture;

use super::{CatalogClient, CatalogError, SearchRequest, Track};

const CURATED: &[(&str, &str, &str)] = &[
    ("jfKfPfyJRdk", "Chill Lofi Beats", "Lofi Girl"),
    ("GRxofEmo3HA", "Classical Music for Studying", "HALIDONMUSIC"),
    ("Dx5qFachd3A", "Jazz & Bossa Nova", "Cafe Music BGM channel"),
    ("UceaB4D0jpo", "Upbeat Pop Hits", "TopMusicMafia"),
];

/// Hand-picked tracks shown when the live catalog is unavailable.
pub fn curated_tracks() -> Vec<Track> {
    CURATED
        .iter()
        .map(|(id, title, channel)| {
            Track::new(*id, *title, *channel).with_thumbnail(format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg"))
        })
        .collect()
}

/// Offline catalog over the curated list. Queries match on any shared word;
/// a query sharing nothing returns the whole list so autoplay never starves.
#[derive(Default)]
pub struct CuratedCatalog;

impl CatalogClient for CuratedCatalog {
    fn search<'a>(&'a self, req: &'a SearchRequest) -> BoxFuture<'a, Result<Vec<Track>, CatalogError>> {
        Box::pin(async move {
            let words: Vec<String> = req.query.to_lowercase().split_whitespace().map(str::to_string).collect();
            let all = curated_tracks();
            let matched: Vec<Track> = all
                .iter()
                .filter(|t| {
                    let hay = format!("{} {}", t.title, t.channel_name).to_lowercase();
                    words.iter().any(|w| hay.split_whitespace().any(|h| h == w))
                })
                .cloned()
                .collect();
            let mut out = if matched.is_empty() { all } else { matched };
            out.truncate(req.max_results as usize);
            Ok(out)
        })
    }

    fn name(&self) -> &'static str {
        "curated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_words_or_returns_everything() {
        let cat = CuratedCatalog;
        let jazz = cat.search(&SearchRequest::music("smooth jazz", 10)).await.unwrap();
        assert_eq!(jazz.len(), 1);
        assert_eq!(jazz[0].id, "Dx5qFachd3A");

        let none = cat.search(&SearchRequest::music("zzzz", 10)).await.unwrap();
        assert_eq!(none.len(), CURATED.len());

        let capped = cat.search(&SearchRequest::music("zzzz", 2)).await.unwrap();
        assert_eq!(capped.len(), 2);
    }
}
