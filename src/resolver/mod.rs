use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, SearchRequest, Track};

pub mod filter;

use filter::{derive_search_terms, is_music_content, is_near_duplicate};

pub const DEFAULT_MAX_RELATED: usize = 15;
pub const DEFAULT_GENERIC_QUERIES: &[&str] =
    &["popular music", "top songs", "music hits", "best songs playlist", "new music releases"];

const MAX_ID_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub max_related: usize,
    pub per_query: u32,
    pub generic_queries: Vec<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_related: DEFAULT_MAX_RELATED,
            per_query: 10,
            generic_queries: DEFAULT_GENERIC_QUERIES.iter().map(|q| q.to_string()).collect(),
        }
    }
}

/// One way of asking the catalog for tracks related to a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ChannelOfficial,
    TitleTerms,
    Popular,
    Trending,
}

/// Evaluation order; later strategies only run while the candidate list is short.
pub const STRATEGIES: [Strategy; 4] =
    [Strategy::ChannelOfficial, Strategy::TitleTerms, Strategy::Popular, Strategy::Trending];

impl Strategy {
    pub fn query(self, seed: &Track, terms: &[String]) -> Option<String> {
        match self {
            Strategy::ChannelOfficial => {
                let channel = seed.channel_name.trim();
                if channel.is_empty() { None } else { Some(format!("{channel} official music")) }
            }
            Strategy::TitleTerms => Some(format!("{} official music song", terms.join(" "))),
            Strategy::Popular => Some("popular music".to_string()),
            Strategy::Trending => Some("trending music".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Related,
    Generic,
    Singleton,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub tracks: Vec<Track>,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    fn singleton(seed: &Track) -> Self {
        Self { tracks: vec![seed.clone()], outcome: ResolutionOutcome::Singleton }
    }
}

/// Identifiers the catalog could plausibly have issued.
pub fn is_valid_track_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN && !id.chars().any(char::is_whitespace)
}

/// Turns a seed track into autoplay candidates. Never fails: the worst case is
/// a queue holding only the seed.
pub struct RelatedResolver {
    catalog: Arc<dyn CatalogClient>,
    settings: ResolverSettings,
    rng: Mutex<StdRng>,
}

impl RelatedResolver {
    pub fn new(catalog: Arc<dyn CatalogClient>, settings: ResolverSettings) -> Self {
        Self::with_rng(catalog, settings, StdRng::from_os_rng())
    }

    /// Deterministic generic-query choice.
    pub fn with_seed(catalog: Arc<dyn CatalogClient>, settings: ResolverSettings, seed: u64) -> Self {
        Self::with_rng(catalog, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: Arc<dyn CatalogClient>, settings: ResolverSettings, rng: StdRng) -> Self {
        Self { catalog, settings, rng: Mutex::new(rng) }
    }

    fn pick_generic_query(&self) -> Option<String> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.settings.generic_queries.choose(&mut *rng).cloned()
    }

    pub async fn resolve(&self, seed: &Track) -> Resolution {
        if !is_valid_track_id(&seed.id) {
            warn!(track = %seed.id, "invalid seed id; using singleton queue");
            return Resolution::singleton(seed);
        }

        let terms = derive_search_terms(&seed.title);
        let mut seen = HashSet::new();
        let mut collected = Vec::new();

        for strategy in STRATEGIES {
            if collected.len() >= self.settings.max_related {
                break;
            }
            let Some(query) = strategy.query(seed, &terms) else { continue };
            let candidates = self.run_query(&query).await;
            let before = collected.len();
            self.accept(seed, candidates, &mut seen, &mut collected);
            debug!(?strategy, %query, added = collected.len() - before, "related strategy evaluated");
        }

        if !collected.is_empty() {
            info!(track = %seed.id, count = collected.len(), "related tracks resolved");
            return Resolution { tracks: collected, outcome: ResolutionOutcome::Related };
        }

        let generic = self.pick_generic_query();
        if let Some(query) = generic {
            let candidates = self.run_query(&query).await;
            self.accept(seed, candidates, &mut seen, &mut collected);
            if !collected.is_empty() {
                info!(track = %seed.id, %query, count = collected.len(), "using generic music fallback");
                return Resolution { tracks: collected, outcome: ResolutionOutcome::Generic };
            }
        }

        warn!(track = %seed.id, "no related tracks found; using singleton queue");
        Resolution::singleton(seed)
    }

    async fn run_query(&self, query: &str) -> Vec<Track> {
        let req = SearchRequest::music(query, self.settings.per_query);
        match self.catalog.search(&req).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(%query, catalog = self.catalog.name(), error = %e, "related query failed");
                Vec::new()
            }
        }
    }

    fn accept(&self, seed: &Track, candidates: Vec<Track>, seen: &mut HashSet<String>, out: &mut Vec<Track>) {
        for c in candidates {
            if out.len() >= self.settings.max_related {
                break;
            }
            if c.id == seed.id || !is_valid_track_id(&c.id) {
                continue;
            }
            if !is_music_content(&c.title) || is_near_duplicate(&c.title, &seed.title) {
                continue;
            }
            if seen.insert(c.id.clone()) {
                out.push(c);
            }
        }
    }
}
