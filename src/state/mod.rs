use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{info, warn};

use crate::catalog::suggest::RecentSearches;
use crate::catalog::{CatalogClient, CuratedCatalog, YouTubeCatalog};
use crate::config::EffectiveConfig;
use crate::queue::QueuePolicy;
use crate::resolver::RelatedResolver;
use crate::session::PlaybackSession;
use crate::widget::{EmbedParams, EmbedWidget};

#[derive(Clone)]
pub struct SessionEntry {
    pub session: Arc<PlaybackSession>,
    pub embed: Arc<EmbedWidget>,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<DashMap<String, SessionEntry>>,
    pub cfg: Arc<EffectiveConfig>,
    pub catalog: Arc<dyn CatalogClient>,
    pub resolver: Arc<RelatedResolver>,
    pub recent: Arc<Mutex<RecentSearches>>,
}

impl AppState {
    pub fn new(cfg: EffectiveConfig, catalog: Arc<dyn CatalogClient>) -> Self {
        let resolver = Arc::new(RelatedResolver::new(catalog.clone(), cfg.resolver_settings()));
        Self {
            sessions: Arc::new(DashMap::new()),
            cfg: Arc::new(cfg),
            catalog,
            resolver,
            recent: Arc::new(Mutex::new(RecentSearches::default())),
        }
    }

    /// Live catalog when an API key is configured, the curated list otherwise.
    pub fn from_config(cfg: EffectiveConfig) -> Self {
        let catalog: Arc<dyn CatalogClient> = match cfg.api_key.as_deref() {
            Some(key) => match YouTubeCatalog::new(key, &cfg.catalog_url, cfg.catalog_timeout_ms) {
                Ok(c) => Arc::new(c),
                Err(e) => {
                    warn!(error = %e, "catalog client unavailable; serving curated tracks");
                    Arc::new(CuratedCatalog)
                }
            },
            None => {
                warn!("no catalog API key configured; serving curated tracks");
                Arc::new(CuratedCatalog)
            }
        };
        Self::new(cfg, catalog)
    }

    /// Creates a session with its own embed widget and starts its event loop.
    /// Returns `None` when `id` is taken.
    pub fn open_session(&self, id: &str) -> Option<SessionEntry> {
        if self.sessions.contains_key(id) {
            return None;
        }
        let embed = Arc::new(EmbedWidget::new(EmbedParams::new(&self.cfg.origin)));
        let session = Arc::new(PlaybackSession::new(
            id,
            embed.clone(),
            self.resolver.clone(),
            self.cfg.session_settings(),
            QueuePolicy::new(),
        ));
        session.spawn();
        let entry = SessionEntry { session, embed };
        self.sessions.insert(id.to_string(), entry.clone());
        info!(session = %id, "session opened");
        Some(entry)
    }

    pub fn session(&self, id: &str) -> Option<SessionEntry> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    pub fn record_search(&self, query: &str) {
        match self.recent.lock() {
            Ok(mut r) => r.record(query),
            Err(poisoned) => poisoned.into_inner().record(query),
        }
    }

    pub fn recent_searches(&self) -> Vec<String> {
        match self.recent.lock() {
            Ok(r) => r.list(),
            Err(poisoned) => poisoned.into_inner().list(),
        }
    }
}
