#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tunecast::catalog::{CatalogClient, CatalogError, SearchRequest, Track};
use tunecast::queue::QueuePolicy;
use tunecast::resolver::{RelatedResolver, ResolverSettings};
use tunecast::session::{PlaybackSession, SessionSettings, SessionSnapshot};
use tunecast::widget::{
    EmbedParams, EmbedWidget, InstanceId, PlaybackWidget, PlayerState, WidgetEvent, WidgetEventKind,
};

/// Catalog answering from a table after a fixed delay. Unknown queries fail.
#[derive(Default)]
pub struct SlowCatalog {
    answers: HashMap<String, Vec<Track>>,
    default: Option<Vec<Track>>,
    delay: Duration,
    seen: Mutex<Vec<String>>,
}

impl SlowCatalog {
    pub fn new(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }

    pub fn answer(mut self, query: &str, tracks: Vec<Track>) -> Self {
        self.answers.insert(query.to_string(), tracks);
        self
    }

    pub fn otherwise(mut self, tracks: Vec<Track>) -> Self {
        self.default = Some(tracks);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl CatalogClient for SlowCatalog {
    fn search<'a>(&'a self, req: &'a SearchRequest) -> BoxFuture<'a, Result<Vec<Track>, CatalogError>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(req.query.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.answers.get(&req.query).or(self.default.as_ref()) {
                Some(t) => Ok(t.clone()),
                None => Err(CatalogError::Api { code: 503, message: "unavailable".into() }),
            }
        })
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Delegates to an [`EmbedWidget`] and records which controls the session used.
pub struct RecordingWidget {
    embed: Arc<EmbedWidget>,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingWidget {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlaybackWidget for RecordingWidget {
    fn load(&self, track_id: &str) -> InstanceId {
        self.record("load");
        self.embed.load(track_id)
    }

    fn play(&self) -> bool {
        self.record("play");
        self.embed.play()
    }

    fn pause(&self) -> bool {
        self.record("pause");
        self.embed.pause()
    }

    fn seek(&self, seconds: f64) -> bool {
        self.record("seek");
        self.embed.seek(seconds)
    }

    fn set_volume(&self, level: f32) -> bool {
        self.record("set_volume");
        self.embed.set_volume(level)
    }

    fn mute(&self) -> bool {
        self.record("mute");
        self.embed.mute()
    }

    fn unmute(&self) -> bool {
        self.record("unmute");
        self.embed.unmute()
    }

    fn current_time(&self) -> Option<f64> {
        self.embed.current_time()
    }

    fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.embed.subscribe()
    }

    fn teardown(&self) {
        self.record("teardown");
        self.embed.teardown()
    }
}

pub struct Harness {
    pub session: Arc<PlaybackSession>,
    pub embed: Arc<EmbedWidget>,
    pub widget: Arc<RecordingWidget>,
    pub catalog: Arc<SlowCatalog>,
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        settle_delay: Duration::from_millis(500),
        reload_timeout: Duration::from_secs(10),
        tick: Duration::from_secs(1),
    }
}

pub fn harness(catalog: SlowCatalog) -> Harness {
    harness_with(catalog, settings())
}

pub fn harness_with(catalog: SlowCatalog, settings: SessionSettings) -> Harness {
    let catalog = Arc::new(catalog);
    let resolver = Arc::new(RelatedResolver::new(catalog.clone(), ResolverSettings::default()));
    let embed = Arc::new(EmbedWidget::new(EmbedParams::new("http://localhost:2480")));
    let widget = Arc::new(RecordingWidget { embed: embed.clone(), calls: Mutex::new(Vec::new()) });
    let session =
        Arc::new(PlaybackSession::new("test", widget.clone(), resolver, settings, QueuePolicy::with_seed(7)));
    session.spawn();
    Harness { session, embed, widget, catalog }
}

pub fn track(id: &str, title: &str, channel: &str) -> Track {
    Track::new(id, title, channel)
}

impl Harness {
    fn report(&self, kind: WidgetEventKind) -> bool {
        match self.embed.live_instance() {
            Some(instance) => self.embed.report(WidgetEvent { instance, kind }),
            None => false,
        }
    }

    pub fn ready(&self, duration: f64) -> bool {
        self.report(WidgetEventKind::Ready { duration })
    }

    pub fn state(&self, state: PlayerState) -> bool {
        self.report(WidgetEventKind::StateChange { state })
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot().await
    }

    pub async fn now_playing(&self) -> Option<String> {
        self.snapshot().await.now_playing.map(|t| t.id)
    }

    pub async fn queue_ids(&self) -> Vec<String> {
        self.snapshot().await.queue.into_iter().map(|t| t.id).collect()
    }

    /// Polls until `check` holds on a snapshot, advancing virtual time in small steps.
    pub async fn wait_until(&self, check: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        for _ in 0..2_000 {
            let snap = self.snapshot().await;
            if check(&snap) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached; last snapshot: {:?}", self.snapshot().await);
    }
}

/// Lets the session task drain pending widget events.
pub async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}
