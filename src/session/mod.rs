use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::catalog::Track;
use crate::queue::{PlaybackModes, QueuePolicy, Step};
use crate::resolver::{RelatedResolver, ResolutionOutcome};
use crate::utils::fmt::format_time;
use crate::widget::{InstanceId, PlaybackWidget, PlayerState, WidgetEvent, WidgetEventKind};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Pause between queue population and the deferred advance after `ended`.
    pub settle_delay: Duration,
    /// A reload that never reports ready stops blocking navigation after this long.
    pub reload_timeout: Duration,
    pub tick: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            reload_timeout: Duration::from_secs(10),
            tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavError {
    #[error("queue is empty")]
    Empty,
    #[error("reached the end of the queue")]
    EndOfQueue,
    #[error("previous track is still loading")]
    Busy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    NowPlaying { track: Track, generation: u64 },
    QueueUpdated { generation: u64, len: usize, outcome: ResolutionOutcome },
    Progress { elapsed: f64, duration: f64 },
    Playing { is_playing: bool },
    Modes { modes: PlaybackModes },
    Stopped { reason: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub generation: u64,
    pub seed: Option<Track>,
    pub now_playing: Option<Track>,
    pub queue: Vec<Track>,
    pub cursor: Option<usize>,
    pub modes: PlaybackModes,
    pub is_playing: bool,
    pub resolving: bool,
    pub elapsed: f64,
    pub duration: f64,
    pub elapsed_label: String,
    pub duration_label: String,
    pub volume: f32,
    pub muted: bool,
}

#[derive(Debug)]
struct Reload {
    instance: InstanceId,
    started: Instant,
}

struct Inner {
    queue: QueuePolicy,
    seed: Option<Track>,
    now_playing: Option<Track>,
    instance: Option<InstanceId>,
    is_playing: bool,
    elapsed: f64,
    duration: f64,
    volume: f32,
    muted: bool,
    reload: Option<Reload>,
    resolving: Option<u64>,
    pending_advance: bool,
    resolution: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

/// One listener's playback: a queue generation, the widget that plays it and
/// the resolver that fills it.
pub struct PlaybackSession {
    id: String,
    widget: Arc<dyn PlaybackWidget>,
    resolver: Arc<RelatedResolver>,
    settings: SessionSettings,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
    stop_tx: broadcast::Sender<()>,
}

impl PlaybackSession {
    pub fn new(
        id: &str,
        widget: Arc<dyn PlaybackWidget>,
        resolver: Arc<RelatedResolver>,
        settings: SessionSettings,
        queue: QueuePolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(128);
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            id: id.into(),
            widget,
            resolver,
            settings,
            inner: Mutex::new(Inner {
                queue,
                seed: None,
                now_playing: None,
                instance: None,
                is_playing: false,
                elapsed: 0.0,
                duration: 0.0,
                volume: 1.0,
                muted: false,
                reload: None,
                resolving: None,
                pending_advance: false,
                resolution: None,
                ticker: None,
            }),
            events,
            stop_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Subscribes to the widget and processes its events until [`PlaybackSession::close`].
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let widget_rx = self.widget.subscribe();
        let stop_rx = self.stop_tx.subscribe();
        tokio::spawn(Arc::clone(self).run(widget_rx, stop_rx))
    }

    async fn run(
        self: Arc<Self>,
        mut widget_rx: broadcast::Receiver<WidgetEvent>,
        mut stop_rx: broadcast::Receiver<()>,
    ) {
        info!(session = %self.id, "session started");
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                ev = widget_rx.recv() => match ev {
                    Ok(ev) => self.on_widget_event(ev).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session = %self.id, lost = n, "widget events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!(session = %self.id, "session stopped");
    }

    fn publish(&self, ev: SessionEvent) {
        let _ = self.events.send(ev);
    }

    /// Starts a new generation around `seed`: plays it and resolves related tracks in the background.
    pub async fn select_seed(self: &Arc<Self>, seed: Track) {
        let mut inner = self.inner.lock().await;
        let generation = inner.queue.start_generation();
        inner.seed = Some(seed.clone());
        inner.pending_advance = false;
        info!(session = %self.id, track = %seed.id, generation, "new seed selected");
        self.load_track(&mut inner, seed.clone());
        self.spawn_resolution(&mut inner, seed);
    }

    pub async fn next(&self) -> Result<Track, NavError> {
        let mut inner = self.inner.lock().await;
        self.user_navigate(&mut inner, QueuePolicy::advance)
    }

    pub async fn previous(&self) -> Result<Track, NavError> {
        let mut inner = self.inner.lock().await;
        self.user_navigate(&mut inner, QueuePolicy::retreat)
    }

    pub async fn toggle_shuffle(&self) -> PlaybackModes {
        let mut inner = self.inner.lock().await;
        inner.queue.toggle_shuffle();
        self.publish_modes(&inner)
    }

    pub async fn toggle_repeat(&self) -> PlaybackModes {
        let mut inner = self.inner.lock().await;
        inner.queue.toggle_repeat();
        self.publish_modes(&inner)
    }

    pub async fn toggle_loop(&self) -> PlaybackModes {
        let mut inner = self.inner.lock().await;
        inner.queue.toggle_loop();
        self.publish_modes(&inner)
    }

    pub async fn play(&self) -> bool {
        self.widget.play()
    }

    pub async fn pause(&self) -> bool {
        self.widget.pause()
    }

    pub async fn seek(&self, seconds: f64) -> bool {
        let mut inner = self.inner.lock().await;
        let applied = self.widget.seek(seconds);
        if applied {
            inner.elapsed = seconds.max(0.0);
        }
        applied
    }

    pub async fn set_volume(&self, level: f32) -> bool {
        let mut inner = self.inner.lock().await;
        inner.volume = level.clamp(0.0, 1.0);
        inner.muted = inner.volume == 0.0;
        self.widget.set_volume(inner.volume)
    }

    pub async fn mute(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.muted = true;
        self.widget.mute()
    }

    pub async fn unmute(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.muted = false;
        if inner.volume == 0.0 {
            inner.volume = 1.0;
            self.widget.set_volume(1.0);
        }
        self.widget.unmute()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            id: self.id.clone(),
            generation: inner.queue.generation(),
            seed: inner.seed.clone(),
            now_playing: inner.now_playing.clone(),
            queue: inner.queue.tracks().to_vec(),
            cursor: inner.queue.cursor(),
            modes: inner.queue.modes(),
            is_playing: inner.is_playing,
            resolving: inner.resolving.is_some(),
            elapsed: inner.elapsed,
            duration: inner.duration,
            elapsed_label: format_time(inner.elapsed),
            duration_label: format_time(inner.duration),
            volume: inner.volume,
            muted: inner.muted,
        }
    }

    /// Stops the event loop and the progress ticker and destroys the widget instance.
    pub async fn close(&self) {
        let _ = self.stop_tx.send(());
        let mut inner = self.inner.lock().await;
        stop_ticker(&mut inner);
        if let Some(handle) = inner.resolution.take() {
            handle.abort();
        }
        inner.pending_advance = false;
        inner.resolving = None;
        inner.is_playing = false;
        inner.instance = None;
        self.widget.teardown();
        self.publish(SessionEvent::Stopped { reason: "session closed".into() });
    }

    fn publish_modes(&self, inner: &Inner) -> PlaybackModes {
        let modes = inner.queue.modes();
        self.publish(SessionEvent::Modes { modes });
        modes
    }

    /// A load the listener asked for supersedes any autoplay still waiting on `ended`.
    fn user_navigate(&self, inner: &mut Inner, step: fn(&mut QueuePolicy) -> Step) -> Result<Track, NavError> {
        let res = self.navigate(inner, step);
        if res.is_ok() && inner.pending_advance {
            debug!(session = %self.id, "pending autoplay cancelled by navigation");
            inner.pending_advance = false;
        }
        res
    }

    fn navigate(&self, inner: &mut Inner, step: fn(&mut QueuePolicy) -> Step) -> Result<Track, NavError> {
        if let Some(reload) = &inner.reload {
            if reload.started.elapsed() < self.settings.reload_timeout {
                debug!(session = %self.id, instance = %reload.instance, "navigation rejected while reloading");
                return Err(NavError::Busy);
            }
            warn!(session = %self.id, instance = %reload.instance, "widget reload timed out");
            inner.reload = None;
        }
        match step(&mut inner.queue) {
            Step::Play(track) => {
                self.load_track(inner, track.clone());
                Ok(track)
            }
            Step::EndOfQueue => Err(NavError::EndOfQueue),
            Step::Empty => Err(NavError::Empty),
        }
    }

    fn load_track(&self, inner: &mut Inner, track: Track) {
        stop_ticker(inner);
        inner.is_playing = false;
        inner.elapsed = 0.0;
        inner.duration = 0.0;
        let instance = self.widget.load(&track.id);
        inner.instance = Some(instance);
        inner.reload = Some(Reload { instance, started: Instant::now() });
        inner.now_playing = Some(track.clone());
        self.publish(SessionEvent::NowPlaying { track, generation: inner.queue.generation() });
    }

    fn spawn_resolution(self: &Arc<Self>, inner: &mut Inner, seed: Track) {
        let generation = inner.queue.generation();
        inner.resolving = Some(generation);
        let handle = tokio::spawn(Arc::clone(self).resolve_generation(seed, generation));
        if let Some(previous) = inner.resolution.replace(handle) {
            previous.abort();
        }
    }

    async fn resolve_generation(self: Arc<Self>, seed: Track, generation: u64) {
        let resolution = self.resolver.resolve(&seed).await;

        let pending = {
            let mut inner = self.inner.lock().await;
            let same_seed = inner.seed.as_ref().is_some_and(|s| s.id == seed.id);
            if inner.queue.generation() != generation || !same_seed {
                debug!(session = %self.id, generation, "discarding resolution for a previous seed");
                return;
            }
            inner.resolving = None;
            let mut tracks = Vec::with_capacity(resolution.tracks.len() + 1);
            tracks.push(seed);
            tracks.extend(resolution.tracks);
            inner.queue.populate(tracks);
            let len = inner.queue.len();
            info!(session = %self.id, generation, len, outcome = ?resolution.outcome, "queue populated");
            self.publish(SessionEvent::QueueUpdated { generation, len, outcome: resolution.outcome });
            inner.pending_advance
        };

        if !pending {
            return;
        }
        tokio::time::sleep(self.settings.settle_delay).await;
        let mut inner = self.inner.lock().await;
        if inner.queue.generation() != generation || !inner.pending_advance {
            return;
        }
        inner.pending_advance = false;
        self.advance_after_end(&mut inner);
    }

    fn advance_after_end(&self, inner: &mut Inner) {
        match self.navigate(inner, QueuePolicy::advance) {
            Ok(track) => debug!(session = %self.id, track = %track.id, "autoplay advanced"),
            Err(NavError::Busy) => debug!(session = %self.id, "autoplay skipped while a track is loading"),
            Err(e) => {
                info!(session = %self.id, reason = %e, "autoplay stopped");
                self.publish(SessionEvent::Stopped { reason: e.to_string() });
            }
        }
    }

    fn on_track_ended(self: &Arc<Self>, inner: &mut Inner) {
        if !inner.queue.is_empty() {
            self.advance_after_end(inner);
            return;
        }
        let Some(seed) = inner.seed.clone() else { return };
        inner.pending_advance = true;
        if inner.resolving != Some(inner.queue.generation()) {
            self.spawn_resolution(inner, seed);
        }
    }

    async fn on_widget_event(self: &Arc<Self>, ev: WidgetEvent) {
        let mut inner = self.inner.lock().await;
        if inner.instance != Some(ev.instance) {
            debug!(session = %self.id, instance = %ev.instance, "ignoring event for replaced instance");
            return;
        }
        match ev.kind {
            WidgetEventKind::Ready { duration } => {
                inner.duration = duration.max(0.0);
                clear_reload(&mut inner, ev.instance);
                self.widget.set_volume(inner.volume);
                if inner.muted {
                    self.widget.mute();
                }
                self.publish(SessionEvent::Progress { elapsed: inner.elapsed, duration: inner.duration });
            }
            WidgetEventKind::StateChange { state } => match state {
                PlayerState::Playing => self.set_playing(&mut inner, true),
                PlayerState::Buffering => {}
                PlayerState::Ended => {
                    self.set_playing(&mut inner, false);
                    self.on_track_ended(&mut inner);
                }
                PlayerState::Paused | PlayerState::Unstarted | PlayerState::Cued | PlayerState::Error => {
                    self.set_playing(&mut inner, false)
                }
            },
            WidgetEventKind::Time { current } => inner.elapsed = current.max(0.0),
            WidgetEventKind::Error { message } => {
                clear_reload(&mut inner, ev.instance);
                self.set_playing(&mut inner, false);
                warn!(session = %self.id, %message, "widget error");
                self.publish(SessionEvent::Error { message });
            }
        }
    }

    fn set_playing(self: &Arc<Self>, inner: &mut Inner, playing: bool) {
        if inner.is_playing == playing {
            return;
        }
        inner.is_playing = playing;
        if playing {
            inner.ticker = Some(spawn_ticker(Arc::downgrade(self), self.settings.tick));
        } else {
            stop_ticker(inner);
        }
        self.publish(SessionEvent::Playing { is_playing: playing });
    }

    async fn on_tick(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.is_playing {
            return;
        }
        if let Some(t) = self.widget.current_time() {
            inner.elapsed = t;
        }
        self.publish(SessionEvent::Progress { elapsed: inner.elapsed, duration: inner.duration });
    }
}

fn clear_reload(inner: &mut Inner, instance: InstanceId) {
    if inner.reload.as_ref().is_some_and(|r| r.instance == instance) {
        inner.reload = None;
    }
}

fn stop_ticker(inner: &mut Inner) {
    if let Some(handle) = inner.ticker.take() {
        handle.abort();
    }
}

fn spawn_ticker(session: Weak<PlaybackSession>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.tick().await;
        loop {
            tick.tick().await;
            let Some(session) = session.upgrade() else { break };
            session.on_tick().await;
        }
    })
}
