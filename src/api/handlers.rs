use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::{http::StatusCode, response::IntoResponse, Json};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::catalog::curated::curated_tracks;
use crate::catalog::suggest::suggestions;
use crate::catalog::{merge_details, CatalogClient, SearchRequest, Track};
use crate::queue::PlaybackModes;
use crate::session::{NavError, SessionSnapshot};
use crate::state::{AppState, SessionEntry};
use crate::utils::fmt::{format_count, format_time};
use crate::widget::{WidgetCommand, WidgetEvent};

const SEARCH_SUFFIX: &str = " music song";
const QUOTA_MESSAGE: &str = "Daily search limit reached. Here are some curated picks while the quota resets.";
const UPSTREAM_MESSAGE: &str = "Search is temporarily unavailable. Please try again in a moment.";
const NO_RESULTS_MESSAGE: &str = "No music found. Try a different search.";

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub track: Track,
    pub duration_label: Option<String>,
    pub views_label: Option<String>,
    pub likes_label: Option<String>,
}

impl From<Track> for SearchHit {
    fn from(track: Track) -> Self {
        let d = track.details;
        Self {
            duration_label: d.and_then(|d| d.duration_secs).map(|s| format_time(s as f64)),
            views_label: d.and_then(|d| d.view_count).map(format_count),
            likes_label: d.and_then(|d| d.like_count).map(format_count),
            track,
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct SearchRes {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub message: Option<String>,
    pub quota_exceeded: bool,
    pub curated: Vec<Track>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SearchFailure {
    BlankQuery,
    Upstream,
}

/// Music search with detail enrichment and the quota fallback.
pub async fn run_search(catalog: &dyn CatalogClient, query: &str, max_results: u32) -> Result<SearchRes, SearchFailure> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchFailure::BlankQuery);
    }
    let req = SearchRequest::music(format!("{query}{SEARCH_SUFFIX}"), max_results);
    let mut tracks = match catalog.search(&req).await {
        Ok(t) => t,
        Err(e) if e.is_quota() => {
            warn!(%query, error = %e, "catalog quota exhausted; offering curated tracks");
            return Ok(SearchRes {
                query: query.into(),
                message: Some(QUOTA_MESSAGE.into()),
                quota_exceeded: true,
                curated: curated_tracks(),
                ..Default::default()
            });
        }
        Err(e) => {
            warn!(%query, error = %e, "catalog search failed");
            return Err(SearchFailure::Upstream);
        }
    };

    if tracks.is_empty() {
        return Ok(SearchRes { query: query.into(), message: Some(NO_RESULTS_MESSAGE.into()), ..Default::default() });
    }

    let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
    match catalog.details(&ids).await {
        Ok(details) => merge_details(&mut tracks, details),
        Err(e) => debug!(%query, error = %e, "detail enrichment failed"),
    }

    Ok(SearchRes {
        query: query.into(),
        results: tracks.into_iter().map(SearchHit::from).collect(),
        ..Default::default()
    })
}

pub async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> impl IntoResponse {
    match run_search(state.catalog.as_ref(), &q.q, state.cfg.search_results).await {
        Ok(res) => {
            state.record_search(&q.q);
            (StatusCode::OK, Json(res)).into_response()
        }
        Err(SearchFailure::BlankQuery) => (StatusCode::BAD_REQUEST, "missing q param").into_response(),
        Err(SearchFailure::Upstream) => (StatusCode::BAD_GATEWAY, UPSTREAM_MESSAGE).into_response(),
    }
}

pub async fn search_suggestions(Query(q): Query<SearchQuery>) -> Json<Vec<String>> {
    Json(suggestions(&q.q))
}

pub async fn recent_searches(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.recent_searches())
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionReq {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub seed: Option<Track>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionRes {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct VolumeReq {
    pub level: f32,
}

#[derive(Debug, Deserialize)]
pub struct SeekReq {
    pub seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct Applied {
    pub applied: bool,
}

fn entry(state: &AppState, id: &str) -> Result<SessionEntry, StatusCode> {
    state.session(id).ok_or(StatusCode::NOT_FOUND)
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionReq>,
) -> Result<impl IntoResponse, StatusCode> {
    let id = req.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let entry = state.open_session(&id).ok_or(StatusCode::CONFLICT)?;
    if let Some(seed) = req.seed {
        entry.session.select_seed(seed).await;
    }
    Ok((StatusCode::CREATED, Json(CreateSessionRes { id })))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    let entries: Vec<SessionEntry> = state.sessions.iter().map(|e| e.value().clone()).collect();
    let mut out = Vec::with_capacity(entries.len());
    for e in entries {
        out.push(e.session.snapshot().await);
    }
    Json(out)
}

pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, StatusCode> {
    let Some((_, e)) = state.sessions.remove(&id) else { return Err(StatusCode::NOT_FOUND) };
    e.session.close().await;
    info!(session = %id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_seed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(seed): Json<Track>,
) -> Result<impl IntoResponse, StatusCode> {
    let e = entry(&state, &id)?;
    e.session.select_seed(seed).await;
    Ok(StatusCode::ACCEPTED)
}

fn nav_response(res: Result<Track, NavError>) -> axum::response::Response {
    match res {
        Ok(track) => (StatusCode::OK, Json(track)).into_response(),
        Err(NavError::Busy) => (StatusCode::CONFLICT, NavError::Busy.to_string()).into_response(),
        Err(NavError::Empty | NavError::EndOfQueue) => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn next(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(nav_response(e.session.next().await))
}

pub async fn previous(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(nav_response(e.session.previous().await))
}

pub async fn play(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Applied>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(Applied { applied: e.session.play().await }))
}

pub async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Applied>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(Applied { applied: e.session.pause().await }))
}

pub async fn mute(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Applied>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(Applied { applied: e.session.mute().await }))
}

pub async fn unmute(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Applied>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(Applied { applied: e.session.unmute().await }))
}

pub async fn set_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VolumeReq>,
) -> Result<Json<Applied>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(Applied { applied: e.session.set_volume(req.level).await }))
}

pub async fn seek(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SeekReq>,
) -> Result<Json<Applied>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(Applied { applied: e.session.seek(req.seconds).await }))
}

pub async fn toggle_shuffle(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PlaybackModes>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(e.session.toggle_shuffle().await))
}

pub async fn toggle_repeat(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PlaybackModes>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(e.session.toggle_repeat().await))
}

pub async fn toggle_loop(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PlaybackModes>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(e.session.toggle_loop().await))
}

pub async fn get_queue(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SessionSnapshot>, StatusCode> {
    let e = entry(&state, &id)?;
    Ok(Json(e.session.snapshot().await))
}

/// Event report from the embed host. Events for a replaced instance are refused.
pub async fn report_widget(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(ev): Json<WidgetEvent>,
) -> Result<impl IntoResponse, StatusCode> {
    let e = entry(&state, &id)?;
    if e.embed.report(ev) { Ok(StatusCode::NO_CONTENT) } else { Err(StatusCode::GONE) }
}

pub async fn ws_embed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let e = entry(&state, &id)?;
    let rx = e.embed.subscribe_commands();
    info!(session = %id, "embed host connected");
    Ok(ws.on_upgrade(move |socket| async move { embed_task(socket, e, rx).await }))
}

async fn embed_task(mut socket: WebSocket, entry: SessionEntry, mut rx: broadcast::Receiver<WidgetCommand>) {
    if let Some(create) = entry.embed.replay() {
        if send_json(&mut socket, &create).await.is_err() {
            return;
        }
    }
    loop {
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Ok(cmd) => {
                        if send_json(&mut socket, &cmd).await.is_err() { break; }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lost = n, "embed host lagged; dropped commands");
                    }
                    Err(_) => break,
                }
            }
            Some(Ok(msg)) = socket.next() => {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<WidgetEvent>(text.as_str()) {
                        Ok(ev) => {
                            entry.embed.report(ev);
                        }
                        Err(e) => debug!(error = %e, "unparseable embed event"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            else => break,
        }
    }
    info!(session = %entry.session.id(), "embed host disconnected");
}

pub async fn ws_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let e = entry(&state, &id)?;
    let rx = e.session.subscribe();
    let snapshot = e.session.snapshot().await;
    Ok(ws.on_upgrade(move |socket| async move { events_task(socket, snapshot, rx).await }))
}

async fn events_task(
    mut socket: WebSocket,
    snapshot: SessionSnapshot,
    mut rx: broadcast::Receiver<crate::session::SessionEvent>,
) {
    if send_json(&mut socket, &snapshot).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            ev = rx.recv() => {
                match ev {
                    Ok(ev) => {
                        if send_json(&mut socket, &ev).await.is_err() { break; }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lost = n, "event subscriber lagged");
                    }
                    Err(_) => break,
                }
            }
            Some(Ok(msg)) = socket.next() => {
                if let Message::Close(_) = msg { break; }
            }
            else => break,
        }
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let text = serde_json::to_string(value).map_err(|e| warn!(error = %e, "cannot encode ws payload"))?;
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[derive(Debug, Serialize)]
pub struct InfoRes {
    pub version: &'static str,
    pub catalog: &'static str,
    pub sessions: usize,
}

pub async fn info(State(state): State<AppState>) -> Json<InfoRes> {
    Json(InfoRes { version: env!("CARGO_PKG_VERSION"), catalog: state.catalog.name(), sessions: state.sessions.len() })
}

pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
