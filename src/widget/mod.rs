use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub type InstanceId = Uuid;

/// Player lifecycle as reported by the embed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
    Error,
}

impl PlayerState {
    /// Numeric codes used by the embed API.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(PlayerState::Unstarted),
            0 => Some(PlayerState::Ended),
            1 => Some(PlayerState::Playing),
            2 => Some(PlayerState::Paused),
            3 => Some(PlayerState::Buffering),
            5 => Some(PlayerState::Cued),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetEventKind {
    Ready { duration: f64 },
    StateChange { state: PlayerState },
    Time { current: f64 },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetEvent {
    pub instance: InstanceId,
    #[serde(flatten)]
    pub kind: WidgetEventKind,
}

/// Fixed player parameters sent with every instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedParams {
    pub autoplay: u8,
    pub controls: u8,
    pub modestbranding: u8,
    pub rel: u8,
    pub iv_load_policy: u8,
    pub fs: u8,
    pub disablekb: u8,
    pub playsinline: u8,
    pub enablejsapi: u8,
    pub origin: String,
}

impl EmbedParams {
    pub fn new(origin: &str) -> Self {
        Self {
            autoplay: 1,
            controls: 0,
            modestbranding: 1,
            rel: 0,
            iv_load_policy: 3,
            fs: 0,
            disablekb: 1,
            playsinline: 1,
            enablejsapi: 1,
            origin: origin.to_string(),
        }
    }
}

/// Instructions for the embed host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum WidgetCommand {
    Create { instance: InstanceId, track_id: String, params: EmbedParams },
    Destroy { instance: InstanceId },
    Play { instance: InstanceId },
    Pause { instance: InstanceId },
    Seek { instance: InstanceId, seconds: f64 },
    SetVolume { instance: InstanceId, level: u8 },
    Mute { instance: InstanceId },
    Unmute { instance: InstanceId },
}

/// Operations the queue and session need from a player.
///
/// Control calls made before the live instance is ready return `false` and do nothing.
pub trait PlaybackWidget: Send + Sync {
    /// Tears down the live instance, if any, and creates one for `track_id`.
    fn load(&self, track_id: &str) -> InstanceId;
    fn play(&self) -> bool;
    fn pause(&self) -> bool;
    fn seek(&self, seconds: f64) -> bool;
    /// `level` in `0.0..=1.0`.
    fn set_volume(&self, level: f32) -> bool;
    fn mute(&self) -> bool;
    fn unmute(&self) -> bool;
    fn current_time(&self) -> Option<f64>;
    fn subscribe(&self) -> broadcast::Receiver<WidgetEvent>;
    fn teardown(&self);
}

#[derive(Debug)]
struct LiveInstance {
    id: InstanceId,
    track_id: String,
    ready: bool,
    state: PlayerState,
    time: f64,
    time_at: Instant,
}

impl LiveInstance {
    fn estimated_time(&self) -> f64 {
        if self.state == PlayerState::Playing {
            self.time + self.time_at.elapsed().as_secs_f64()
        } else {
            self.time
        }
    }
}

/// Remote embedded player: commands go out to the embed host, events come back via [`EmbedWidget::report`].
/// Holds at most one live instance.
pub struct EmbedWidget {
    params: EmbedParams,
    live: Mutex<Option<LiveInstance>>,
    cmd_tx: broadcast::Sender<WidgetCommand>,
    event_tx: broadcast::Sender<WidgetEvent>,
}

impl EmbedWidget {
    pub fn new(params: EmbedParams) -> Self {
        let (cmd_tx, _) = broadcast::channel(64);
        let (event_tx, _) = broadcast::channel(64);
        Self { params, live: Mutex::new(None), cmd_tx, event_tx }
    }

    fn live(&self) -> MutexGuard<'_, Option<LiveInstance>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<WidgetCommand> {
        self.cmd_tx.subscribe()
    }

    /// The create command for the live instance, for hosts that connect late.
    pub fn replay(&self) -> Option<WidgetCommand> {
        self.live().as_ref().map(|l| WidgetCommand::Create {
            instance: l.id,
            track_id: l.track_id.clone(),
            params: self.params.clone(),
        })
    }

    pub fn live_instance(&self) -> Option<InstanceId> {
        self.live().as_ref().map(|l| l.id)
    }

    /// Accepts an event from the embed host. Events for anything but the live instance are dropped.
    pub fn report(&self, event: WidgetEvent) -> bool {
        {
            let mut guard = self.live();
            let Some(live) = guard.as_mut().filter(|l| l.id == event.instance) else {
                debug!(instance = %event.instance, "dropping event from stale widget instance");
                return false;
            };
            match &event.kind {
                WidgetEventKind::Ready { .. } => live.ready = true,
                WidgetEventKind::StateChange { state } => {
                    live.time = live.estimated_time();
                    live.time_at = Instant::now();
                    live.state = *state;
                }
                WidgetEventKind::Time { current } => {
                    live.time = *current;
                    live.time_at = Instant::now();
                }
                WidgetEventKind::Error { .. } => live.state = PlayerState::Error,
            }
        }
        let _ = self.event_tx.send(event);
        true
    }

    fn send_if_ready(&self, make: impl FnOnce(InstanceId) -> WidgetCommand) -> bool {
        let id = match self.live().as_ref() {
            Some(l) if l.ready => l.id,
            _ => {
                debug!("widget not ready; ignoring control");
                return false;
            }
        };
        let _ = self.cmd_tx.send(make(id));
        true
    }
}

impl PlaybackWidget for EmbedWidget {
    fn load(&self, track_id: &str) -> InstanceId {
        let id = Uuid::new_v4();
        let previous = {
            let mut guard = self.live();
            let previous = guard.take().map(|l| l.id);
            *guard = Some(LiveInstance {
                id,
                track_id: track_id.to_string(),
                ready: false,
                state: PlayerState::Unstarted,
                time: 0.0,
                time_at: Instant::now(),
            });
            previous
        };
        if let Some(old) = previous {
            let _ = self.cmd_tx.send(WidgetCommand::Destroy { instance: old });
        }
        let _ = self.cmd_tx.send(WidgetCommand::Create {
            instance: id,
            track_id: track_id.to_string(),
            params: self.params.clone(),
        });
        info!(instance = %id, track = %track_id, "widget instance created");
        id
    }

    fn play(&self) -> bool {
        self.send_if_ready(|instance| WidgetCommand::Play { instance })
    }

    fn pause(&self) -> bool {
        self.send_if_ready(|instance| WidgetCommand::Pause { instance })
    }

    fn seek(&self, seconds: f64) -> bool {
        let seconds = seconds.max(0.0);
        let sent = self.send_if_ready(|instance| WidgetCommand::Seek { instance, seconds });
        if sent {
            if let Some(live) = self.live().as_mut() {
                live.time = seconds;
                live.time_at = Instant::now();
            }
        }
        sent
    }

    fn set_volume(&self, level: f32) -> bool {
        let level = (level.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.send_if_ready(|instance| WidgetCommand::SetVolume { instance, level })
    }

    fn mute(&self) -> bool {
        self.send_if_ready(|instance| WidgetCommand::Mute { instance })
    }

    fn unmute(&self) -> bool {
        self.send_if_ready(|instance| WidgetCommand::Unmute { instance })
    }

    fn current_time(&self) -> Option<f64> {
        self.live().as_ref().filter(|l| l.ready).map(LiveInstance::estimated_time)
    }

    fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.event_tx.subscribe()
    }

    fn teardown(&self) {
        let previous = self.live().take();
        if let Some(old) = previous {
            let _ = self.cmd_tx.send(WidgetCommand::Destroy { instance: old.id });
            info!(instance = %old.id, "widget instance destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> EmbedWidget {
        EmbedWidget::new(EmbedParams::new("http://localhost:3000"))
    }

    fn drain(rx: &mut broadcast::Receiver<WidgetCommand>) -> Vec<WidgetCommand> {
        let mut out = Vec::new();
        while let Ok(c) = rx.try_recv() {
            out.push(c);
        }
        out
    }

    #[test]
    fn load_replaces_previous_instance() {
        let w = widget();
        let mut rx = w.subscribe_commands();
        let first = w.load("aaa");
        let second = w.load("bbb");
        let cmds = drain(&mut rx);
        assert_eq!(cmds.len(), 3);
        assert!(matches!(&cmds[0], WidgetCommand::Create { instance, track_id, .. } if *instance == first && track_id == "aaa"));
        assert_eq!(cmds[1], WidgetCommand::Destroy { instance: first });
        assert!(matches!(&cmds[2], WidgetCommand::Create { instance, .. } if *instance == second));
        assert_eq!(w.live_instance(), Some(second));
    }

    #[test]
    fn controls_are_noops_until_ready() {
        let w = widget();
        let mut rx = w.subscribe_commands();
        assert!(!w.play());
        let id = w.load("aaa");
        assert!(!w.pause());
        assert!(!w.set_volume(0.5));
        assert_eq!(w.current_time(), None);
        assert!(w.report(WidgetEvent { instance: id, kind: WidgetEventKind::Ready { duration: 200.0 } }));
        assert!(w.set_volume(1.7));
        let cmds = drain(&mut rx);
        assert_eq!(cmds.last(), Some(&WidgetCommand::SetVolume { instance: id, level: 100 }));
    }

    #[test]
    fn stale_events_are_dropped() {
        let w = widget();
        let mut events = w.subscribe();
        let old = w.load("aaa");
        let _new = w.load("bbb");
        let stale = WidgetEvent { instance: old, kind: WidgetEventKind::StateChange { state: PlayerState::Ended } };
        assert!(!w.report(stale));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn time_is_extrapolated_while_playing() {
        let w = widget();
        let id = w.load("aaa");
        w.report(WidgetEvent { instance: id, kind: WidgetEventKind::Ready { duration: 100.0 } });
        w.report(WidgetEvent { instance: id, kind: WidgetEventKind::Time { current: 10.0 } });
        w.report(WidgetEvent { instance: id, kind: WidgetEventKind::StateChange { state: PlayerState::Playing } });
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        let t = w.current_time().unwrap();
        assert!((t - 15.0).abs() < 0.01, "got {t}");
        w.report(WidgetEvent { instance: id, kind: WidgetEventKind::StateChange { state: PlayerState::Paused } });
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        let t = w.current_time().unwrap();
        assert!((t - 15.0).abs() < 0.01, "got {t}");
    }

    #[test]
    fn teardown_destroys_live_instance() {
        let w = widget();
        let mut rx = w.subscribe_commands();
        let id = w.load("aaa");
        w.teardown();
        assert_eq!(drain(&mut rx).last(), Some(&WidgetCommand::Destroy { instance: id }));
        assert_eq!(w.live_instance(), None);
        assert!(w.replay().is_none());
    }

    #[test]
    fn event_wire_format() {
        let id = Uuid::nil();
        let ev: WidgetEvent = serde_json::from_str(&format!(
            r#"{{"instance":"{id}","type":"state_change","state":"playing"}}"#
        ))
        .unwrap();
        assert_eq!(ev.kind, WidgetEventKind::StateChange { state: PlayerState::Playing });
        assert_eq!(PlayerState::from_code(0), Some(PlayerState::Ended));
        assert_eq!(PlayerState::from_code(4), None);
    }
}
