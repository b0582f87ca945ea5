use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::catalog::Track;

/// Repeat setting, cycled `off -> one -> all -> off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackModes {
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub loop_current: bool,
}

impl PlaybackModes {
    /// Wrapping past either end of the queue is allowed.
    fn wraps(&self) -> bool {
        self.repeat == RepeatMode::All || self.loop_current
    }
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Play(Track),
    /// Reached the boundary of a non-repeating queue; cursor unchanged.
    EndOfQueue,
    Empty,
}

/// Ordered autoplay candidates plus a cursor and the repeat/shuffle/loop settings.
///
/// One queue generation lives from [`QueuePolicy::start_generation`] to the next call;
/// the cursor always indexes `tracks` while the queue is non-empty.
#[derive(Debug)]
pub struct QueuePolicy {
    tracks: Vec<Track>,
    cursor: usize,
    modes: PlaybackModes,
    original_order: Option<Vec<Track>>,
    generation: u64,
    rng: StdRng,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuePolicy {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            cursor: 0,
            modes: PlaybackModes::default(),
            original_order: None,
            generation: 0,
            rng,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn cursor(&self) -> Option<usize> {
        if self.tracks.is_empty() { None } else { Some(self.cursor) }
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.cursor)
    }

    pub fn modes(&self) -> PlaybackModes {
        self.modes
    }

    pub fn original_order(&self) -> Option<&[Track]> {
        self.original_order.as_deref()
    }

    /// Discards queue, cursor and saved order. Modes carry over.
    pub fn start_generation(&mut self) -> u64 {
        self.tracks.clear();
        self.cursor = 0;
        self.original_order = None;
        self.generation += 1;
        self.generation
    }

    /// Replaces the queue contents; the first track becomes current.
    pub fn populate(&mut self, tracks: Vec<Track>) {
        let tracks = dedupe_by_id(tracks);
        self.cursor = 0;
        if self.modes.shuffle {
            self.original_order = Some(tracks.clone());
            self.tracks = tracks;
            self.shuffle_pinned();
        } else {
            self.original_order = None;
            self.tracks = tracks;
        }
    }

    pub fn advance(&mut self) -> Step {
        if self.tracks.is_empty() {
            return Step::Empty;
        }
        if self.modes.repeat == RepeatMode::One {
            return Step::Play(self.tracks[self.cursor].clone());
        }
        let next = (self.cursor + 1) % self.tracks.len();
        if next == 0 && !self.modes.wraps() {
            return Step::EndOfQueue;
        }
        self.cursor = next;
        Step::Play(self.tracks[next].clone())
    }

    pub fn retreat(&mut self) -> Step {
        if self.tracks.is_empty() {
            return Step::Empty;
        }
        if self.modes.repeat == RepeatMode::One {
            return Step::Play(self.tracks[self.cursor].clone());
        }
        let last = self.tracks.len() - 1;
        let prev = if self.cursor > 0 { self.cursor - 1 } else { last };
        if prev == last && !self.modes.wraps() {
            return Step::EndOfQueue;
        }
        self.cursor = prev;
        Step::Play(self.tracks[prev].clone())
    }

    /// Returns the new shuffle flag. The playing track stays current at cursor 0.
    pub fn toggle_shuffle(&mut self) -> bool {
        self.modes.shuffle = !self.modes.shuffle;
        if self.modes.shuffle {
            if self.original_order.is_none() && !self.tracks.is_empty() {
                self.original_order = Some(self.tracks.clone());
            }
            self.shuffle_pinned();
        } else if let Some(original) = self.original_order.clone() {
            let playing = self.current().map(|t| t.id.clone());
            self.cursor = playing.and_then(|id| original.iter().position(|t| t.id == id)).unwrap_or(0);
            self.tracks = original;
        }
        self.modes.shuffle
    }

    pub fn toggle_repeat(&mut self) -> RepeatMode {
        self.modes.repeat = self.modes.repeat.next();
        self.modes.repeat
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.modes.loop_current = !self.modes.loop_current;
        self.modes.loop_current
    }

    fn shuffle_pinned(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let playing = self.tracks.remove(self.cursor.min(self.tracks.len() - 1));
        self.tracks.shuffle(&mut self.rng);
        self.tracks.insert(0, playing);
        self.cursor = 0;
    }
}

/// Keeps the first occurrence of every id, preserving order.
pub fn dedupe_by_id(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks.into_iter().filter(|t| seen.insert(t.id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(id: &str) -> Track {
        Track::new(id, format!("title {id}"), "channel")
    }

    fn queue_of(ids: &[&str]) -> QueuePolicy {
        let mut q = QueuePolicy::with_seed(7);
        q.start_generation();
        q.populate(ids.iter().map(|id| t(id)).collect());
        q
    }

    fn ids(q: &QueuePolicy) -> Vec<String> {
        q.tracks().iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn populate_dedupes_and_resets_cursor() {
        let mut q = queue_of(&["a", "b", "a", "c", "b"]);
        assert_eq!(ids(&q), ["a", "b", "c"]);
        assert_eq!(q.cursor(), Some(0));
        assert_eq!(q.advance(), Step::Play(t("b")));
        q.populate(vec![t("x"), t("y")]);
        assert_eq!(q.cursor(), Some(0));
    }

    #[test]
    fn advance_stops_at_end_without_repeat() {
        let mut q = queue_of(&["a", "b", "c"]);
        assert_eq!(q.advance(), Step::Play(t("b")));
        assert_eq!(q.advance(), Step::Play(t("c")));
        assert_eq!(q.advance(), Step::EndOfQueue);
        assert_eq!(q.cursor(), Some(2));
    }

    #[test]
    fn retreat_stops_at_start_without_repeat() {
        let mut q = queue_of(&["a", "b", "c"]);
        assert_eq!(q.retreat(), Step::EndOfQueue);
        assert_eq!(q.cursor(), Some(0));
        q.advance();
        assert_eq!(q.retreat(), Step::Play(t("a")));
    }

    #[test]
    fn loop_current_permits_wrap() {
        let mut q = queue_of(&["a", "b"]);
        assert!(q.toggle_loop());
        q.advance();
        assert_eq!(q.advance(), Step::Play(t("a")));
        assert_eq!(q.retreat(), Step::Play(t("b")));
    }

    #[test]
    fn empty_queue_is_reported() {
        let mut q = QueuePolicy::with_seed(1);
        assert_eq!(q.advance(), Step::Empty);
        assert_eq!(q.retreat(), Step::Empty);
        assert_eq!(q.cursor(), None);
    }

    #[test]
    fn single_track_queue_is_terminal() {
        let mut q = queue_of(&["seed"]);
        assert_eq!(q.advance(), Step::EndOfQueue);
        assert_eq!(q.retreat(), Step::EndOfQueue);
        assert_eq!(q.cursor(), Some(0));
    }

    #[test]
    fn repeat_cycles_off_one_all() {
        let mut q = QueuePolicy::with_seed(1);
        assert_eq!(q.toggle_repeat(), RepeatMode::One);
        assert_eq!(q.toggle_repeat(), RepeatMode::All);
        assert_eq!(q.toggle_repeat(), RepeatMode::Off);
    }

    #[test]
    fn shuffle_round_trip_restores_order() {
        let mut q = queue_of(&["A", "B", "C"]);
        assert!(q.toggle_shuffle());
        assert_eq!(q.original_order().map(|o| o.len()), Some(3));
        assert!(!q.toggle_shuffle());
        assert_eq!(ids(&q), ["A", "B", "C"]);
        assert_eq!(q.cursor(), Some(0));
    }

    #[test]
    fn shuffle_pins_playing_track_and_unshuffle_relocates_cursor() {
        let names: Vec<String> = (0..12).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut q = queue_of(&refs);
        q.advance();
        q.advance();
        q.toggle_shuffle();
        assert_eq!(q.current().map(|t| t.id.as_str()), Some("t2"));
        assert_eq!(q.cursor(), Some(0));
        q.advance();
        let playing = q.current().map(|t| t.id.clone()).unwrap();
        q.toggle_shuffle();
        assert_eq!(ids(&q), names);
        assert_eq!(q.current().map(|t| t.id.clone()), Some(playing));
    }

    #[test]
    fn populate_while_shuffled_records_original_order() {
        let mut q = QueuePolicy::with_seed(3);
        q.toggle_shuffle();
        q.start_generation();
        q.populate(vec![t("s"), t("a"), t("b"), t("c")]);
        assert_eq!(q.current().map(|t| t.id.as_str()), Some("s"));
        q.toggle_shuffle();
        assert_eq!(ids(&q), ["s", "a", "b", "c"]);
    }

    #[test]
    fn start_generation_discards_everything() {
        let mut q = queue_of(&["a", "b"]);
        q.toggle_shuffle();
        let before = q.generation();
        assert_eq!(q.start_generation(), before + 1);
        assert!(q.is_empty());
        assert!(q.original_order().is_none());
        assert!(q.modes().shuffle);
    }

    fn sized_queue(len: usize) -> QueuePolicy {
        let mut q = QueuePolicy::with_seed(11);
        q.start_generation();
        q.populate((0..len).map(|i| t(&i.to_string())).collect());
        q
    }

    proptest! {
        #[test]
        fn advance_then_retreat_returns_cursor(len in 2usize..40, start in 0usize..40) {
            let mut q = sized_queue(len);
            let start = start % (len - 1);
            for _ in 0..start { q.advance(); }
            let before = q.cursor();
            prop_assert!(matches!(q.advance(), Step::Play(_)));
            prop_assert!(matches!(q.retreat(), Step::Play(_)));
            prop_assert_eq!(q.cursor(), before);
        }

        #[test]
        fn repeat_all_cycles_back(len in 1usize..40, start in 0usize..40) {
            let mut q = sized_queue(len);
            q.toggle_repeat();
            q.toggle_repeat();
            for _ in 0..(start % len) { q.advance(); }
            let before = q.cursor();
            for _ in 0..len {
                prop_assert!(matches!(q.advance(), Step::Play(_)));
            }
            prop_assert_eq!(q.cursor(), before);
        }

        #[test]
        fn repeat_one_is_stable(len in 1usize..20, calls in 1usize..30) {
            let mut q = sized_queue(len);
            q.toggle_repeat();
            let first = q.advance();
            for _ in 0..calls {
                prop_assert_eq!(q.advance(), first.clone());
            }
        }

        #[test]
        fn cursor_stays_in_bounds(ops in proptest::collection::vec(0u8..5, 1..200), len in 1usize..10) {
            let mut q = sized_queue(len);
            for op in ops {
                match op {
                    0 => { q.advance(); }
                    1 => { q.retreat(); }
                    2 => { q.toggle_shuffle(); }
                    3 => { q.toggle_repeat(); }
                    _ => { q.toggle_loop(); }
                }
                let c = q.cursor().unwrap();
                prop_assert!(c < q.len());
                prop_assert_eq!(q.len(), len);
            }
        }
    }
}
