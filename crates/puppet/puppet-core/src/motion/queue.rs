//! Cross-fading playback queue shared by motions and expressions.
//!
//! Timing model:
//! - An entry's start time is pinned on the first `advance` after `start`.
//! - `start` marks existing entries for fade-out; their end is pinned on the next
//!   `advance` to `now + fade_out` (or kept if an earlier natural end exists).
//! - Entries whose end lies strictly before `now` are retired before anything is applied.
//!
//! Nothing reads a clock, so advancing and applying twice with the same `now` leaves the
//! queue and the target in the same state.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::ids::{HandleAllocator, PlaybackHandle};
use crate::native::CoreModel;

/// Invoked once when a playback leaves the queue, whether it completed or was stopped.
pub type FinishCallback = Box<dyn FnOnce(PlaybackHandle) + Send>;

/// Per-entry timing handed to [`Playable::apply`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaybackFrame {
    /// Seconds since the entry started.
    pub elapsed: f64,
    /// Seconds until the pinned end, if any.
    pub until_end: Option<f64>,
    /// Combined entry weight, `fade_in_weight * fade_out_weight`.
    pub weight: f32,
    pub fade_in_weight: f32,
    pub fade_out_weight: f32,
}

/// Something the queue can play.
pub trait Playable: Send + Sync {
    fn fade_in_secs(&self) -> f32;
    fn fade_out_secs(&self) -> f32;
    /// Natural length; `None` plays until stopped or replaced.
    fn duration_secs(&self) -> Option<f64>;
    fn apply(&self, target: &mut dyn CoreModel, frame: &PlaybackFrame);
    /// Custom events whose time lies in `(from, to]`, in elapsed seconds.
    fn fired_events(&self, _from: f64, _to: f64) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueueEvent {
    UserData { handle: PlaybackHandle, value: String },
    Finished { handle: PlaybackHandle },
}

/// Sine ease used for fade weights, input clamped to [0, 1].
#[inline]
pub fn ease_sine(value: f64) -> f32 {
    let v = value.clamp(0.0, 1.0);
    (0.5 - 0.5 * (v * PI).cos()) as f32
}

/// Fade weight for a ramp of `duration` seconds at position `t`; a zero ramp is full weight.
#[inline]
pub fn fade_weight(duration: f32, t: f64) -> f32 {
    if duration <= 0.0 {
        1.0
    } else {
        ease_sine(t / duration as f64)
    }
}

struct QueueEntry<T> {
    handle: PlaybackHandle,
    item: Arc<T>,
    start: Option<f64>,
    end: Option<f64>,
    fade_requested: bool,
    fading: bool,
    last_event_time: f64,
    on_finish: Option<FinishCallback>,
}

impl<T: Playable> QueueEntry<T> {
    fn pin(&mut self, now: f64) {
        if self.start.is_none() {
            self.start = Some(now);
            self.end = self.item.duration_secs().map(|d| now + d);
        }
        if self.fade_requested && !self.fading {
            let fade_end = now + self.item.fade_out_secs().max(0.0) as f64;
            self.end = Some(match self.end {
                Some(natural) if natural < fade_end => natural,
                _ => fade_end,
            });
            self.fading = true;
        }
    }

    fn frame(&self, now: f64) -> PlaybackFrame {
        let start = self.start.unwrap_or(now);
        let elapsed = (now - start).max(0.0);
        let until_end = self.end.map(|end| end - now);
        let fade_in_weight = fade_weight(self.item.fade_in_secs(), elapsed);
        let fade_out_weight = match until_end {
            Some(remaining) => fade_weight(self.item.fade_out_secs(), remaining),
            None => 1.0,
        };
        PlaybackFrame {
            elapsed,
            until_end,
            weight: fade_in_weight * fade_out_weight,
            fade_in_weight,
            fade_out_weight,
        }
    }

    fn finish(mut self, events: &mut Vec<QueueEvent>) {
        if let Some(cb) = self.on_finish.take() {
            cb(self.handle);
        }
        events.push(QueueEvent::Finished {
            handle: self.handle,
        });
    }
}

/// Ordered set of active playbacks; later entries are applied on top of earlier ones.
pub struct AnimationQueue<T> {
    entries: Vec<QueueEntry<T>>,
    handles: HandleAllocator,
    events: Vec<QueueEvent>,
}

impl<T: Playable> AnimationQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            handles: HandleAllocator::new(),
            events: Vec::new(),
        }
    }

    /// Enqueue `item`, fading out everything already playing.
    pub fn start(&mut self, item: Arc<T>, on_finish: Option<FinishCallback>) -> PlaybackHandle {
        for entry in &mut self.entries {
            entry.fade_requested = true;
        }
        let handle = self.handles.alloc();
        self.entries.push(QueueEntry {
            handle,
            item,
            start: None,
            end: None,
            fade_requested: false,
            fading: false,
            last_event_time: -1.0,
            on_finish,
        });
        handle
    }

    /// Remove every entry, firing pending finish callbacks once.
    pub fn stop_all(&mut self) {
        for entry in self.entries.drain(..) {
            entry.finish(&mut self.events);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_playing(&self, handle: PlaybackHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    /// Pin pending start/end times and retire entries that ended before `now`.
    pub fn advance(&mut self, now: f64) {
        for entry in &mut self.entries {
            entry.pin(now);
        }
        let mut i = 0;
        while i < self.entries.len() {
            let expired = self.entries[i].end.map_or(false, |end| end < now);
            if expired {
                let entry = self.entries.remove(i);
                entry.finish(&mut self.events);
            } else {
                i += 1;
            }
        }
    }

    /// Apply every remaining entry at `now`. Returns whether anything was applied.
    pub fn apply(&mut self, target: &mut dyn CoreModel, now: f64) -> bool {
        let mut updated = false;
        for entry in &mut self.entries {
            // entries started after the last advance wait for the next one
            if entry.start.is_none() {
                continue;
            }
            let frame = entry.frame(now);
            entry.item.apply(target, &frame);
            updated = true;

            if frame.elapsed > entry.last_event_time {
                for value in entry.item.fired_events(entry.last_event_time, frame.elapsed) {
                    self.events.push(QueueEvent::UserData {
                        handle: entry.handle,
                        value,
                    });
                }
                entry.last_event_time = frame.elapsed;
            }
        }
        updated
    }

    /// `advance` followed by `apply`.
    pub fn update(&mut self, target: &mut dyn CoreModel, now: f64) -> bool {
        self.advance(now);
        self.apply(target, now)
    }

    pub fn drain_events(&mut self) -> Vec<QueueEvent> {
        std::mem::take(&mut self.events)
    }
}

impl<T: Playable> Default for AnimationQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for AnimationQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationQueue")
            .field("entries", &self.entries.len())
            .field("pending_events", &self.events.len())
            .finish()
    }
}
