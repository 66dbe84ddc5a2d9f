// src/playback.rs - Transport state machine driving the current frame index
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Index 0, clock off. Reached only through an explicit stop or a load.
    Stopped,
    Paused,
    Playing,
    /// The clock ran off the end; the index stays on the last frame.
    Ended,
}

#[derive(Debug, Clone, Copy)]
struct Clock {
    period: Duration,
    next_tick: Instant,
}

/// Every operation returns the new frame index when it changed, so the caller
/// can render that frame and move the plot cursor.
#[derive(Debug, Clone)]
pub struct PlaybackController {
    frame_count: usize,
    index: usize,
    mode: PlaybackMode,
    clock: Option<Clock>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self {
            frame_count: 0,
            index: 0,
            mode: PlaybackMode::Stopped,
            clock: None,
        }
    }
}

impl PlaybackController {
    /// Resets to Stopped at frame 0 for a newly loaded clip.
    pub fn load(&mut self, frame_count: usize) -> Option<usize> {
        *self = Self {
            frame_count,
            ..Self::default()
        };
        (frame_count > 0).then_some(0)
    }

    pub fn unload(&mut self) {
        *self = Self::default();
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.mode == PlaybackMode::Playing
    }

    fn last_index(&self) -> usize {
        self.frame_count.saturating_sub(1)
    }

    /// Starts the clock. The period is fixed for this play session.
    pub fn play(&mut self, period: Duration, now: Instant) -> bool {
        if self.frame_count == 0 || self.is_playing() {
            return false;
        }
        self.mode = PlaybackMode::Playing;
        self.clock = Some(Clock {
            period,
            next_tick: now + period,
        });
        tracing::debug!("Playing from frame {} every {:?}", self.index, period);
        true
    }

    pub fn pause(&mut self) {
        if self.is_playing() {
            self.mode = PlaybackMode::Paused;
            self.clock = None;
            tracing::debug!("Paused at frame {}", self.index);
        }
    }

    pub fn stop(&mut self) -> Option<usize> {
        self.mode = PlaybackMode::Stopped;
        self.clock = None;
        self.index = 0;
        (self.frame_count > 0).then_some(0)
    }

    pub fn step_forward(&mut self) -> Option<usize> {
        if self.is_playing() || self.frame_count == 0 || self.index >= self.last_index() {
            return None;
        }
        self.move_to(self.index + 1)
    }

    pub fn step_backward(&mut self) -> Option<usize> {
        if self.is_playing() || self.index == 0 {
            return None;
        }
        self.move_to(self.index - 1)
    }

    /// Scrubber position. Playing keeps playing; anything else ends up paused.
    pub fn set_position(&mut self, index: usize) -> Option<usize> {
        if self.frame_count == 0 {
            return None;
        }
        let target = index.min(self.last_index());
        if target == self.index {
            return None;
        }
        self.move_to(target)
    }

    fn move_to(&mut self, index: usize) -> Option<usize> {
        self.index = index;
        if matches!(self.mode, PlaybackMode::Stopped | PlaybackMode::Ended) {
            self.mode = PlaybackMode::Paused;
        }
        Some(index)
    }

    /// One clock step. Running off the end halts in `Ended` on the last frame.
    pub fn tick(&mut self) -> Option<usize> {
        if !self.is_playing() {
            return None;
        }
        if self.index + 1 >= self.frame_count {
            self.mode = PlaybackMode::Ended;
            self.clock = None;
            tracing::debug!("Reached end of clip at frame {}", self.index);
            return None;
        }
        self.index += 1;
        Some(self.index)
    }

    /// Fires at most one tick per call; a late caller does not get a burst.
    pub fn poll_clock(&mut self, now: Instant) -> Option<usize> {
        let clock = self.clock.as_mut()?;
        if now < clock.next_tick {
            return None;
        }
        clock.next_tick += clock.period;
        if clock.next_tick <= now {
            clock.next_tick = now + clock.period;
        }
        self.tick()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.clock.map(|clock| clock.next_tick)
    }
}
