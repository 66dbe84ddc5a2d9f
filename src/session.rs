// src/session.rs - Owns the selection, the loaded clip and trace, and keeps them in sync
use std::path::Path;
use std::time::Instant;

use crate::catalog::{Catalog, Level, Selection, SelectionPath};
use crate::data::SignalTrace;
use crate::error::{Result, ViewerError};
use crate::playback::{PlaybackController, PlaybackMode};
use crate::sync::SyncEngine;
use crate::video::{LoadProgress, VideoAsset, VideoLoader};

/// A decode in flight. The trace is already parsed; it becomes visible
/// together with the frames once decoding completes.
pub struct PendingLoad {
    selection: Selection,
    loader: VideoLoader,
    signal: SignalTrace,
}

pub struct LoadedClip {
    pub selection: Selection,
    pub video: VideoAsset,
    pub signal: SignalTrace,
}

/// At most one generation of decoded data exists at any time.
pub enum SessionState {
    Empty,
    Loading(PendingLoad),
    Ready(LoadedClip),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadStatus {
    InProgress(LoadProgress),
    Finished,
}

pub struct Session {
    catalog: Catalog,
    decode_max_width: u32,
    path: SelectionPath,
    choices: [Vec<String>; 4],
    state: SessionState,
    playback: PlaybackController,
    sync: SyncEngine,
}

impl Session {
    pub fn new(catalog: Catalog, decode_max_width: u32) -> Self {
        let mut session = Self {
            catalog,
            decode_max_width,
            path: SelectionPath::default(),
            choices: Default::default(),
            state: SessionState::Empty,
            playback: PlaybackController::default(),
            sync: SyncEngine::default(),
        };
        session.refresh_choices(Level::Patient);
        session
    }

    pub fn selection(&self) -> &SelectionPath {
        &self.path
    }

    pub fn choices(&self, level: Level) -> &[String] {
        &self.choices[level.index()]
    }

    pub fn clip(&self) -> Option<&LoadedClip> {
        match &self.state {
            SessionState::Ready(clip) => Some(clip),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Loading(_))
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    /// Re-lists `from` and every level below it.
    pub fn refresh_choices(&mut self, from: Level) {
        for level in Level::ALL.into_iter().filter(|level| *level >= from) {
            self.choices[level.index()] = if self.path.is_reachable(level) {
                self.catalog.choices(&self.path, level)
            } else {
                Vec::new()
            };
        }
    }

    /// Changing any level invalidates deeper levels and drops loaded data.
    /// Ignored while a decode is running.
    pub fn select(&mut self, level: Level, value: Option<String>) -> bool {
        if self.is_loading() || !self.path.is_reachable(level) {
            return false;
        }
        if !self.path.set(level, value) {
            return false;
        }
        if let Some(next) = Level::ALL.get(level.index() + 1) {
            self.refresh_choices(*next);
        }
        self.unload();
        true
    }

    fn unload(&mut self) {
        if !matches!(self.state, SessionState::Empty) {
            tracing::info!("Releasing loaded clip");
        }
        self.state = SessionState::Empty;
        self.playback.unload();
        self.sync.detach();
    }

    /// Resolves, probes and parses everything that can fail up front. On error
    /// the current state is left as it was.
    pub fn begin_load(&mut self) -> Result<()> {
        let max_width = self.decode_max_width;
        self.begin_load_with(|video| VideoLoader::open(video, max_width))
    }

    fn begin_load_with(&mut self, open: impl FnOnce(&Path) -> Result<VideoLoader>) -> Result<()> {
        if self.is_loading() {
            return Ok(());
        }
        let selection = self.path.complete()?;
        let assets = self.catalog.resolve(&selection)?;
        let loader = open(&assets.video)?;
        let signal = SignalTrace::load(&assets.signal, loader.frame_rate())?;

        // Drop the previous generation before the new one can be seen.
        self.unload();
        tracing::info!("Loading {}", selection);
        self.state = SessionState::Loading(PendingLoad {
            selection,
            loader,
            signal,
        });
        Ok(())
    }

    /// Decodes up to `budget` frames. The caller yields to the UI between calls.
    pub fn poll_load(&mut self, budget: usize) -> Result<LoadStatus> {
        let SessionState::Loading(pending) = &mut self.state else {
            return Ok(LoadStatus::Finished);
        };

        if let Err(e) = pending.loader.decode_batch(budget) {
            self.state = SessionState::Empty;
            return Err(e);
        }
        if !pending.loader.is_finished() {
            return Ok(LoadStatus::InProgress(pending.loader.progress()));
        }

        let SessionState::Loading(pending) = std::mem::replace(&mut self.state, SessionState::Empty)
        else {
            return Ok(LoadStatus::Finished);
        };
        let video = pending.loader.finish()?;
        self.install(LoadedClip {
            selection: pending.selection,
            video,
            signal: pending.signal,
        });
        Ok(LoadStatus::Finished)
    }

    fn install(&mut self, clip: LoadedClip) {
        if clip.video.frame_count() != clip.signal.sample_count() {
            tracing::warn!(
                "{} has {} frames but {} IMU samples",
                clip.selection,
                clip.video.frame_count(),
                clip.signal.sample_count()
            );
        }
        self.sync.attach(clip.signal.total_duration_seconds());
        let first = self.playback.load(clip.video.frame_count());
        self.state = SessionState::Ready(clip);
        self.sync_to(first);
    }

    /// Moves the plot cursor to the frame's timestamp. Frames past the end of
    /// the trace leave the cursor where it was.
    fn sync_to(&mut self, frame: Option<usize>) -> Option<usize> {
        let index = frame?;
        if let Some(t) = self.clip().and_then(|clip| clip.signal.timestamp(index)) {
            self.sync.on_timestamp(t);
        }
        Some(index)
    }

    pub fn play(&mut self, now: Instant) -> bool {
        let Some(period) = self.clip().map(|clip| clip.video.frame_rate().frame_period()) else {
            return false;
        };
        self.playback.play(period, now)
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn toggle_play(&mut self, now: Instant) {
        if self.playback.is_playing() {
            self.pause();
        } else {
            self.play(now);
        }
    }

    pub fn stop(&mut self) -> Option<usize> {
        let frame = self.playback.stop();
        self.sync_to(frame)
    }

    pub fn step_forward(&mut self) -> Option<usize> {
        let frame = self.playback.step_forward();
        self.sync_to(frame)
    }

    pub fn step_backward(&mut self) -> Option<usize> {
        let frame = self.playback.step_backward();
        self.sync_to(frame)
    }

    pub fn set_position(&mut self, index: usize) -> Option<usize> {
        let frame = self.playback.set_position(index);
        self.sync_to(frame)
    }

    pub fn poll_clock(&mut self, now: Instant) -> Option<usize> {
        let frame = self.playback.poll_clock(now);
        self.sync_to(frame)
    }

    pub fn set_zoom_level(&mut self, level: i64) -> Result<()> {
        self.sync.set_zoom_level(level)
    }

    pub fn toggle_channel(&mut self, name: &str) -> Result<bool> {
        match &mut self.state {
            SessionState::Ready(clip) => clip.signal.toggle(name),
            _ => Err(ViewerError::UnknownChannel(name.to_owned())),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.playback.mode()
    }
}
