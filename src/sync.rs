// src/sync.rs - Plot cursor and zoom window that follow the playback timestamp
use crate::error::{Result, ViewerError};

pub const MIN_ZOOM_LEVEL: u8 = 1;
pub const MAX_ZOOM_LEVEL: u8 = 20;

/// A span of the time axis in seconds. May extend past the recorded data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn centered(center: f64, width: f64) -> Self {
        let half = width / 2.0;
        Self::new(center - half, center + half)
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Visible window for a zoom level: the whole recording at 1, a twentieth at 20.
pub fn visible_window_seconds(total_duration_seconds: f64, level: u8) -> f64 {
    total_duration_seconds / level.max(MIN_ZOOM_LEVEL) as f64
}

pub fn check_zoom_level(level: i64) -> Result<u8> {
    if (MIN_ZOOM_LEVEL as i64..=MAX_ZOOM_LEVEL as i64).contains(&level) {
        Ok(level as u8)
    } else {
        Err(ViewerError::out_of_range(
            "zoom level",
            level,
            MIN_ZOOM_LEVEL as i64,
            MAX_ZOOM_LEVEL as i64,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
    total_duration: Option<f64>,
    zoom_level: u8,
    window_seconds: f64,
    cursor: Option<f64>,
    visible: Option<TimeWindow>,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self {
            total_duration: None,
            zoom_level: MIN_ZOOM_LEVEL,
            window_seconds: 0.0,
            cursor: None,
            visible: None,
        }
    }
}

impl SyncEngine {
    /// Binds the engine to a freshly loaded trace, fully zoomed out.
    pub fn attach(&mut self, total_duration_seconds: f64) {
        *self = Self {
            total_duration: Some(total_duration_seconds),
            zoom_level: MIN_ZOOM_LEVEL,
            window_seconds: visible_window_seconds(total_duration_seconds, MIN_ZOOM_LEVEL),
            cursor: None,
            visible: None,
        };
    }

    pub fn detach(&mut self) {
        *self = Self::default();
    }

    pub fn is_attached(&self) -> bool {
        self.total_duration.is_some()
    }

    /// Replaces the window width; the current cursor, if any, stays centered.
    pub fn set_zoom_level(&mut self, level: i64) -> Result<()> {
        let level = check_zoom_level(level)?;
        self.zoom_level = level;
        if let Some(total) = self.total_duration {
            self.window_seconds = visible_window_seconds(total, level);
            if let Some(cursor) = self.cursor {
                self.visible = Some(TimeWindow::centered(cursor, self.window_seconds));
            }
        }
        Ok(())
    }

    /// Moves the cursor and recenters the window. Without a trace this does nothing.
    pub fn on_timestamp(&mut self, t: f64) {
        if !self.is_attached() {
            return;
        }
        self.cursor = Some(t);
        self.visible = Some(TimeWindow::centered(t, self.window_seconds));
    }

    pub fn zoom_level(&self) -> u8 {
        self.zoom_level
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn cursor(&self) -> Option<f64> {
        self.cursor
    }

    pub fn visible_range(&self) -> Option<TimeWindow> {
        self.visible
    }

    pub fn total_duration(&self) -> Option<f64> {
        self.total_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_duration_over_level_and_shrinks_with_zoom() {
        for &duration in &[0.5, 2.0, 37.25, 600.0] {
            let mut previous = f64::INFINITY;
            for level in MIN_ZOOM_LEVEL..=MAX_ZOOM_LEVEL {
                let window = visible_window_seconds(duration, level);
                assert_eq!(window, duration / level as f64);
                assert!(window <= previous);
                previous = window;
            }
        }
    }

    #[test]
    fn two_second_recording_at_zoom_two() {
        let mut engine = SyncEngine::default();
        engine.attach(2.0);
        engine.set_zoom_level(2).unwrap();
        assert_eq!(engine.window_seconds(), 1.0);

        engine.on_timestamp(1.0);
        assert_eq!(engine.cursor(), Some(1.0));
        assert_eq!(engine.visible_range(), Some(TimeWindow::new(0.5, 1.5)));
    }

    #[test]
    fn window_is_not_clamped_to_the_data() {
        let mut engine = SyncEngine::default();
        engine.attach(10.0);
        engine.set_zoom_level(5).unwrap();
        engine.on_timestamp(0.0);
        assert_eq!(engine.visible_range(), Some(TimeWindow::new(-1.0, 1.0)));
        engine.on_timestamp(10.0);
        assert_eq!(engine.visible_range(), Some(TimeWindow::new(9.0, 11.0)));
    }

    #[test]
    fn zoom_replaces_rather_than_accumulates() {
        let mut engine = SyncEngine::default();
        engine.attach(20.0);
        engine.set_zoom_level(4).unwrap();
        engine.set_zoom_level(4).unwrap();
        assert_eq!(engine.window_seconds(), 5.0);
        engine.set_zoom_level(2).unwrap();
        assert_eq!(engine.window_seconds(), 10.0);
    }

    #[test]
    fn zoom_recenters_on_existing_cursor() {
        let mut engine = SyncEngine::default();
        engine.attach(8.0);
        engine.on_timestamp(3.0);
        engine.set_zoom_level(4).unwrap();
        assert_eq!(engine.visible_range(), Some(TimeWindow::new(2.0, 4.0)));
    }

    #[test]
    fn out_of_range_levels_are_rejected_and_state_kept() {
        let mut engine = SyncEngine::default();
        engine.attach(10.0);
        engine.set_zoom_level(3).unwrap();
        assert!(matches!(engine.set_zoom_level(0), Err(ViewerError::OutOfRange { .. })));
        assert!(matches!(engine.set_zoom_level(21), Err(ViewerError::OutOfRange { .. })));
        assert_eq!(engine.zoom_level(), 3);
    }

    #[test]
    fn timestamps_without_a_trace_are_ignored() {
        let mut engine = SyncEngine::default();
        engine.on_timestamp(1.0);
        assert_eq!(engine.cursor(), None);
        assert_eq!(engine.visible_range(), None);

        engine.attach(4.0);
        engine.on_timestamp(1.0);
        engine.detach();
        assert_eq!(engine.cursor(), None);
        assert!(!engine.is_attached());
    }
}
