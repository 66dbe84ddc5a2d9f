// src/app.rs
use crate::catalog::{Catalog, Level};
use crate::config::ViewerConfig;
use crate::session::{LoadStatus, Session};
use crate::sync::{TimeWindow, MAX_ZOOM_LEVEL, MIN_ZOOM_LEVEL};
use crate::ui::{channel_color, format_clock, Theme, VideoWidget};
use crate::video::LoadProgress;

use eframe::egui;
use egui_plot::{Legend, Line, LineStyle, Plot, PlotBounds, PlotPoints, VLine};
use std::time::Instant;

const CHANNELS_PER_ROW: usize = 9;

#[derive(Debug, Clone, Copy, Default)]
struct KeyPresses {
    escape: bool,
    space: bool,
    left: bool,
    right: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shortcut {
    LeaveFullscreen,
    TogglePlay,
    StepBackward,
    StepForward,
}

/// A focused widget (the scrubber, a combo box) owns the transport keys;
/// Escape always works.
fn shortcuts(keys: KeyPresses, widget_focused: bool) -> Vec<Shortcut> {
    let mut actions = Vec::new();
    if keys.escape {
        actions.push(Shortcut::LeaveFullscreen);
    }
    if widget_focused {
        return actions;
    }
    if keys.space {
        actions.push(Shortcut::TogglePlay);
    }
    if keys.left {
        actions.push(Shortcut::StepBackward);
    }
    if keys.right {
        actions.push(Shortcut::StepForward);
    }
    actions
}

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Idle,
    Info(String),
    Warning(String),
    Error(String),
}

pub struct ViewerApp {
    session: Session,
    frames_per_update: usize,

    // UI State
    theme: Theme,
    video: VideoWidget,
    status: Status,
    load_progress: Option<LoadProgress>,
}

impl ViewerApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: ViewerConfig) -> Self {
        tracing::info!(
            "Processed root: {}, IMU root: {}",
            config.processed_root.display(),
            config.ready_root.display()
        );
        let catalog = Catalog::new(config.processed_root, config.ready_root);

        Self {
            session: Session::new(catalog, config.decode_max_width),
            frames_per_update: config.frames_per_update,
            theme: Theme::default(),
            video: VideoWidget::new(),
            status: Status::Idle,
            load_progress: None,
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let keys = ctx.input(|i| KeyPresses {
            escape: i.key_pressed(egui::Key::Escape),
            space: i.key_pressed(egui::Key::Space),
            left: i.key_pressed(egui::Key::ArrowLeft),
            right: i.key_pressed(egui::Key::ArrowRight),
        });
        let widget_focused = ctx.memory(|m| m.focus().is_some()) || ctx.wants_keyboard_input();

        for shortcut in shortcuts(keys, widget_focused) {
            match shortcut {
                Shortcut::LeaveFullscreen => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(false))
                }
                Shortcut::TogglePlay => self.session.toggle_play(Instant::now()),
                Shortcut::StepBackward => {
                    self.session.step_backward();
                }
                Shortcut::StepForward => {
                    self.session.step_forward();
                }
            }
        }
    }

    /// One decode batch per UI update keeps the window responsive.
    fn drive_load(&mut self, ctx: &egui::Context) {
        if !self.session.is_loading() {
            return;
        }
        match self.session.poll_load(self.frames_per_update) {
            Ok(LoadStatus::InProgress(progress)) => {
                self.load_progress = Some(progress);
                ctx.request_repaint();
            }
            Ok(LoadStatus::Finished) => {
                self.load_progress = None;
                self.status = match self.session.clip() {
                    Some(clip) if !clip.signal.warnings().is_empty() => {
                        let warnings = clip.signal.warnings();
                        let first = &warnings[0];
                        Status::Warning(format!(
                            "Loaded {} frames; {} IMU values could not be parsed and are shown as gaps \
                             (first: '{}' in {} at row {})",
                            clip.video.frame_count(),
                            warnings.len(),
                            first.raw,
                            first.channel,
                            first.row + 1
                        ))
                    }
                    Some(clip) => Status::Info(format!(
                        "Loaded {}: {} frames at {:.2} fps, {} IMU channels",
                        clip.video
                            .path()
                            .file_name()
                            .map_or_else(
                                || clip.selection.to_string(),
                                |name| name.to_string_lossy().into_owned()
                            ),
                        clip.video.frame_count(),
                        clip.video.frame_rate().fps(),
                        clip.signal.channels().len()
                    )),
                    None => Status::Idle,
                };
            }
            Err(e) => {
                tracing::error!("Load failed: {}", e);
                self.load_progress = None;
                self.status = Status::Error(e.to_string());
            }
        }
    }

    fn drive_clock(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        self.session.poll_clock(now);
        if let Some(deadline) = self.session.playback().next_deadline() {
            ctx.request_repaint_after(deadline.saturating_duration_since(now));
        }
    }

    fn sync_frame(&mut self, ctx: &egui::Context) {
        let Some(clip) = self.session.clip() else {
            if self.video.shown_frame().is_some() {
                self.video.clear();
            }
            return;
        };
        let index = self.session.playback().index();
        match clip.video.get_frame(index) {
            Ok(frame) => self.video.update_frame(ctx, index, frame),
            Err(e) => tracing::warn!("Cannot show frame: {}", e),
        }
    }

    fn render_header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                let loading = self.session.is_loading();
                for level in Level::ALL {
                    self.render_selector(ui, level, loading);
                }

                ui.separator();

                let ready = !loading && self.session.selection().is_complete();
                let load = ui
                    .add_enabled(ready, egui::Button::new("Load").min_size(egui::vec2(80.0, 0.0)))
                    .on_disabled_hover_text("Select patient, session, camera and segment first");
                if load.clicked() {
                    self.start_load();
                }
            });
            ui.add_space(8.0);
        });
    }

    fn render_selector(&mut self, ui: &mut egui::Ui, level: Level, loading: bool) {
        let placeholder = format!("Select {}", level.label());
        let current = self.session.selection().get(level).map(str::to_owned);
        let enabled = !loading && self.session.selection().is_reachable(level);
        let mut picked: Option<Option<String>> = None;

        ui.label(format!("{}:", level.label()));
        ui.add_enabled_ui(enabled, |ui| {
            egui::ComboBox::from_id_source(level.label())
                .selected_text(current.clone().unwrap_or_else(|| placeholder.clone()))
                .width(150.0)
                .show_ui(ui, |ui| {
                    if ui.selectable_label(current.is_none(), placeholder.as_str()).clicked() {
                        picked = Some(None);
                    }
                    for choice in self.session.choices(level) {
                        let selected = current.as_deref() == Some(choice.as_str());
                        if ui.selectable_label(selected, choice.as_str()).clicked() {
                            picked = Some(Some(choice.clone()));
                        }
                    }
                });
        });

        if let Some(value) = picked {
            if self.session.select(level, value) {
                self.video.clear();
                self.status = Status::Idle;
            }
        }
    }

    fn start_load(&mut self) {
        match self.session.begin_load() {
            Ok(()) => {
                self.video.clear();
                self.load_progress = Some(LoadProgress::Indeterminate { decoded: 0 });
                self.status = Status::Info("Decoding video...".into());
            }
            Err(e) => {
                tracing::warn!("Load rejected: {}", e);
                self.status = Status::Error(e.to_string());
            }
        }
    }

    fn render_bottom_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("signals").show(ctx, |ui| {
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                ui.label("Zoom:");
                let mut level = self.session.sync().zoom_level();
                let response = ui.add_enabled(
                    self.session.clip().is_some(),
                    egui::Slider::new(&mut level, MIN_ZOOM_LEVEL..=MAX_ZOOM_LEVEL)
                        .step_by(1.0)
                        .suffix("x"),
                );
                if response.changed() {
                    if let Err(e) = self.session.set_zoom_level(level as i64) {
                        self.status = Status::Error(e.to_string());
                    }
                }
                let sync = self.session.sync();
                if let Some(total) = sync.total_duration() {
                    ui.label(format!(
                        "{:.2} s of {} visible",
                        sync.window_seconds(),
                        format_clock(total)
                    ));
                }
            });

            ui.separator();
            ui.label("Select signal(s) to plot");
            self.render_channel_toggles(ui);

            ui.separator();
            self.render_status(ui);
            ui.add_space(8.0);
        });
    }

    fn render_channel_toggles(&mut self, ui: &mut egui::Ui) {
        let Some(clip) = self.session.clip() else {
            ui.weak("No signals loaded");
            return;
        };

        let mut toggled = Vec::new();
        egui::Grid::new("channel_toggles").show(ui, |ui| {
            for (i, name) in clip.signal.channel_names().enumerate() {
                let mut visible = clip.signal.is_visible(name);
                let label = egui::RichText::new(name).color(channel_color(i));
                if ui.checkbox(&mut visible, label).changed() {
                    toggled.push(name.to_owned());
                }
                if (i + 1) % CHANNELS_PER_ROW == 0 {
                    ui.end_row();
                }
            }
        });

        for name in toggled {
            if let Err(e) = self.session.toggle_channel(&name) {
                tracing::warn!("{}", e);
            }
        }
    }

    fn render_status(&self, ui: &mut egui::Ui) {
        let (text, color) = match &self.status {
            Status::Idle => ("Ready".to_string(), self.theme.text_secondary),
            Status::Info(text) => (text.clone(), self.theme.success),
            Status::Warning(text) => (text.clone(), self.theme.warning),
            Status::Error(text) => (text.clone(), self.theme.error),
        };
        ui.colored_label(color, text);
    }

    fn render_main_content(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::central_panel(&ctx.style()).fill(self.theme.background))
            .show(ctx, |ui| {
                let video_height = (ui.available_height() * 0.55).max(240.0);
                let video_size = egui::vec2(ui.available_width(), video_height);
                self.video.show(ui, video_size);

                ui.add_space(6.0);
                self.render_transport(ui);
                self.render_load_progress(ui);
                ui.add_space(6.0);
                self.render_plot(ui);
            });
    }

    fn render_transport(&mut self, ui: &mut egui::Ui) {
        let has_clip = self.session.clip().is_some();
        let playing = self.session.playback().is_playing();

        ui.horizontal(|ui| {
            if ui.add_enabled(has_clip && !playing, egui::Button::new("▶ Play")).clicked() {
                self.session.play(Instant::now());
            }
            if ui.add_enabled(playing, egui::Button::new("⏸ Pause")).clicked() {
                self.session.pause();
            }
            if ui.add_enabled(has_clip, egui::Button::new("⏹ Stop")).clicked() {
                self.session.stop();
            }
            if ui.add_enabled(has_clip && !playing, egui::Button::new("⏮ Previous")).clicked() {
                self.session.step_backward();
            }
            if ui.add_enabled(has_clip && !playing, egui::Button::new("⏭ Next")).clicked() {
                self.session.step_forward();
            }

            ui.separator();

            let playback = self.session.playback();
            let frame_count = playback.frame_count();
            let mut position = playback.index();
            let time = self
                .session
                .clip()
                .map_or(0.0, |clip| clip.video.timestamp(position));
            ui.label(format!("{} ({:?})", format_clock(time), self.session.mode()));

            ui.spacing_mut().slider_width = (ui.available_width() - 80.0).max(100.0);
            let scrubber = ui.add_enabled(
                has_clip,
                egui::Slider::new(&mut position, 0..=frame_count.saturating_sub(1)),
            );
            if scrubber.changed() {
                self.session.set_position(position);
            }
        });
    }

    fn render_load_progress(&self, ui: &mut egui::Ui) {
        let Some(progress) = self.load_progress else {
            return;
        };
        let bar = match progress.fraction() {
            Some(fraction) => egui::ProgressBar::new(fraction)
                .show_percentage()
                .text(format!("Decoded {} frames", progress.decoded())),
            None => egui::ProgressBar::new(0.0)
                .animate(true)
                .text(format!("Decoded {} frames", progress.decoded())),
        };
        ui.add(bar);
    }

    fn render_plot(&self, ui: &mut egui::Ui) {
        let Some(clip) = self.session.clip() else {
            ui.centered_and_justified(|ui| {
                ui.weak("Load a segment to plot its IMU signals");
            });
            return;
        };

        let sync = self.session.sync();
        let window = widen(
            sync.visible_range()
                .unwrap_or_else(|| TimeWindow::new(0.0, sync.window_seconds())),
        );
        let (y_min, y_max) = pad_range(clip.signal.value_range(window).unwrap_or((-1.0, 1.0)));
        let cursor = sync.cursor();
        let cursor_color = self.theme.cursor;

        Plot::new("imu_plot")
            .legend(Legend::default())
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .allow_boxed_zoom(false)
            .allow_double_click_reset(false)
            .x_axis_formatter(|x, _max_chars, _range| format_clock(x))
            .show(ui, |plot_ui| {
                plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                    [window.start, y_min],
                    [window.end, y_max],
                ));

                for (i, name) in clip.signal.channel_names().enumerate() {
                    if !clip.signal.is_visible(name) {
                        continue;
                    }
                    for run in clip.signal.line_runs(name, window) {
                        plot_ui.line(
                            Line::new(PlotPoints::from(run))
                                .name(name)
                                .color(channel_color(i))
                                .width(1.5),
                        );
                    }
                }

                if let Some(t) = cursor {
                    plot_ui.vline(
                        VLine::new(t)
                            .color(cursor_color)
                            .style(LineStyle::dashed_loose())
                            .width(1.5),
                    );
                }
            });
    }
}

// A single-sample trace has a zero-width window.
fn widen(window: TimeWindow) -> TimeWindow {
    if window.width() > f64::EPSILON {
        window
    } else {
        TimeWindow::new(window.start - 0.5, window.end + 0.5)
    }
}

fn pad_range((lo, hi): (f64, f64)) -> (f64, f64) {
    let span = hi - lo;
    if span <= f64::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo - span * 0.05, hi + span * 0.05)
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_keys(ctx);
        self.drive_load(ctx);
        self.drive_clock(ctx);
        self.sync_frame(ctx);

        self.render_header(ctx);
        self.render_bottom_panel(ctx);
        self.render_main_content(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_ranges_get_a_visible_span() {
        assert_eq!(pad_range((2.0, 2.0)), (1.0, 3.0));
        let (lo, hi) = pad_range((0.0, 10.0));
        assert!(lo < 0.0 && hi > 10.0);
    }

    #[test]
    fn focused_widget_keeps_the_arrow_keys() {
        let keys = KeyPresses {
            escape: true,
            space: true,
            left: true,
            right: false,
        };
        assert_eq!(shortcuts(keys, true), vec![Shortcut::LeaveFullscreen]);
        assert_eq!(
            shortcuts(keys, false),
            vec![Shortcut::LeaveFullscreen, Shortcut::TogglePlay, Shortcut::StepBackward]
        );

        let right = KeyPresses {
            right: true,
            ..KeyPresses::default()
        };
        assert!(shortcuts(right, true).is_empty());
        assert_eq!(shortcuts(right, false), vec![Shortcut::StepForward]);
    }

    #[test]
    fn zero_width_window_is_widened() {
        assert_eq!(widen(TimeWindow::new(0.0, 0.0)), TimeWindow::new(-0.5, 0.5));
        assert_eq!(widen(TimeWindow::new(1.0, 2.0)), TimeWindow::new(1.0, 2.0));
    }
}
