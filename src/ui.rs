// src/ui.rs - Theme, frame display widget and plot helpers
use eframe::egui::{self, Color32, Pos2, Rect, Vec2};
use image::RgbImage;

#[derive(Debug, Clone)]
pub struct Theme {
    pub background: Color32,
    pub error: Color32,
    pub warning: Color32,
    pub success: Color32,
    pub text_secondary: Color32,
    pub cursor: Color32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color32::from_rgb(20, 20, 25),
            error: Color32::from_rgb(244, 67, 54),
            warning: Color32::from_rgb(255, 152, 0),
            success: Color32::from_rgb(76, 175, 80),
            text_secondary: Color32::from_rgb(200, 200, 200),
            cursor: Color32::from_rgb(230, 40, 40),
        }
    }
}

/// Distinct line colours, cycling through nine hues.
pub fn channel_color(index: usize) -> Color32 {
    const HUES: usize = 9;
    let hue = (index % HUES) as f32 / HUES as f32;
    egui::ecolor::Hsva::new(hue, 0.8, 0.95, 1.0).into()
}

/// Axis label as minutes:seconds, e.g. `1:05`.
pub fn format_clock(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let total = seconds.abs().floor() as u64;
    format!("{}{}:{:02}", sign, total / 60, total % 60)
}

/// Largest size with the frame's aspect ratio that fits in `available`.
pub fn fit_size(frame: [usize; 2], available: Vec2) -> Vec2 {
    if frame[0] == 0 || frame[1] == 0 || available.x <= 0.0 || available.y <= 0.0 {
        return Vec2::ZERO;
    }
    let (w, h) = (frame[0] as f32, frame[1] as f32);
    let scale = (available.x / w).min(available.y / h);
    Vec2::new(w * scale, h * scale)
}

/// Shows the current video frame, letterboxed on a black background.
pub struct VideoWidget {
    texture: Option<egui::TextureHandle>,
    shown: Option<usize>,
}

impl VideoWidget {
    pub fn new() -> Self {
        Self {
            texture: None,
            shown: None,
        }
    }

    pub fn shown_frame(&self) -> Option<usize> {
        self.shown
    }

    /// Uploads a frame unless it is already on screen.
    pub fn update_frame(&mut self, ctx: &egui::Context, index: usize, frame: &RgbImage) {
        if self.shown == Some(index) && self.texture.is_some() {
            return;
        }
        let size = [frame.width() as usize, frame.height() as usize];
        let image = egui::ColorImage::from_rgb(size, frame.as_raw());

        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR))
            }
        }
        self.shown = Some(index);
    }

    pub fn clear(&mut self) {
        self.texture = None;
        self.shown = None;
    }

    pub fn show(&self, ui: &mut egui::Ui, size: Vec2) {
        let (rect, _response) = ui.allocate_exact_size(size, egui::Sense::hover());
        ui.painter().rect_filled(rect, egui::Rounding::same(4.0), Color32::BLACK);

        match &self.texture {
            Some(texture) => {
                let image_rect = Rect::from_center_size(rect.center(), fit_size(texture.size(), size));
                ui.painter().image(
                    texture.id(),
                    image_rect,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            None => {
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "No video loaded",
                    egui::FontId::proportional(16.0),
                    Color32::from_rgb(150, 150, 155),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_labels() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(65.9), "1:05");
        assert_eq!(format_clock(600.0), "10:00");
        assert_eq!(format_clock(-1.5), "-0:01");
    }

    #[test]
    fn frames_fit_preserving_aspect() {
        assert_eq!(fit_size([1920, 1080], Vec2::new(960.0, 960.0)), Vec2::new(960.0, 540.0));
        assert_eq!(fit_size([640, 480], Vec2::new(1000.0, 240.0)), Vec2::new(320.0, 240.0));
        assert_eq!(fit_size([0, 480], Vec2::new(100.0, 100.0)), Vec2::ZERO);
    }

    #[test]
    fn channel_colors_cycle() {
        assert_eq!(channel_color(0), channel_color(9));
        assert_ne!(channel_color(0), channel_color(1));
    }
}
