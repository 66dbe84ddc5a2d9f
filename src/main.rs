// src/main.rs
mod app;
mod catalog;
mod config;
mod data;
mod error;
mod playback;
mod session;
mod sync;
mod ui;
mod video;

#[cfg(test)]
mod test_support;

use eframe::egui;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = match config::ViewerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Falling back to default configuration: {:#}", e);
            config::ViewerConfig::default()
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([960.0, 640.0])
            .with_fullscreen(true),
        centered: true,
        ..Default::default()
    };

    let result = eframe::run_native(
        "Video + IMU Viewer",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(create_visuals());
            Box::new(app::ViewerApp::new(cc, config))
        }),
    );

    if let Err(e) = result {
        tracing::error!("Error running application: {:?}", e);
    }
}

fn create_visuals() -> egui::Visuals {
    let mut visuals = egui::Visuals::dark();

    visuals.widgets.noninteractive.bg_fill = egui::Color32::from_rgb(30, 30, 35);
    visuals.widgets.inactive.bg_fill = egui::Color32::from_rgb(45, 45, 52);
    visuals.widgets.hovered.bg_fill = egui::Color32::from_rgb(55, 55, 65);
    visuals.widgets.active.bg_fill = egui::Color32::from_rgb(70, 130, 240);
    visuals.selection.bg_fill = egui::Color32::from_rgb(70, 130, 240);

    for widget in [
        &mut visuals.widgets.noninteractive,
        &mut visuals.widgets.inactive,
        &mut visuals.widgets.hovered,
        &mut visuals.widgets.active,
    ] {
        widget.rounding = egui::Rounding::same(6.0);
    }
    visuals.window_rounding = egui::Rounding::same(10.0);

    visuals
}
