//! Status overlay: the one line of text the experience shows the visitor.

use egui::{Align2, Color32, RichText};

/// What the overlay shows this frame.
#[derive(Debug, Clone, Default)]
pub struct HudState {
    /// Current status line; empty hides the banner.
    pub status: String,
    /// Set when setup failed; shown instead of the status line.
    pub fatal: Option<String>,
    pub points: usize,
    pub fireflies: usize,
}

pub fn draw_hud(ctx: &egui::Context, hud: &HudState) {
    let (text, color) = match &hud.fatal {
        Some(message) => (message.as_str(), Color32::from_rgb(255, 120, 110)),
        None => (hud.status.as_str(), Color32::from_rgb(235, 235, 225)),
    };

    if !text.is_empty() {
        egui::Area::new(egui::Id::new("status_banner"))
            .anchor(Align2::CENTER_BOTTOM, [0.0, -32.0])
            .interactable(false)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(Color32::from_black_alpha(160))
                    .rounding(8.0)
                    .inner_margin(egui::Margin::symmetric(16.0, 10.0))
                    .show(ui, |ui| {
                        ui.label(RichText::new(text).size(18.0).color(color));
                    });
            });
    }

    if hud.points > 0 {
        egui::Area::new(egui::Id::new("point_count"))
            .anchor(Align2::LEFT_TOP, [12.0, 12.0])
            .interactable(false)
            .show(ctx, |ui| {
                ui.label(
                    RichText::new(format!("{} points · {} fireflies", hud.points, hud.fireflies))
                        .small()
                        .color(Color32::from_gray(150)),
                );
            });
    }
}
