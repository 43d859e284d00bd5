//! egui overlay: toolbar, drop zone, loading indicator, error line and the
//! info dialog.

use egui::{Align2, Color32, RichText, Sense, Vec2};

/// Color for the last load error.
const ERROR_COLOR: Color32 = Color32::from_rgb(235, 87, 87);

/// Overlay state that persists between frames.
#[derive(Debug, Clone, Default)]
pub struct OverlayState {
    /// Whether the info dialog is open
    pub info_open: bool,
}

/// Scene numbers shown in the toolbar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SceneStats {
    pub instances: usize,
    pub triangles: usize,
    pub fps: f32,
}

/// Everything the overlay displays, gathered by the application each frame.
#[derive(Debug, Clone, Default)]
pub struct OverlayStatus<'a> {
    pub loading: bool,
    pub content_visible: bool,
    pub error: Option<&'a str>,
    pub file_name: Option<&'a str>,
    /// A file is being dragged over the window
    pub hovering: bool,
    /// The hovered file has a supported extension
    pub hover_accepted: bool,
    pub stats: SceneStats,
}

/// What the user asked for this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayActions {
    pub open_picker: bool,
    pub frame_content: bool,
}

/// Draw the overlay and collect the user's requests.
pub fn draw_overlay(
    ctx: &egui::Context,
    state: &mut OverlayState,
    status: &OverlayStatus<'_>,
) -> OverlayActions {
    let mut actions = OverlayActions::default();

    egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if ui.button("Open…").clicked() {
                actions.open_picker = true;
            }
            if ui
                .add_enabled(status.content_visible, egui::Button::new("Frame"))
                .clicked()
            {
                actions.frame_content = true;
            }
            if ui.selectable_label(state.info_open, "Info").clicked() {
                state.info_open = !state.info_open;
            }

            ui.separator();

            if status.loading {
                ui.add(egui::Spinner::new());
                ui.label(format!("Loading {}…", status.file_name.unwrap_or("file")));
            } else if let Some(error) = status.error {
                ui.colored_label(ERROR_COLOR, error);
            } else if let Some(name) = status.file_name.filter(|_| status.content_visible) {
                ui.label(name);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("{:.0} fps", status.stats.fps));
                if status.content_visible {
                    ui.separator();
                    ui.label(format!(
                        "{} instances, {} triangles",
                        status.stats.instances, status.stats.triangles
                    ));
                }
            });
        });
    });

    if status.hovering || (!status.content_visible && !status.loading) {
        if drop_zone(ctx, status) {
            actions.open_picker = true;
        }
    }

    egui::Window::new("About zview")
        .open(&mut state.info_open)
        .collapsible(false)
        .resizable(false)
        .anchor(Align2::RIGHT_TOP, Vec2::new(-12.0, 40.0))
        .show(ctx, |ui| {
            ui.label("Drop a .usdz file onto the window, or click the drop zone to browse.");
            ui.label("Loading a new file replaces the current one.");
            ui.separator();
            ui.label("Left drag: orbit");
            ui.label("Middle drag: pan");
            ui.label("Scroll: dolly");
            ui.label("O: open, F: frame, I: this dialog");
        });

    actions
}

/// The centered drop target. Returns `true` when clicked.
fn drop_zone(ctx: &egui::Context, status: &OverlayStatus<'_>) -> bool {
    let (text, color) = match (status.hovering, status.hover_accepted) {
        (true, true) => ("Release to load", Color32::LIGHT_GREEN),
        (true, false) => ("Not a .usdz file, loading will likely fail", Color32::YELLOW),
        (false, _) => ("Drop a .usdz file here or click to browse", Color32::LIGHT_GRAY),
    };

    let response = egui::Area::new(egui::Id::new("drop_zone"))
        .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
        .show(ctx, |ui| {
            egui::Frame::group(ui.style())
                .inner_margin(egui::Margin::same(32.0))
                .stroke(egui::Stroke::new(2.0, color))
                .show(ui, |ui| {
                    ui.label(RichText::new(text).size(18.0).color(color));
                })
                .response
                .interact(Sense::click())
        })
        .inner;

    response.clicked()
}
