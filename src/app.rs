use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use eframe::egui;
use egui_extras::{Size, StripBuilder};
use image::RgbaImage;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::{EditorError, ErrorKind};
use crate::overlay::BoxFormat;
use crate::session::{ImageLookup, Session};

// ── Notices ─────────────────────────────────────────────────────────────────

struct Notice {
    title: String,
    body: String,
}

impl Notice {
    fn from_error(action: &str, err: &EditorError) -> Self {
        let title = match err.kind() {
            ErrorKind::NoMatch => "Search".to_string(),
            _ => action.to_string(),
        };
        let body = match err.kind() {
            ErrorKind::NoMatch => "No matching record found!".to_string(),
            ErrorKind::Parse => format!("Failed to load JSON file:\n{err}"),
            ErrorKind::Io | ErrorKind::Format => format!("{action} failed:\n{err}"),
        };
        Self { title, body }
    }
}

// ── App ─────────────────────────────────────────────────────────────────────

pub struct EditorApp {
    session: Session,
    settings: Settings,
    settings_path: PathBuf,

    texture: Option<egui::TextureHandle>,
    image_size: (f32, f32),
    image_dirty: bool,
    image_message: String,

    // editor text per field, and fields edited since the last commit
    buffers: BTreeMap<String, String>,
    dirty: BTreeSet<String>,

    search_key: String,
    search_query: String,

    status: String,
    notice: Option<Notice>,
    define_choice: Option<String>,
    title_dirty: bool,
}

impl EditorApp {
    pub fn new(settings: Settings, settings_path: PathBuf, initial: Option<PathBuf>) -> Self {
        let session = Session::new(settings.default_format, settings.image_prefix.clone());
        let mut app = Self {
            session,
            settings,
            settings_path,
            texture: None,
            image_size: (0.0, 0.0),
            image_dirty: true,
            image_message: "Image Display Area".to_string(),
            buffers: BTreeMap::new(),
            dirty: BTreeSet::new(),
            search_key: String::new(),
            search_query: String::new(),
            status: "Ready".to_string(),
            notice: None,
            define_choice: None,
            title_dirty: false,
        };
        if let Some(path) = initial {
            app.open_path(path);
        }
        app
    }

    fn title(&self) -> String {
        match self.session.source().and_then(|p| p.file_name()) {
            Some(name) => format!("Annotation Editor - {}", name.to_string_lossy()),
            None => "Annotation Editor".to_string(),
        }
    }

    fn load_buffers(&mut self) {
        self.buffers = self
            .session
            .fields()
            .iter()
            .map(|field| (field.clone(), self.session.field_text(field)))
            .collect();
        self.dirty.clear();
        self.image_dirty = true;
    }

    fn commit_field(&mut self, field: &str) {
        if !self.dirty.remove(field) {
            return;
        }
        if let Some(text) = self.buffers.get(field) {
            if self.session.edit_field(field, text) {
                self.image_dirty = true;
            }
        }
    }

    fn commit_edits(&mut self) {
        let pending: Vec<String> = self.dirty.iter().cloned().collect();
        for field in pending {
            self.commit_field(&field);
        }
    }

    // ── Commands ────────────────────────────────────────────────────────────

    fn open_path(&mut self, path: PathBuf) {
        match self.session.open(&path) {
            Ok(count) => {
                self.load_buffers();
                if !self.session.fields().contains(&self.search_key) {
                    self.search_key = self.session.fields().first().cloned().unwrap_or_default();
                }
                self.status = format!("Loaded {count} annotations");
                self.title_dirty = true;
            }
            Err(e) => {
                error!("{}", e);
                self.notice = Some(Notice::from_error("Open JSON", &e));
            }
        }
    }

    fn open_json(&mut self) {
        let picked = rfd::FileDialog::new()
            .add_filter("JSON Files", &["json"])
            .set_title("Open JSON")
            .pick_file();
        if let Some(path) = picked {
            self.open_path(path);
        }
    }

    fn save_json(&mut self) {
        if self.session.is_empty() {
            return;
        }
        self.commit_edits();
        let mut dialog = rfd::FileDialog::new()
            .add_filter("JSON Files", &["json"])
            .set_title("Save JSON");
        if let Some(source) = self.session.source() {
            if let Some(dir) = source.parent() {
                dialog = dialog.set_directory(dir);
            }
            if let Some(name) = source.file_name() {
                dialog = dialog.set_file_name(name.to_string_lossy());
            }
        }
        let Some(path) = dialog.save_file() else {
            return;
        };
        match self.session.save_as(&path) {
            Ok(()) => {
                self.status = format!("Saved successfully: {}", path.display());
                self.title_dirty = true;
            }
            Err(e) => {
                error!("{}", e);
                self.notice = Some(Notice::from_error("Save JSON", &e));
            }
        }
    }

    fn navigate(&mut self, forward: bool) {
        self.commit_edits();
        let moved = if forward {
            self.session.go_next()
        } else {
            self.session.go_prev()
        };
        if moved {
            self.load_buffers();
        }
    }

    fn run_search(&mut self) {
        self.commit_edits();
        match self.session.search(&self.search_key, &self.search_query) {
            Ok(Some(_)) => self.load_buffers(),
            Ok(None) => {}
            Err(e) => {
                info!("{}", e);
                self.notice = Some(Notice::from_error("Search", &e));
            }
        }
    }

    fn set_image_prefix(&mut self) {
        let Some(folder) = rfd::FileDialog::new()
            .set_title("Set Image Prefix")
            .pick_folder()
        else {
            return;
        };
        self.status = format!("Image folder set to: {}", folder.display());
        self.session.set_image_prefix(Some(folder.clone()));
        self.settings.image_prefix = Some(folder);
        if let Err(e) = self.settings.save_to_file(&self.settings_path) {
            warn!("Failed to save settings: {:#}", e);
        }
        self.image_dirty = true;
    }

    fn begin_define_image_field(&mut self) {
        match self.session.image_field_candidates().into_iter().next() {
            Some(first) => self.define_choice = Some(first),
            None => {
                self.notice = Some(Notice {
                    title: "Define Image Field".to_string(),
                    body: "No available field to define as image field".to_string(),
                });
            }
        }
    }

    // ── Image ───────────────────────────────────────────────────────────────

    fn upload_texture(&mut self, ctx: &egui::Context, rgba: &RgbaImage) {
        let size = [rgba.width() as usize, rgba.height() as usize];
        let pixels = rgba.as_flat_samples();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
        self.image_size = (rgba.width() as f32, rgba.height() as f32);
        self.texture = Some(ctx.load_texture("image", color_image, egui::TextureOptions::LINEAR));
    }

    fn refresh_image(&mut self, ctx: &egui::Context) {
        if !self.image_dirty {
            return;
        }
        self.image_dirty = false;
        self.texture = None;
        if self.session.is_empty() {
            self.image_message = "Image Display Area".to_string();
            return;
        }
        let Some(field) = self.session.displayed_image_field().map(str::to_string) else {
            self.image_message = "No image data".to_string();
            return;
        };
        match self.session.locate_image(&field) {
            ImageLookup::NoData => self.image_message = "No image data".to_string(),
            ImageLookup::Missing(path) => {
                warn!(path, "image file does not exist");
                self.image_message = format!("Image file does not exist:\n{path}");
            }
            ImageLookup::Found(path) => match self.session.render_image(&path) {
                Ok(rgba) => self.upload_texture(ctx, &rgba),
                Err(_) => self.image_message = "Failed to load image".to_string(),
            },
        }
    }

    /// Largest rect with the image's aspect ratio centered in `canvas`.
    fn fitted_rect(&self, canvas: egui::Rect) -> egui::Rect {
        let (w, h) = self.image_size;
        if w <= 0.0 || h <= 0.0 {
            return canvas;
        }
        let scale = (canvas.width() / w).min(canvas.height() / h);
        egui::Rect::from_center_size(canvas.center(), egui::vec2(w * scale, h * scale))
    }

    // ── Panels ──────────────────────────────────────────────────────────────

    fn menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open JSON").clicked() {
                        ui.close_menu();
                        self.open_json();
                    }
                    if ui.button("Save JSON").clicked() {
                        ui.close_menu();
                        self.save_json();
                    }
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("Options", |ui| {
                    if ui.button("Set Image Prefix").clicked() {
                        ui.close_menu();
                        self.set_image_prefix();
                    }
                    if ui.button("Define Image Field").clicked() {
                        ui.close_menu();
                        self.begin_define_image_field();
                    }
                });
            });
        });
    }

    fn search_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("search").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Key:");
                egui::ComboBox::from_id_salt("search_key")
                    .selected_text(self.search_key.clone())
                    .show_ui(ui, |ui| {
                        for field in self.session.fields() {
                            ui.selectable_value(&mut self.search_key, field.clone(), field);
                        }
                    });
                ui.label("Value:");
                let edit = ui.text_edit_singleline(&mut self.search_query);
                let submitted =
                    edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Go").clicked() || submitted {
                    self.run_search();
                }
            });
        });
    }

    fn navigation_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("navigation")
            .exact_height(32.0)
            .show(ctx, |ui| {
                StripBuilder::new(ui)
                    .size(Size::exact(90.0))
                    .size(Size::remainder())
                    .size(Size::exact(90.0))
                    .horizontal(|mut strip| {
                        strip.cell(|ui| {
                            if ui.button("Previous").clicked() {
                                self.navigate(false);
                            }
                        });
                        strip.cell(|ui| {
                            let page = if self.session.is_empty() {
                                "0/0".to_string()
                            } else {
                                format!(
                                    "{}/{}",
                                    self.session.current_index() + 1,
                                    self.session.len()
                                )
                            };
                            ui.centered_and_justified(|ui| ui.label(page));
                        });
                        strip.cell(|ui| {
                            if ui.button("Next").clicked() {
                                self.navigate(true);
                            }
                        });
                    });
            });
    }

    fn overlay_panel(&mut self, ctx: &egui::Context) {
        let fields: Vec<String> = self.session.overlay_fields().to_vec();
        egui::TopBottomPanel::bottom("overlays")
            .resizable(true)
            .show(ctx, |ui| {
                ui.strong("Overlay Options");
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for field in &fields {
                        let Some(config) = self.session.overlay(field).cloned() else {
                            continue;
                        };
                        ui.group(|ui| {
                            ui.horizontal(|ui| {
                                ui.label(format!("{field} (bbox)"));
                                let mut enabled = config.enabled;
                                if ui.checkbox(&mut enabled, "Show").changed() {
                                    self.session.set_overlay_enabled(field, enabled);
                                    self.image_dirty = true;
                                }

                                let mut format = config.format;
                                egui::ComboBox::from_id_salt(("overlay_format", field.as_str()))
                                    .selected_text(format.to_string())
                                    .show_ui(ui, |ui| {
                                        for option in BoxFormat::ALL {
                                            ui.selectable_value(
                                                &mut format,
                                                option,
                                                option.to_string(),
                                            );
                                        }
                                    });
                                if format != config.format {
                                    self.session.set_overlay_format(field, format);
                                    self.image_dirty = true;
                                }

                                if config.max_index > 0 {
                                    if ui.button("Prev").clicked()
                                        && self.session.prev_overlay_index(field)
                                    {
                                        self.image_dirty = true;
                                    }
                                    if ui.button("Next").clicked()
                                        && self.session.next_overlay_index(field)
                                    {
                                        self.image_dirty = true;
                                    }
                                    if let Some(config) = self.session.overlay(field) {
                                        ui.label(format!(
                                            "{} / {}",
                                            config.index, config.max_index
                                        ));
                                    }
                                }
                            });
                        });
                    }
                });
            });
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(&self.status);
        });
    }

    fn image_field_editor(&mut self, ui: &mut egui::Ui, field: &str) {
        let value = self
            .session
            .current_record()
            .and_then(|r| r.get(field))
            .cloned();
        if let Some(Value::Array(paths)) = value {
            ui.horizontal(|ui| {
                let mut selected = self.session.selected_image(field);
                egui::ComboBox::from_id_salt(("image_select", field))
                    .selected_text(format!("Image {}", selected + 1))
                    .show_ui(ui, |ui| {
                        for i in 0..paths.len() {
                            ui.selectable_value(&mut selected, i, format!("Image {}", i + 1));
                        }
                    });
                if selected != self.session.selected_image(field) {
                    self.session.select_image(field, selected);
                    self.image_dirty = true;
                }
                let mut shown = paths
                    .get(selected)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                ui.add(
                    egui::TextEdit::singleline(&mut shown)
                        .interactive(false)
                        .desired_width(f32::INFINITY),
                );
            });
            return;
        }

        let buf = self.buffers.entry(field.to_string()).or_default();
        let response = ui.add(egui::TextEdit::singleline(buf).desired_width(f32::INFINITY));
        if response.changed() {
            self.dirty.insert(field.to_string());
        }
        if response.lost_focus() {
            self.commit_field(field);
        }
    }

    fn text_field_editor(&mut self, ui: &mut egui::Ui, field: &str) {
        let buf = self.buffers.entry(field.to_string()).or_default();
        let response = ui.add(
            egui::TextEdit::multiline(buf)
                .desired_rows(2)
                .desired_width(f32::INFINITY),
        );
        if response.changed() {
            self.dirty.insert(field.to_string());
        }
        if response.lost_focus() {
            self.commit_field(field);
        }
    }

    fn field_panel(&mut self, ctx: &egui::Context) {
        let fields: Vec<String> = self.session.fields().iter().cloned().collect();
        egui::SidePanel::right("fields")
            .resizable(true)
            .default_width(420.0)
            .show(ctx, |ui| {
                ui.horizontal_wrapped(|ui| {
                    for field in &fields {
                        let mut visible = self.session.is_field_visible(field);
                        if ui.checkbox(&mut visible, field).changed() {
                            self.session.set_field_visible(field, visible);
                            if self.session.is_image_field(field) {
                                self.image_dirty = true;
                            }
                        }
                    }
                });
                ui.separator();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for field in &fields {
                        if !self.session.is_field_visible(field) {
                            continue;
                        }
                        ui.label(egui::RichText::new(field).strong());
                        if self.session.is_image_field(field) {
                            self.image_field_editor(ui, field);
                        } else {
                            self.text_field_editor(ui, field);
                        }
                        ui.add_space(6.0);
                    }
                });
            });
    }

    fn canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) =
                ui.allocate_painter(ui.available_size(), egui::Sense::hover());
            let canvas_rect = response.rect;
            painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(40));

            match self.texture {
                Some(ref tex) => {
                    painter.image(
                        tex.id(),
                        self.fitted_rect(canvas_rect),
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );
                }
                None => {
                    painter.text(
                        canvas_rect.center(),
                        egui::Align2::CENTER_CENTER,
                        &self.image_message,
                        egui::FontId::proportional(18.0),
                        egui::Color32::from_gray(200),
                    );
                }
            }
        });
    }

    fn dialogs(&mut self, ctx: &egui::Context) {
        if let Some(notice) = &self.notice {
            let mut close = false;
            egui::Window::new(notice.title.as_str())
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(&notice.body);
                    if ui.button("OK").clicked() {
                        close = true;
                    }
                });
            if close {
                self.notice = None;
            }
        }

        if let Some(mut choice) = self.define_choice.clone() {
            let candidates = self.session.image_field_candidates();
            let mut outcome = None;
            egui::Window::new("Define Image Field")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label("Select a field to use as image field:");
                    egui::ComboBox::from_id_salt("define_image_field")
                        .selected_text(choice.clone())
                        .show_ui(ui, |ui| {
                            for field in &candidates {
                                ui.selectable_value(&mut choice, field.clone(), field);
                            }
                        });
                    ui.horizontal(|ui| {
                        if ui.button("OK").clicked() {
                            outcome = Some(true);
                        }
                        if ui.button("Cancel").clicked() {
                            outcome = Some(false);
                        }
                    });
                });
            match outcome {
                Some(true) => {
                    if self.session.define_image_field(&choice) {
                        self.status = format!("Define Image Field: {choice}");
                        self.load_buffers();
                    }
                    self.define_choice = None;
                }
                Some(false) => self.define_choice = None,
                None => self.define_choice = Some(choice),
            }
        }
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for EditorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Keyboard shortcuts
        let (open, save, prev, next) = ctx.input(|i| {
            (
                i.modifiers.ctrl && i.key_pressed(egui::Key::O),
                i.modifiers.ctrl && i.key_pressed(egui::Key::S),
                i.key_pressed(egui::Key::PageUp),
                i.key_pressed(egui::Key::PageDown),
            )
        });
        if open {
            self.open_json();
        }
        if save {
            self.save_json();
        }
        if prev {
            self.navigate(false);
        }
        if next {
            self.navigate(true);
        }

        if self.title_dirty {
            self.title_dirty = false;
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(self.title()));
        }

        self.menu_bar(ctx);
        self.search_bar(ctx);
        self.status_bar(ctx);
        self.navigation_bar(ctx);
        self.overlay_panel(ctx);
        self.field_panel(ctx);

        self.refresh_image(ctx);
        self.canvas(ctx);
        self.dialogs(ctx);
    }
}
