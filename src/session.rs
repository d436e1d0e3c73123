//! Editor state and the commands the UI invokes on it.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{EditorError, Result};
use crate::image_path::{looks_like_image_value, resolve, selected_path};
use crate::literal::field_text;
use crate::overlay::{BoxFormat, OverlayConfig, OverlaySettings};
use crate::render::draw_overlays;
use crate::store::{AnnotationSet, Record};

/// Where the image of an image field stands for the current record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageLookup {
    NoData,
    Missing(String),
    Found(PathBuf),
}

#[derive(Debug, Default)]
pub struct Session {
    set: AnnotationSet,
    current: usize,
    source: Option<PathBuf>,
    fields: BTreeSet<String>,
    image_fields: BTreeSet<String>,
    hidden: BTreeSet<String>,
    overlays: OverlaySettings,
    overlay_fields: Vec<String>,
    image_prefix: Option<PathBuf>,
    image_selection: HashMap<String, usize>,
}

impl Session {
    pub fn new(default_format: BoxFormat, image_prefix: Option<PathBuf>) -> Self {
        Self {
            overlays: OverlaySettings::new(default_format),
            image_prefix,
            ..Default::default()
        }
    }

    /// Loads `path`. On failure nothing about the session changes.
    pub fn open(&mut self, path: &Path) -> Result<usize> {
        let set = AnnotationSet::load(path)?;
        let count = set.len();
        self.replace_set(set, Some(path.to_path_buf()));
        Ok(count)
    }

    pub fn replace_set(&mut self, set: AnnotationSet, source: Option<PathBuf>) {
        self.set = set;
        self.source = source;
        self.current = 0;
        self.fields = self.set.fields();
        self.image_fields = self
            .set
            .records()
            .iter()
            .filter_map(|record| record.get("image"))
            .any(looks_like_image_value)
            .then(|| BTreeSet::from(["image".to_string()]))
            .unwrap_or_default();
        self.hidden.clear();
        self.image_selection.clear();
        self.refresh_overlays();
    }

    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        self.set.save(path)?;
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_record(&self) -> Option<&Record> {
        self.set.get(self.current)
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn is_image_field(&self, field: &str) -> bool {
        self.image_fields.contains(field)
    }

    pub fn go_next(&mut self) -> bool {
        if self.current + 1 < self.set.len() {
            self.go_to(self.current + 1);
            true
        } else {
            false
        }
    }

    pub fn go_prev(&mut self) -> bool {
        if self.current > 0 {
            self.go_to(self.current - 1);
            true
        } else {
            false
        }
    }

    fn go_to(&mut self, index: usize) {
        self.current = index;
        self.image_selection.clear();
        self.refresh_overlays();
    }

    /// Jumps to the next record whose `key` contains `query`. Blank input is
    /// ignored.
    pub fn search(&mut self, key: &str, query: &str) -> Result<Option<usize>> {
        let query = query.trim();
        if key.is_empty() || query.is_empty() || self.set.is_empty() {
            return Ok(None);
        }
        match self.set.find(self.current, key, query) {
            Some(index) => {
                debug!(key, query, index, "search hit");
                self.go_to(index);
                Ok(Some(index))
            }
            None => Err(EditorError::NoMatch {
                key: key.to_string(),
                query: query.to_string(),
            }),
        }
    }

    /// Text shown in the editor of `field` for the current record.
    pub fn field_text(&self, field: &str) -> String {
        self.current_record()
            .and_then(|record| record.get(field))
            .map(field_text)
            .unwrap_or_default()
    }

    /// Writes editor text back into the current record. Image fields holding a
    /// list of paths are read-only. Returns whether the record changed.
    pub fn edit_field(&mut self, field: &str, text: &str) -> bool {
        let Some(previous) = self.current_record().map(|r| r.get(field).cloned()) else {
            return false;
        };
        let unchanged = match &previous {
            Some(value) => field_text(value) == text,
            None => text.is_empty(),
        };
        if unchanged {
            return false;
        }
        if self.is_image_field(field) {
            if matches!(previous, Some(Value::Array(_))) {
                return false;
            }
            self.set
                .set_raw(self.current, field, Value::String(text.to_string()));
        } else {
            self.set.set_field(self.current, field, text);
        }
        self.refresh_overlays();
        true
    }

    pub fn image_field_candidates(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !self.image_fields.contains(*f))
            .cloned()
            .collect()
    }

    pub fn define_image_field(&mut self, field: &str) -> bool {
        if !self.fields.contains(field) || !self.image_fields.insert(field.to_string()) {
            return false;
        }
        info!(field, "image field defined");
        self.refresh_overlays();
        true
    }

    pub fn set_field_visible(&mut self, field: &str, visible: bool) {
        if visible {
            self.hidden.remove(field);
        } else {
            self.hidden.insert(field.to_string());
        }
    }

    pub fn is_field_visible(&self, field: &str) -> bool {
        !self.hidden.contains(field)
    }

    /// The image field whose picture is on screen: the first visible one.
    pub fn displayed_image_field(&self) -> Option<&str> {
        self.image_fields
            .iter()
            .find(|f| self.is_field_visible(f))
            .map(String::as_str)
    }

    pub fn image_prefix(&self) -> Option<&Path> {
        self.image_prefix.as_deref()
    }

    pub fn set_image_prefix(&mut self, prefix: Option<PathBuf>) {
        info!(prefix = ?prefix, "image prefix changed");
        self.image_prefix = prefix;
    }

    pub fn selected_image(&self, field: &str) -> usize {
        self.image_selection.get(field).copied().unwrap_or(0)
    }

    pub fn select_image(&mut self, field: &str, index: usize) {
        self.image_selection.insert(field.to_string(), index);
    }

    pub fn locate_image(&self, field: &str) -> ImageLookup {
        let Some(value) = self.current_record().and_then(|r| r.get(field)) else {
            return ImageLookup::NoData;
        };
        let Some(path) = selected_path(value, self.selected_image(field)) else {
            return ImageLookup::NoData;
        };
        match resolve(path, self.image_prefix()) {
            Some(found) => ImageLookup::Found(found),
            None => {
                debug!(path, "image file does not exist");
                ImageLookup::Missing(path.to_string())
            }
        }
    }

    /// Decodes the image at `path` and paints the enabled overlays of the
    /// current record on it.
    pub fn render_image(&self, path: &Path) -> Result<RgbaImage> {
        let decoded = image::open(path).map_err(|source| {
            warn!(path = %path.display(), error = %source, "failed to load image");
            EditorError::Image {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let base = decoded.to_rgba8();
        Ok(match self.current_record() {
            Some(record) => draw_overlays(&base, record, &self.overlays),
            None => base,
        })
    }

    /// Box-shaped fields of the current record, in record order.
    pub fn overlay_fields(&self) -> &[String] {
        &self.overlay_fields
    }

    pub fn overlay(&self, field: &str) -> Option<&OverlayConfig> {
        self.overlays.get(field)
    }

    pub fn set_overlay_enabled(&mut self, field: &str, enabled: bool) {
        if let Some(config) = self.overlays.get_mut(field) {
            config.enabled = enabled;
        }
    }

    pub fn set_overlay_format(&mut self, field: &str, format: BoxFormat) {
        if let Some(config) = self.overlays.get_mut(field) {
            config.format = format;
        }
    }

    pub fn prev_overlay_index(&mut self, field: &str) -> bool {
        self.overlays.get_mut(field).is_some_and(OverlayConfig::prev_index)
    }

    pub fn next_overlay_index(&mut self, field: &str) -> bool {
        self.overlays.get_mut(field).is_some_and(OverlayConfig::next_index)
    }

    fn refresh_overlays(&mut self) {
        let Some(record) = self.set.get(self.current) else {
            self.overlay_fields.clear();
            return;
        };
        let image_fields = &self.image_fields;
        self.overlay_fields = self
            .overlays
            .refresh(record, |field| image_fields.contains(field));
    }
}
