//! Bounding-box overlays: shape detection, coordinate conventions and the
//! per-field display settings that survive record navigation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EditorError, Result};
use crate::store::Record;

/// Axis-aligned rectangle in image pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseFormat {
    /// Center x, center y, width, height.
    CxCyWh,
    /// Two opposite corners.
    XyXy,
    /// Top-left corner, width, height.
    XyWh,
}

/// How four numbers are read as a rectangle. Normalized formats are
/// fractions of the image size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoxFormat {
    pub base: BaseFormat,
    pub normalized: bool,
}

impl BoxFormat {
    pub const ALL: [BoxFormat; 6] = [
        BoxFormat::pixel(BaseFormat::CxCyWh),
        BoxFormat::pixel(BaseFormat::XyXy),
        BoxFormat::pixel(BaseFormat::XyWh),
        BoxFormat::normalized(BaseFormat::CxCyWh),
        BoxFormat::normalized(BaseFormat::XyXy),
        BoxFormat::normalized(BaseFormat::XyWh),
    ];

    pub const fn pixel(base: BaseFormat) -> Self {
        Self {
            base,
            normalized: false,
        }
    }

    pub const fn normalized(base: BaseFormat) -> Self {
        Self {
            base,
            normalized: true,
        }
    }

    pub fn to_rect(self, coords: [f64; 4], image_width: u32, image_height: u32) -> Rect {
        let (sx, sy) = if self.normalized {
            (f64::from(image_width), f64::from(image_height))
        } else {
            (1.0, 1.0)
        };
        let [a, b, c, d] = coords;
        let (x, y, w, h) = match self.base {
            BaseFormat::XyXy => (a, b, c - a, d - b),
            BaseFormat::XyWh => (a, b, c, d),
            BaseFormat::CxCyWh => (a - c / 2.0, b - d / 2.0, c, d),
        };
        Rect::new(
            (x * sx) as f32,
            (y * sy) as f32,
            (w * sx) as f32,
            (h * sy) as f32,
        )
    }
}

impl Default for BoxFormat {
    fn default() -> Self {
        BoxFormat::pixel(BaseFormat::XyXy)
    }
}

impl fmt::Display for BoxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base {
            BaseFormat::CxCyWh => "cxcywh",
            BaseFormat::XyXy => "xyxy",
            BaseFormat::XyWh => "xywh",
        };
        if self.normalized {
            write!(f, "normalized {base}")
        } else {
            f.write_str(base)
        }
    }
}

impl FromStr for BoxFormat {
    type Err = EditorError;

    /// Accepts `xyxy`, `normalized xyxy` and `norm-xyxy` spellings.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (normalized, base) = if let Some(rest) = trimmed.strip_prefix("normalized") {
            (true, rest.trim_start_matches([' ', '-', '_']))
        } else if let Some(rest) = trimmed.strip_prefix("norm-") {
            (true, rest)
        } else {
            (false, trimmed)
        };
        let base = match base {
            "cxcywh" => BaseFormat::CxCyWh,
            "xyxy" => BaseFormat::XyXy,
            "xywh" => BaseFormat::XyWh,
            _ => return Err(EditorError::UnknownFormat(s.to_string())),
        };
        Ok(Self { base, normalized })
    }
}

impl TryFrom<String> for BoxFormat {
    type Error = EditorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BoxFormat> for String {
    fn from(value: BoxFormat) -> Self {
        value.to_string()
    }
}

/// What a field value looks like from the overlay's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxShape {
    Single,
    Multi(usize),
}

impl BoxShape {
    pub fn classify(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if is_box(items) {
            return Some(BoxShape::Single);
        }
        match items.first() {
            Some(Value::Array(first)) if is_box(first) => Some(BoxShape::Multi(items.len())),
            _ => None,
        }
    }

    pub fn count(self) -> usize {
        match self {
            BoxShape::Single => 1,
            BoxShape::Multi(n) => n,
        }
    }
}

fn is_box(items: &[Value]) -> bool {
    items.len() == 4 && items.iter().all(Value::is_number)
}

/// Picks the box to draw out of a box-shaped value. Out-of-range indices fall
/// back to the first box.
pub fn select_box(value: &Value, index: usize) -> Option<&Value> {
    match BoxShape::classify(value)? {
        BoxShape::Single => Some(value),
        BoxShape::Multi(len) => {
            let items = value.as_array()?;
            items.get(if index < len { index } else { 0 })
        }
    }
}

/// Reads the first four entries of `raw` as coordinates.
pub fn box_coords(raw: &Value) -> Result<[f64; 4]> {
    let items = raw
        .as_array()
        .ok_or_else(|| EditorError::MalformedBox(format!("{raw} is not a list")))?;
    if items.len() < 4 {
        return Err(EditorError::MalformedBox(format!(
            "expected 4 values, got {}",
            items.len()
        )));
    }
    let mut coords = [0.0; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .ok_or_else(|| EditorError::MalformedBox(format!("{item} is not a number")))?;
    }
    Ok(coords)
}

pub fn convert_box(
    raw: &Value,
    format: BoxFormat,
    image_width: u32,
    image_height: u32,
) -> Result<Rect> {
    let coords = box_coords(raw)?;
    Ok(format.to_rect(coords, image_width, image_height))
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub format: BoxFormat,
    pub index: usize,
    pub max_index: usize,
}

impl OverlayConfig {
    pub fn new(format: BoxFormat, max_index: usize) -> Self {
        Self {
            enabled: false,
            format,
            index: 0,
            max_index,
        }
    }

    pub fn prev_index(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    pub fn next_index(&mut self) -> bool {
        if self.index < self.max_index {
            self.index += 1;
            true
        } else {
            false
        }
    }
}

/// Overlay configurations keyed by field, kept in order of first discovery.
#[derive(Clone, Debug, Default)]
pub struct OverlaySettings {
    entries: Vec<(String, OverlayConfig)>,
    default_format: BoxFormat,
}

impl OverlaySettings {
    pub fn new(default_format: BoxFormat) -> Self {
        Self {
            entries: Vec::new(),
            default_format,
        }
    }

    pub fn get(&self, field: &str) -> Option<&OverlayConfig> {
        self.entries.iter().find(|(f, _)| f == field).map(|(_, c)| c)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut OverlayConfig> {
        self.entries
            .iter_mut()
            .find(|(f, _)| f == field)
            .map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OverlayConfig)> {
        self.entries.iter().map(|(f, c)| (f.as_str(), c))
    }

    /// Registers every box-shaped field of `record` and updates `max_index`
    /// from it. Returns the box-shaped fields of this record in record order.
    /// Fields for which `skip` returns true are ignored.
    pub fn refresh(&mut self, record: &Record, skip: impl Fn(&str) -> bool) -> Vec<String> {
        let mut present = Vec::new();
        for (field, value) in record {
            if skip(field.as_str()) {
                continue;
            }
            let Some(shape) = BoxShape::classify(value) else {
                continue;
            };
            let max_index = shape.count() - 1;
            match self.get_mut(field) {
                Some(config) => config.max_index = max_index,
                None => self
                    .entries
                    .push((field.clone(), OverlayConfig::new(self.default_format, max_index))),
            }
            present.push(field.clone());
        }
        present
    }
}
