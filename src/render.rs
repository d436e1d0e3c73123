use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::overlay::{convert_box, select_box, OverlaySettings, Rect};
use crate::store::Record;

const OUTLINE_WIDTH: i64 = 2;

const PALETTE: [[u8; 3]; 7] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [128, 0, 128],
];

const BORDER_ALPHA: u8 = 200;
const FILL_ALPHA: u8 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayColors {
    pub border: [u8; 4],
    pub fill: [u8; 4],
}

fn fnv1a(chunks: &[&[u8]]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for chunk in chunks {
        for &byte in *chunk {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

/// Stable colors for an overlay of `kind` drawn from `field`.
pub fn color_for(field: &str, kind: &str) -> OverlayColors {
    let hash = fnv1a(&[field.as_bytes(), kind.as_bytes()]);
    let [r, g, b] = PALETTE[(hash % PALETTE.len() as u64) as usize];
    OverlayColors {
        border: [r, g, b, BORDER_ALPHA],
        fill: [r, g, b, FILL_ALPHA],
    }
}

/// Returns a copy of `image` with every enabled overlay of `record` painted
/// on it, in the order the fields were first discovered.
pub fn draw_overlays(image: &RgbaImage, record: &Record, overlays: &OverlaySettings) -> RgbaImage {
    let mut out = image.clone();
    let (width, height) = out.dimensions();
    for (field, config) in overlays.iter() {
        if !config.enabled {
            continue;
        }
        let Some(raw) = record.get(field).and_then(|v| select_box(v, config.index)) else {
            continue;
        };
        let rect = match convert_box(raw, config.format, width, height) {
            Ok(rect) => rect,
            Err(e) => {
                debug!(field, error = %e, "skipping overlay");
                continue;
            }
        };
        let colors = color_for(field, "bbox");
        fill_rect(&mut out, rect, colors.fill);
        stroke_rect(&mut out, rect, colors.border);
    }
    out
}

fn blend(dst: &mut Rgba<u8>, src: [u8; 4]) {
    let a = u32::from(src[3]);
    for c in 0..3 {
        let mixed = (u32::from(src[c]) * a + u32::from(dst.0[c]) * (255 - a) + 127) / 255;
        dst.0[c] = mixed as u8;
    }
    let dst_a = u32::from(dst.0[3]);
    dst.0[3] = (a + dst_a * (255 - a) / 255).min(255) as u8;
}

/// Pixel span `[lo, hi)` covered by `start..start+len`, clamped to one
/// outline width beyond `0..limit`.
fn span(start: f32, len: f32, limit: u32) -> (i64, i64) {
    let (a, b) = if len >= 0.0 {
        (start, start + len)
    } else {
        (start + len, start)
    };
    let (lo, hi) = (-OUTLINE_WIDTH, i64::from(limit) + OUTLINE_WIDTH);
    (
        (a.round() as i64).clamp(lo, hi),
        (b.round() as i64).clamp(lo, hi),
    )
}

fn blend_region(img: &mut RgbaImage, x: (i64, i64), y: (i64, i64), color: [u8; 4]) {
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));
    for py in y.0.max(0)..y.1.min(h) {
        for px in x.0.max(0)..x.1.min(w) {
            blend(img.get_pixel_mut(px as u32, py as u32), color);
        }
    }
}

fn fill_rect(img: &mut RgbaImage, rect: Rect, color: [u8; 4]) {
    let x = span(rect.x, rect.width, img.width());
    let y = span(rect.y, rect.height, img.height());
    blend_region(img, x, y, color);
}

/// Outline drawn inside the rectangle edges.
fn stroke_rect(img: &mut RgbaImage, rect: Rect, color: [u8; 4]) {
    let (x0, x1) = span(rect.x, rect.width, img.width());
    let (y0, y1) = span(rect.y, rect.height, img.height());
    let t = OUTLINE_WIDTH;
    let top = (y0, (y0 + t).min(y1));
    let bottom = ((y1 - t).max(top.1), y1);
    let inner = (top.1, bottom.0);
    blend_region(img, (x0, x1), top, color);
    blend_region(img, (x0, x1), bottom, color);
    blend_region(img, (x0, (x0 + t).min(x1)), inner, color);
    blend_region(img, ((x1 - t).max(x0 + t).min(x1), x1), inner, color);
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{json, Value};

    use super::*;
    use crate::overlay::BoxFormat;

    const BG: Rgba<u8> = Rgba([10, 10, 10, 255]);

    fn canvas() -> RgbaImage {
        RgbaImage::from_pixel(20, 20, BG)
    }

    fn enabled_settings(record: &Record, format: &str) -> OverlaySettings {
        let mut settings = OverlaySettings::new(format.parse::<BoxFormat>().unwrap());
        let fields = settings.refresh(record, |_| false);
        for field in fields {
            settings.get_mut(&field).unwrap().enabled = true;
        }
        settings
    }

    #[test]
    fn colors_are_stable() {
        assert_eq!(color_for("bbox_field", "bbox"), color_for("bbox_field", "bbox"));
        let colors = color_for("bbox_field", "bbox");
        assert_eq!(colors.border[3], 200);
        assert_eq!(colors.fill[3], 100);
        assert_eq!(colors.border[..3], colors.fill[..3]);
        assert!(PALETTE.iter().any(|c| c[..] == colors.border[..3]));
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(&["".as_bytes()]), 0xcbf29ce484222325);
        assert_eq!(fnv1a(&["a".as_bytes()]), 0xaf63dc4c8601ec8c);
        assert_eq!(
            fnv1a(&["fo".as_bytes(), "obar".as_bytes()]),
            fnv1a(&["foobar".as_bytes()])
        );
    }

    #[test]
    fn draws_on_a_copy() {
        let image = canvas();
        let record = json!({"bbox": [2, 2, 12, 12]});
        let record = record.as_object().unwrap();
        let settings = enabled_settings(record, "xyxy");

        let out = draw_overlays(&image, record, &settings);

        assert!(image.pixels().all(|p| *p == BG));
        // outline, interior fill and untouched background
        assert_ne!(*out.get_pixel(2, 2), BG);
        assert_ne!(*out.get_pixel(7, 7), BG);
        assert_ne!(out.get_pixel(2, 2), out.get_pixel(7, 7));
        assert_eq!(*out.get_pixel(15, 15), BG);
        assert_eq!(*out.get_pixel(1, 1), BG);
    }

    #[test]
    fn disabled_and_malformed_overlays_are_skipped() {
        let image = canvas();
        let record = json!({"bbox": [2, 2, 12, 12], "other": [[1, 1, 5, 5]]});
        let record = record.as_object().unwrap();
        let mut settings = OverlaySettings::new(BoxFormat::default());
        settings.refresh(record, |_| false);
        settings.get_mut("other").unwrap().enabled = true;

        // "other" now holds something that is no longer box-shaped.
        let mut edited = record.clone();
        edited.insert("other".into(), json!("n/a"));
        let out = draw_overlays(&image, &edited, &settings);
        assert_eq!(out, image);
    }

    #[test]
    fn multi_box_index_out_of_range_draws_first_box() {
        let image = canvas();
        let record = json!({"boxes": [[1, 1, 2, 2], [3, 3, 4, 4]]});
        let record = record.as_object().unwrap();
        let mut settings = enabled_settings(record, "xyxy");
        settings.get_mut("boxes").unwrap().index = 5;

        let out = draw_overlays(&image, record, &settings);
        assert_ne!(*out.get_pixel(1, 1), BG);
        assert_eq!(*out.get_pixel(3, 3), BG);
    }

    #[test]
    fn boxes_outside_the_image_are_clipped() {
        let image = canvas();
        let record = json!({"bbox": [-5.0, -5.0, 0.5, 0.5]});
        let record = record.as_object().unwrap();
        let settings = enabled_settings(record, "normalized xyxy");

        let out = draw_overlays(&image, record, &settings);
        assert_ne!(*out.get_pixel(0, 0), BG);
        assert_eq!(*out.get_pixel(19, 19), BG);
    }

    #[rstest]
    #[case(json!([1e19, 0, 5, 5]), "xywh")]
    #[case(json!([0, -1e300, 5, -1e300]), "xyxy")]
    #[case(json!([-1e300, -1e300, 1e300, 1e300]), "xyxy")]
    #[case(json!([f64::MAX, 0.0, f64::MAX, 4.0]), "normalized cxcywh")]
    fn huge_boxes_far_outside_the_image_are_clipped(#[case] bbox: Value, #[case] format: &str) {
        let image = canvas();
        let record = json!({ "bbox": bbox });
        let record = record.as_object().unwrap();
        let settings = enabled_settings(record, format);

        let out = draw_overlays(&image, record, &settings);
        assert_eq!(out.dimensions(), image.dimensions());
    }
}
