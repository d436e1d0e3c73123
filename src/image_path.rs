use std::path::{Path, PathBuf};

use serde_json::Value;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

pub fn is_image_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Whether a value of the `image` key marks it as an image field.
pub fn looks_like_image_value(value: &Value) -> bool {
    match value {
        Value::String(s) => is_image_file(s),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

/// The path an image field currently points at: the string itself, or entry
/// `selected` of a list of paths.
pub fn selected_path(value: &Value, selected: usize) -> Option<&str> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.as_str()),
        Value::Array(items) => items.get(selected)?.as_str().filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Finds the file for `path`, retrying as `prefix/<file name>` when the path
/// itself does not exist.
pub fn resolve(path: &str, prefix: Option<&Path>) -> Option<PathBuf> {
    let direct = PathBuf::from(path);
    if direct.is_file() {
        return Some(direct);
    }
    let candidate = prefix?.join(direct.file_name()?);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn recognizes_image_extensions() {
        assert!(is_image_file("a/b/photo.JPG"));
        assert!(is_image_file("x.jpeg"));
        assert!(is_image_file("x.gif"));
        assert!(!is_image_file("notes.txt"));
        assert!(!is_image_file("png"));
    }

    #[test]
    fn image_values() {
        assert!(looks_like_image_value(&json!("cat.png")));
        assert!(looks_like_image_value(&json!(["a", "b"])));
        assert!(!looks_like_image_value(&json!([])));
        assert!(!looks_like_image_value(&json!("cat.txt")));
        assert!(!looks_like_image_value(&json!(3)));
    }

    #[test]
    fn selects_from_lists() {
        let list = json!(["a.png", "b.png"]);
        assert_eq!(selected_path(&list, 1), Some("b.png"));
        assert_eq!(selected_path(&list, 2), None);
        assert_eq!(selected_path(&json!("c.png"), 4), Some("c.png"));
        assert_eq!(selected_path(&json!(""), 0), None);
    }

    #[test]
    fn falls_back_to_prefix_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("frame_01.png");
        std::fs::write(&file, b"not really a png").unwrap();

        let file_str = file.to_str().unwrap();
        assert_eq!(resolve(file_str, None), Some(file.clone()));

        let moved = "/data/elsewhere/frame_01.png";
        assert_eq!(resolve(moved, None), None);
        assert_eq!(resolve(moved, Some(dir.path())), Some(file));
        assert_eq!(resolve("/data/elsewhere/missing.png", Some(dir.path())), None);
    }
}
