use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of [`EditorError`], used by the UI to pick a
/// notification title.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Io,
    Format,
    NoMatch,
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected layout in {}: {reason}", path.display())]
    Layout { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unrecognized box format: {0:?}")]
    UnknownFormat(String),
    #[error("malformed box coordinates: {0}")]
    MalformedBox(String),
    #[error("no record has {key:?} containing {query:?}")]
    NoMatch { key: String, query: String },
}

impl EditorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EditorError::Json { .. } | EditorError::Layout { .. } => ErrorKind::Parse,
            EditorError::Io { .. } | EditorError::Image { .. } => ErrorKind::Io,
            EditorError::UnknownFormat(_) | EditorError::MalformedBox(_) => ErrorKind::Format,
            EditorError::NoMatch { .. } => ErrorKind::NoMatch,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EditorError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
