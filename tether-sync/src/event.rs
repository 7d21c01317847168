use std::path::PathBuf;

use tether_core::EventKind;

/// A raw filesystem change, with paths relative to the sync source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    /// Destination of a move.
    pub path2: Option<PathBuf>,
}

impl FsEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            path2: None,
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Move,
            path: from.into(),
            path2: Some(to.into()),
        }
    }
}
