use serde::Serialize;
use std::fmt;

/// User-facing label for the type discriminant embedded in an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Photo,
    Sticker,
    Audio,
    Video,
    Document,
}

impl FileKind {
    pub fn from_discriminant(file_type: u8) -> Option<Self> {
        match file_type {
            1 => Some(FileKind::Photo),
            2 => Some(FileKind::Sticker),
            3 => Some(FileKind::Audio),
            4 => Some(FileKind::Video),
            5 => Some(FileKind::Document),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Photo => "photo",
            FileKind::Sticker => "sticker",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Document => "document",
        }
    }

    /// Whether the full protocol addresses this kind as a photo rather than a document.
    pub fn is_photo(&self) -> bool {
        matches!(self, FileKind::Photo)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
