//! Media descriptors attached to transcript entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Document,
    Voice,
    Video,
    Audio,
    Sticker,
}

impl MediaKind {
    /// Stable lowercase name, used in blob keys and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Voice => "voice",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Sticker => "sticker",
        }
    }

    /// Parses a kind name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" | "image" => Some(MediaKind::Photo),
            "document" | "file" => Some(MediaKind::Document),
            "voice" => Some(MediaKind::Voice),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "sticker" => Some(MediaKind::Sticker),
            _ => None,
        }
    }

    /// Guesses a kind from a MIME type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/webp") {
            MediaKind::Sticker
        } else if mime.starts_with("image/") {
            MediaKind::Photo
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else if mime.starts_with("audio/ogg") || mime.starts_with("audio/webm") {
            MediaKind::Voice
        } else if mime.starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Document
        }
    }

    /// Default file extension (with leading dot) when the original name is unknown.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Photo => ".jpg",
            MediaKind::Document => ".bin",
            MediaKind::Voice => ".ogg",
            MediaKind::Video => ".mp4",
            MediaKind::Audio => ".mp3",
            MediaKind::Sticker => ".webp",
        }
    }

    /// Default content type when the transport did not report one.
    pub fn default_content_type(&self) -> &'static str {
        match self {
            MediaKind::Photo => "image/jpeg",
            MediaKind::Document => "application/octet-stream",
            MediaKind::Voice => "audio/ogg",
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mpeg",
            MediaKind::Sticker => "image/webp",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media stored alongside a transcript entry.
///
/// `blob_key`/`blob_url` point at the durable copy. `file_handle` is the
/// transport-native reference, which may stop resolving after a while.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_handle: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl MediaAttachment {
    /// Creates an attachment that only has a transport handle.
    pub fn from_handle(kind: MediaKind, handle: impl Into<String>) -> Self {
        Self {
            kind,
            file_handle: Some(handle.into()),
            blob_key: None,
            blob_url: None,
            file_name: None,
            mime_type: None,
        }
    }

    /// Records the durable blob copy.
    pub fn with_blob(mut self, key: impl Into<String>, url: impl Into<String>) -> Self {
        self.blob_key = Some(key.into());
        self.blob_url = Some(url.into());
        self
    }

    /// Returns true if a durable copy exists.
    pub fn is_durable(&self) -> bool {
        self.blob_url.is_some()
    }

    /// Extension derived from the file name, falling back to the kind default.
    pub fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_else(|| self.kind.default_extension().to_string())
    }

    /// Content type, falling back to the kind default.
    pub fn content_type(&self) -> &str {
        self.mime_type
            .as_deref()
            .unwrap_or_else(|| self.kind.default_content_type())
    }
}
