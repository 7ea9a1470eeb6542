//! Normalized inbound content, decoded once at the transport boundary.

use serde::{Deserialize, Serialize};

use crate::media::{MediaAttachment, MediaKind};

/// Transcript text stored for media that arrived without a caption.
pub const MEDIA_PLACEHOLDER: &str = "[Media message]";

/// Media reference as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMedia {
    pub kind: MediaKind,
    /// Transport-native file handle.
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl InboundMedia {
    pub fn new(kind: MediaKind, handle: impl Into<String>) -> Self {
        Self {
            kind,
            handle: handle.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_file_name(mut self, name: Option<String>) -> Self {
        self.file_name = name;
        self
    }

    pub fn with_mime_type(mut self, mime: Option<String>) -> Self {
        self.mime_type = mime;
        self
    }

    /// Converts to a transcript attachment without a blob copy.
    pub fn to_attachment(&self) -> MediaAttachment {
        let mut media = MediaAttachment::from_handle(self.kind, self.handle.clone());
        media.file_name = self.file_name.clone();
        media.mime_type = self.mime_type.clone();
        media
    }
}

/// Text and optional media of an inbound message.
///
/// `text` holds the message text or, for media, its caption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<InboundMedia>,
}

impl InboundContent {
    /// Plain text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            media: None,
        }
    }

    /// Media with an optional caption.
    pub fn media(media: InboundMedia, caption: Option<String>) -> Self {
        Self {
            text: caption,
            media: Some(media),
        }
    }

    /// Text stored in the transcript: the body, else the placeholder.
    pub fn transcript_text(&self) -> String {
        match self.text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => self.text.clone().unwrap_or_default(),
            _ => MEDIA_PLACEHOLDER.to_string(),
        }
    }

    /// Returns true if there is nothing to relay.
    pub fn is_empty(&self) -> bool {
        self.media.is_none() && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_text_prefers_body() {
        assert_eq!(InboundContent::text("printer").transcript_text(), "printer");
    }

    #[test]
    fn test_transcript_text_uses_caption() {
        let content = InboundContent::media(
            InboundMedia::new(MediaKind::Photo, "p1"),
            Some("see screenshot".to_string()),
        );
        assert_eq!(content.transcript_text(), "see screenshot");
    }

    #[test]
    fn test_transcript_text_placeholder() {
        let content = InboundContent::media(InboundMedia::new(MediaKind::Sticker, "s1"), None);
        assert_eq!(content.transcript_text(), MEDIA_PLACEHOLDER);
        assert!(!content.is_empty());
    }

    #[test]
    fn test_is_empty() {
        assert!(InboundContent::default().is_empty());
        assert!(InboundContent::text("   ").is_empty());
    }
}
