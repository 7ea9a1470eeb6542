//! Transcript entries embedded in a ticket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;
use crate::inbound::InboundContent;
use crate::media::MediaAttachment;

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    /// The requester, via the user-facing bot.
    User,
    /// A technician, via the technician thread or the dashboard.
    Technician,
    /// Generated by the system (escalation notes, routing notices).
    System,
}

/// Snapshot of the technician who wrote a message.
///
/// Stored denormalized because profiles can change after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicianRef {
    pub id: i64,
    pub name: String,
}

impl TechnicianRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: MessageId,

    pub from: MessageSender,

    /// Raw, unescaped body.
    pub text: String,

    pub timestamp: DateTime<Utc>,

    /// Message id on the requester's side of the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<i32>,

    /// Message id inside the technician thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_message_id: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,

    /// Whether a technician has seen this message. Only tracked for user messages.
    #[serde(default)]
    pub is_read: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician: Option<TechnicianRef>,
}

impl TicketMessage {
    fn new(from: MessageSender, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            from,
            text: text.into(),
            timestamp: Utc::now(),
            user_message_id: None,
            topic_message_id: None,
            media: None,
            is_read: false,
            technician: None,
        }
    }

    /// Creates an unread message from the requester.
    pub fn user(content: &InboundContent, user_message_id: Option<i32>) -> Self {
        let mut msg = Self::new(MessageSender::User, content.transcript_text());
        msg.user_message_id = user_message_id;
        msg.media = content.media.as_ref().map(|m| m.to_attachment());
        msg
    }

    /// Creates a message authored by a technician.
    pub fn technician(technician: TechnicianRef, text: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageSender::Technician, text);
        msg.technician = Some(technician);
        msg.is_read = true;
        msg
    }

    /// Creates a system-authored note.
    pub fn system(text: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageSender::System, text);
        msg.is_read = true;
        msg
    }

    /// Attaches media to the message.
    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = Some(media);
        self
    }

    /// Returns true if the message carries media.
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    /// Display name of the author.
    pub fn author_name(&self, requester_name: &str) -> String {
        match self.from {
            MessageSender::User => requester_name.to_string(),
            MessageSender::Technician => self
                .technician
                .as_ref()
                .map(|t| t.name.clone())
                .unwrap_or_else(|| "Technician".to_string()),
            MessageSender::System => "System".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::InboundMedia;
    use crate::media::MediaKind;

    #[test]
    fn test_user_message_is_unread() {
        let msg = TicketMessage::user(&InboundContent::text("hello"), Some(10));
        assert_eq!(msg.from, MessageSender::User);
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.user_message_id, Some(10));
        assert!(!msg.is_read);
        assert!(!msg.has_media());
    }

    #[test]
    fn test_user_media_message_uses_placeholder() {
        let content = InboundContent {
            text: None,
            media: Some(InboundMedia::new(MediaKind::Voice, "voice-1")),
        };
        let msg = TicketMessage::user(&content, None);
        assert_eq!(msg.text, "[Media message]");
        assert_eq!(msg.media.unwrap().file_handle.as_deref(), Some("voice-1"));
    }

    #[test]
    fn test_author_names() {
        let tech = TicketMessage::technician(TechnicianRef::new(7, "Ana"), "On it");
        assert_eq!(tech.author_name("Bob"), "Ana");
        assert_eq!(TicketMessage::system("x").author_name("Bob"), "System");
        let user = TicketMessage::user(&InboundContent::text("hi"), None);
        assert_eq!(user.author_name("Bob"), "Bob");
    }
}
