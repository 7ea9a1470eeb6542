//! Outbound messaging contract.
//!
//! The engine talks to chat transports only through [`NotificationGateway`].
//! Two instances are bound to one engine: the user-facing bot and the
//! technician bot. File handles are only valid for the bot identity that
//! received them, so media crossing identities travels as a URL or as bytes.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use ticketdesk_models::MediaKind;

/// Where a message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Private chat with a user or technician.
    User(i64),
    /// A group chat, outside any thread.
    Chat(i64),
    /// A forum thread inside a group.
    Thread { chat_id: i64, thread_id: i32 },
}

impl Destination {
    pub fn chat_id(&self) -> i64 {
        match *self {
            Destination::User(id) | Destination::Chat(id) => id,
            Destination::Thread { chat_id, .. } => chat_id,
        }
    }
}

/// Formatting of outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    /// HTML subset understood by the transport. Callers escape user text.
    Html,
}

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Callback { label: String, data: String },
    Url { label: String, url: String },
    WebApp { label: String, url: String },
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Button::Callback {
            label: label.into(),
            data: data.into(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Button::Callback { label, .. } | Button::Url { label, .. } | Button::WebApp { label, .. } => label,
        }
    }
}

/// Rows of buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Every callback payload on the keyboard, in order.
    pub fn callback_data(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|b| match b {
                Button::Callback { data, .. } => Some(data.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A text message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundText {
    pub text: String,
    pub format: TextFormat,
    pub keyboard: Option<Keyboard>,
}

impl OutboundText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
            keyboard: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Html,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Where the transport should read media from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Transport file handle, valid for the receiving bot only.
    Handle(String),
    /// Publicly reachable URL.
    Url(String),
    /// Raw content.
    Bytes { data: Vec<u8>, file_name: String },
}

/// A media message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMedia {
    pub kind: MediaKind,
    pub source: MediaSource,
    pub caption: Option<String>,
    pub format: TextFormat,
}

impl OutboundMedia {
    pub fn new(kind: MediaKind, source: MediaSource) -> Self {
        Self {
            kind,
            source,
            caption: None,
            format: TextFormat::Plain,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>, format: TextFormat) -> Self {
        self.caption = Some(caption.into());
        self.format = format;
        self
    }
}

/// Receipt for a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

/// A newly created forum thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle {
    pub thread_id: i32,
    pub name: String,
}

/// Gateway failures the engine reacts to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The recipient blocked the bot.
    #[error("Recipient has blocked the bot")]
    Blocked,

    /// The thread no longer exists.
    #[error("Thread not found")]
    ThreadNotFound,

    #[error("Gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn is_thread_not_found(&self) -> bool {
        matches!(self, GatewayError::ThreadNotFound)
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Outbound side of one bot identity.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_text(&self, to: Destination, message: OutboundText) -> GatewayResult<SentMessage>;

    async fn send_media(&self, to: Destination, media: OutboundMedia) -> GatewayResult<SentMessage>;

    /// Creates a forum thread. `icon_color` is a 0xRRGGBB value.
    async fn create_thread(&self, chat_id: i64, title: &str, icon_color: u32) -> GatewayResult<ThreadHandle>;

    async fn delete_thread(&self, chat_id: i64, thread_id: i32) -> GatewayResult<()>;

    /// Copies an existing message (same bot identity) to another destination.
    async fn copy_message(&self, from_chat: i64, message_id: i32, to: Destination) -> GatewayResult<SentMessage>;

    /// Downloads the content behind a file handle received by this bot.
    async fn fetch_file(&self, handle: &str) -> GatewayResult<Vec<u8>>;
}

/// Bounds an outbound call, mapping elapsed deadlines to [`GatewayError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_chat_id() {
        assert_eq!(Destination::User(5).chat_id(), 5);
        assert_eq!(
            Destination::Thread {
                chat_id: -100,
                thread_id: 3
            }
            .chat_id(),
            -100
        );
    }

    #[test]
    fn test_keyboard_callback_data_skips_links() {
        let kb = Keyboard::new(vec![vec![
            Button::callback("1", "rate:TICK-0001:1"),
            Button::Url {
                label: "web".into(),
                url: "https://example.com".into(),
            },
        ]]);
        assert_eq!(kb.callback_data(), vec!["rate:TICK-0001:1"]);
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: GatewayResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Timeout(_))));
    }
}
