//! [`NotificationGateway`] backed by a teloxide `Bot`.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, FileId, InputFile, MessageId, ParseMode, Recipient, Rgb, ThreadId,
};
use teloxide::{ApiError, RequestError};
use tracing::debug;
use url::Url;

use ticketdesk_core::gateway::{
    Destination, GatewayError, GatewayResult, MediaSource, NotificationGateway, OutboundMedia,
    OutboundText, SentMessage, TextFormat, ThreadHandle,
};
use ticketdesk_models::MediaKind;

use crate::keyboards::to_markup;

/// Maps a Telegram API error description onto the engine's error kinds.
pub fn classify_description(description: &str) -> GatewayError {
    let lower = description.to_ascii_lowercase();
    if lower.contains("blocked by the user") || lower.contains("user is deactivated") {
        GatewayError::Blocked
    } else if lower.contains("thread not found")
        || lower.contains("topic_id_invalid")
        || lower.contains("topic_deleted")
        || lower.contains("topic not found")
    {
        GatewayError::ThreadNotFound
    } else {
        GatewayError::Transport(description.to_string())
    }
}

fn classify(err: RequestError) -> GatewayError {
    match err {
        RequestError::Api(ApiError::BotBlocked) | RequestError::Api(ApiError::UserDeactivated) => {
            GatewayError::Blocked
        }
        other => classify_description(&other.to_string()),
    }
}

fn split(to: Destination) -> (ChatId, Option<ThreadId>) {
    match to {
        Destination::User(id) | Destination::Chat(id) => (ChatId(id), None),
        Destination::Thread { chat_id, thread_id } => {
            (ChatId(chat_id), Some(ThreadId(MessageId(thread_id))))
        }
    }
}

fn input_file(source: &MediaSource) -> GatewayResult<InputFile> {
    Ok(match source {
        MediaSource::Handle(handle) => InputFile::file_id(FileId(handle.clone())),
        MediaSource::Url(url) => InputFile::url(
            Url::parse(url).map_err(|e| GatewayError::Transport(format!("invalid media URL: {}", e)))?,
        ),
        MediaSource::Bytes { data, file_name } => {
            InputFile::memory(data.clone()).file_name(file_name.clone())
        }
    })
}

fn receipt(message: &Message) -> SentMessage {
    SentMessage {
        chat_id: message.chat.id.0,
        message_id: message.id.0,
    }
}

/// Applies the optional thread, caption and parse mode shared by every media request.
macro_rules! media_request {
    ($req:expr, $thread:expr, $media:expr) => {{
        let mut req = $req;
        if let Some(thread) = $thread {
            req = req.message_thread_id(thread);
        }
        if let Some(caption) = &$media.caption {
            req = req.caption(caption.clone());
            if $media.format == TextFormat::Html {
                req = req.parse_mode(ParseMode::Html);
            }
        }
        req.await
    }};
}

/// One bot identity as seen by the engine.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl NotificationGateway for TelegramGateway {
    async fn send_text(&self, to: Destination, message: OutboundText) -> GatewayResult<SentMessage> {
        let (chat, thread) = split(to);
        let mut req = self.bot.send_message(chat, message.text);
        if let Some(thread) = thread {
            req = req.message_thread_id(thread);
        }
        if message.format == TextFormat::Html {
            req = req.parse_mode(ParseMode::Html);
        }
        if let Some(keyboard) = &message.keyboard {
            req = req.reply_markup(to_markup(keyboard));
        }
        req.await.map(|m| receipt(&m)).map_err(classify)
    }

    async fn send_media(&self, to: Destination, media: OutboundMedia) -> GatewayResult<SentMessage> {
        let (chat, thread) = split(to);
        let file = input_file(&media.source)?;
        let sent = match media.kind {
            MediaKind::Photo => media_request!(self.bot.send_photo(chat, file), thread, media),
            MediaKind::Document => media_request!(self.bot.send_document(chat, file), thread, media),
            MediaKind::Voice => media_request!(self.bot.send_voice(chat, file), thread, media),
            MediaKind::Video => media_request!(self.bot.send_video(chat, file), thread, media),
            MediaKind::Audio => media_request!(self.bot.send_audio(chat, file), thread, media),
            MediaKind::Sticker => {
                // Stickers carry no caption.
                let mut req = self.bot.send_sticker(chat, file);
                if let Some(thread) = thread {
                    req = req.message_thread_id(thread);
                }
                req.await
            }
        };
        sent.map(|m| receipt(&m)).map_err(classify)
    }

    async fn create_thread(&self, chat_id: i64, title: &str, icon_color: u32) -> GatewayResult<ThreadHandle> {
        let topic = self
            .bot
            .create_forum_topic(ChatId(chat_id), title)
            .icon_color(Rgb::from_u32(icon_color))
            .await
            .map_err(classify)?;
        debug!(chat_id, thread_id = topic.thread_id.0 .0, "Created forum topic");
        Ok(ThreadHandle {
            thread_id: topic.thread_id.0 .0,
            name: topic.name,
        })
    }

    async fn delete_thread(&self, chat_id: i64, thread_id: i32) -> GatewayResult<()> {
        self.bot
            .delete_forum_topic(ChatId(chat_id), ThreadId(MessageId(thread_id)))
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn copy_message(&self, from_chat: i64, message_id: i32, to: Destination) -> GatewayResult<SentMessage> {
        let (chat, thread) = split(to);
        let mut req = self
            .bot
            .copy_message(Recipient::Id(chat), ChatId(from_chat), MessageId(message_id));
        if let Some(thread) = thread {
            req = req.message_thread_id(thread);
        }
        let copied = req.await.map_err(classify)?;
        Ok(SentMessage {
            chat_id: chat.0,
            message_id: copied.0,
        })
    }

    async fn fetch_file(&self, handle: &str) -> GatewayResult<Vec<u8>> {
        let file = self
            .bot
            .get_file(FileId(handle.to_string()))
            .await
            .map_err(classify)?;
        let mut data = Vec::with_capacity(file.size as usize);
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_description() {
        assert_eq!(
            classify_description("Forbidden: bot was blocked by the user"),
            GatewayError::Blocked
        );
        assert_eq!(
            classify_description("Bad Request: message thread not found"),
            GatewayError::ThreadNotFound
        );
        assert_eq!(
            classify_description("Bad Request: TOPIC_ID_INVALID"),
            GatewayError::ThreadNotFound
        );
        assert!(matches!(
            classify_description("Bad Request: can't parse entities"),
            GatewayError::Transport(_)
        ));
    }

    #[test]
    fn test_split_destination() {
        let (chat, thread) = split(Destination::Thread {
            chat_id: -100,
            thread_id: 12,
        });
        assert_eq!(chat, ChatId(-100));
        assert_eq!(thread, Some(ThreadId(MessageId(12))));
        assert_eq!(split(Destination::User(7)), (ChatId(7), None));
    }

    #[test]
    fn test_input_file_rejects_bad_url() {
        assert!(input_file(&MediaSource::Url("::".into())).is_err());
        assert!(input_file(&MediaSource::Handle("AgAD".into())).is_ok());
    }
}
