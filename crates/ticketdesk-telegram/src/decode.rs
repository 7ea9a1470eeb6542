//! Decoding of Telegram updates into engine inputs.
//!
//! Payload inspection happens here once; the engine only ever sees
//! [`InboundContent`].

use teloxide::types::{Message, User};

use ticketdesk_core::{BotRole, EventContext};
use ticketdesk_models::{InboundContent, InboundMedia, MediaKind, Requester, TechnicianRef};

pub fn user_id(user: &User) -> i64 {
    user.id.0 as i64
}

pub fn requester(user: &User) -> Requester {
    Requester::new(user_id(user)).with_names(
        Some(user.first_name.clone()),
        user.last_name.clone(),
        user.username.clone(),
    )
}

/// Full name of a technician, falling back to the username.
pub fn technician(user: &User) -> TechnicianRef {
    let name = match &user.last_name {
        Some(last) if !last.is_empty() => format!("{} {}", user.first_name, last),
        _ if !user.first_name.is_empty() => user.first_name.clone(),
        _ => user
            .username
            .clone()
            .unwrap_or_else(|| format!("Technician {}", user.id)),
    };
    TechnicianRef::new(user_id(user), name)
}

/// Forum thread of a message. Replies outside forums also carry a thread id,
/// so only topic messages count.
pub fn thread_id(msg: &Message) -> Option<i32> {
    if !msg.is_topic_message {
        return None;
    }
    msg.thread_id.map(|t| t.0 .0)
}

pub fn event_context(msg: &Message, role: BotRole) -> EventContext {
    EventContext {
        role,
        chat_id: msg.chat.id.0,
        is_private: msg.chat.is_private(),
        thread_id: thread_id(msg),
        from_bot: msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false),
        is_command: msg.text().map(|t| t.starts_with('/')).unwrap_or(false),
    }
}

fn media_of(msg: &Message) -> Option<InboundMedia> {
    if let Some(sizes) = msg.photo() {
        let largest = sizes.iter().max_by_key(|p| u64::from(p.width) * u64::from(p.height))?;
        return Some(InboundMedia::new(MediaKind::Photo, largest.file.id.0.clone()));
    }
    if let Some(doc) = msg.document() {
        return Some(
            InboundMedia::new(MediaKind::Document, doc.file.id.0.clone())
                .with_file_name(doc.file_name.clone())
                .with_mime_type(doc.mime_type.as_ref().map(|m| m.to_string())),
        );
    }
    if let Some(voice) = msg.voice() {
        return Some(
            InboundMedia::new(MediaKind::Voice, voice.file.id.0.clone())
                .with_mime_type(voice.mime_type.as_ref().map(|m| m.to_string())),
        );
    }
    if let Some(video) = msg.video() {
        return Some(
            InboundMedia::new(MediaKind::Video, video.file.id.0.clone())
                .with_file_name(video.file_name.clone())
                .with_mime_type(video.mime_type.as_ref().map(|m| m.to_string())),
        );
    }
    if let Some(audio) = msg.audio() {
        return Some(
            InboundMedia::new(MediaKind::Audio, audio.file.id.0.clone())
                .with_file_name(audio.file_name.clone())
                .with_mime_type(audio.mime_type.as_ref().map(|m| m.to_string())),
        );
    }
    if let Some(sticker) = msg.sticker() {
        return Some(InboundMedia::new(MediaKind::Sticker, sticker.file.id.0.clone()));
    }
    None
}

/// Text or supported media of a message. `None` for anything else.
pub fn content(msg: &Message) -> Option<InboundContent> {
    if let Some(media) = media_of(msg) {
        return Some(InboundContent::media(media, msg.caption().map(str::to_string)));
    }
    msg.text()
        .filter(|t| !t.trim().is_empty())
        .map(InboundContent::text)
}
