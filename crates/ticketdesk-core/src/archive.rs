//! Replays a closed ticket into a permanent thread in the archive group.
//!
//! The replay is a summary block, the transcript in buffered chunks with each
//! media item sent on its own, and a footer. Everything after the thread is
//! created is best-effort per message.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use ticketdesk_models::{category_labels, MediaAttachment, MessageSender, Ticket, TicketMessage};

use crate::blob::BlobStore;
use crate::config::HelpdeskConfig;
use crate::gateway::{
    with_timeout, Destination, GatewayError, MediaSource, NotificationGateway, OutboundMedia,
    OutboundText, TextFormat,
};
use crate::markup::{self, escape, format_date, ChunkBuffer};
use crate::templates;

/// Icon colour for archive threads.
pub const ARCHIVE_TOPIC_COLOR: u32 = 0x808080;

const SEPARATOR: &str = "─────────────────";

/// Room left for message text in a 1024-char media caption.
const CAPTION_TEXT_LIMIT: usize = 900;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("No archive group configured")]
    NotConfigured,

    #[error("Failed to create archive thread: {0}")]
    Thread(#[from] GatewayError),
}

/// Where an archive copy landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub topic_id: i32,
    pub topic_name: String,
    pub archived_at: DateTime<Utc>,
}

/// Writes archive copies of closed tickets.
pub struct Archiver {
    config: Arc<HelpdeskConfig>,
    tech_gateway: Arc<dyn NotificationGateway>,
    user_gateway: Arc<dyn NotificationGateway>,
    blobs: Arc<dyn BlobStore>,
}

impl Archiver {
    pub fn new(
        config: Arc<HelpdeskConfig>,
        tech_gateway: Arc<dyn NotificationGateway>,
        user_gateway: Arc<dyn NotificationGateway>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            tech_gateway,
            user_gateway,
            blobs,
        }
    }

    fn timeout(&self) -> Duration {
        self.config.outbound_timeout()
    }

    /// Creates the archive thread and replays the ticket into it.
    pub async fn archive(&self, ticket: &Ticket) -> Result<ArchiveReceipt, ArchiveError> {
        let group = self
            .config
            .groups
            .archive_group_id
            .ok_or(ArchiveError::NotConfigured)?;

        let title = archive_title(ticket);
        let thread = with_timeout(
            self.timeout(),
            self.tech_gateway.create_thread(group, &title, ARCHIVE_TOPIC_COLOR),
        )
        .await?;
        let dest = Destination::Thread {
            chat_id: group,
            thread_id: thread.thread_id,
        };
        let archived_at = Utc::now();

        self.send_chunk(dest, &self.summary(ticket)).await;

        let mut buffer = ChunkBuffer::new();
        buffer.push("💬 <b>CONVERSATION TRANSCRIPT</b>\n\n");
        let requester = ticket.requester.display_name();
        for (index, message) in ticket.messages.iter().enumerate() {
            let entry = transcript_entry(index + 1, message, &requester);
            match &message.media {
                Some(media) => {
                    buffer.flush();
                    for chunk in buffer.drain() {
                        self.send_chunk(dest, &chunk).await;
                    }
                    let caption = media_caption(index + 1, message, &requester);
                    if !self.send_media(dest, message, media, &caption).await {
                        buffer.push(&format!("{}\n[Media unavailable]\n\n", entry));
                    }
                }
                None => {
                    buffer.push(&format!("{}\n\n", entry));
                    for chunk in buffer.drain() {
                        self.send_chunk(dest, &chunk).await;
                    }
                }
            }
        }
        for chunk in buffer.finish() {
            self.send_chunk(dest, &chunk).await;
        }

        let footer = format!(
            "{}\n📦 <b>Archived Ticket</b>\nThis is a permanent archive of ticket <code>{}</code>.\nArchived: {}",
            SEPARATOR,
            ticket.ticket_id,
            format_date(&archived_at)
        );
        self.send_chunk(dest, &footer).await;

        info!(
            ticket_id = %ticket.ticket_id,
            archive_topic_id = thread.thread_id,
            messages = ticket.messages.len(),
            "Ticket archived"
        );
        Ok(ArchiveReceipt {
            topic_id: thread.thread_id,
            topic_name: thread.name,
            archived_at,
        })
    }

    fn summary(&self, ticket: &Ticket) -> String {
        let requester = &ticket.requester;
        let user = match &requester.username {
            Some(username) => format!(
                "{} (@{})",
                escape(&requester.display_name()),
                escape(username)
            ),
            None => escape(&requester.display_name()),
        };
        let assignee = ticket
            .assigned_to_name
            .as_deref()
            .map(escape)
            .unwrap_or_else(|| "Unassigned".to_string());
        let categories = if ticket.categories.is_empty() {
            "None".to_string()
        } else {
            escape(&category_labels(&self.config.categories, &ticket.categories).join(", "))
        };
        let closed = ticket
            .closed_at
            .as_ref()
            .map(format_date)
            .unwrap_or_else(|| "-".to_string());

        format!(
            "📦 <b>ARCHIVED TICKET SUMMARY</b>\n\n\
             <b>Ticket ID:</b> <code>{}</code>\n\
             <b>User:</b> {}\n\
             <b>User ID:</b> <code>{}</code>\n\
             <b>Assigned To:</b> {}\n\
             <b>Categories:</b> {}\n\
             <b>Rating:</b> {}\n\
             <b>Messages:</b> {}\n\
             <b>Created:</b> {}\n\
             <b>Closed:</b> {}\n\n\
             <b>Initial Request:</b>\n{}\n\n{}",
            ticket.ticket_id,
            user,
            requester.user_id,
            assignee,
            categories,
            templates::rating_summary(ticket.rating.as_ref()),
            ticket.messages.len(),
            format_date(&ticket.created_at),
            closed,
            escape(&markup::truncate(&ticket.initial_message, 1000)),
            SEPARATOR,
        )
    }

    /// Sends one HTML chunk, retrying as plain text when the markup is rejected.
    async fn send_chunk(&self, dest: Destination, chunk: &str) {
        let sent = with_timeout(
            self.timeout(),
            self.tech_gateway.send_text(dest, OutboundText::html(chunk)),
        )
        .await;
        let Err(e) = sent else {
            return;
        };
        debug!(error = %e, "Archive chunk rejected, retrying as plain text");
        let plain = OutboundText::plain(markup::plain_text(chunk));
        if let Err(e) = with_timeout(self.timeout(), self.tech_gateway.send_text(dest, plain)).await {
            warn!(error = %e, "Failed to send archive chunk");
        }
    }

    /// Sends one media item with an HTML caption, retrying once with the
    /// caption as plain text. Returns false when it could not be delivered.
    async fn send_media(
        &self,
        dest: Destination,
        message: &TicketMessage,
        media: &MediaAttachment,
        caption: &str,
    ) -> bool {
        let Some(source) = self.resolve_media(message, media).await else {
            return false;
        };
        let outbound = OutboundMedia::new(media.kind, source.clone()).with_caption(caption, TextFormat::Html);
        let Err(e) = with_timeout(self.timeout(), self.tech_gateway.send_media(dest, outbound)).await else {
            return true;
        };
        debug!(kind = %media.kind, error = %e, "Archive media rejected, retrying with plain caption");

        let plain = OutboundMedia::new(media.kind, source)
            .with_caption(markup::plain_text(caption), TextFormat::Plain);
        match with_timeout(self.timeout(), self.tech_gateway.send_media(dest, plain)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(kind = %media.kind, error = %e, "Failed to archive media");
                false
            }
        }
    }

    /// Blob URL first, then stored bytes, then bytes fetched through the
    /// gateway that originally received the handle.
    async fn resolve_media(&self, message: &TicketMessage, media: &MediaAttachment) -> Option<MediaSource> {
        if let Some(url) = media.blob_url.as_deref().filter(|u| is_public_url(u)) {
            return Some(MediaSource::Url(url.to_string()));
        }

        let file_name = media
            .file_name
            .clone()
            .unwrap_or_else(|| format!("{}{}", media.kind, media.extension()));

        if let Some(key) = &media.blob_key {
            match self.blobs.get(key).await {
                Ok(data) => return Some(MediaSource::Bytes { data, file_name }),
                Err(e) => debug!(key = %key, error = %e, "Stored blob unavailable"),
            }
        }

        let handle = media.file_handle.as_deref()?;
        let owner = match message.from {
            MessageSender::User => &self.user_gateway,
            _ => &self.tech_gateway,
        };
        match with_timeout(self.timeout(), owner.fetch_file(handle)).await {
            Ok(data) => Some(MediaSource::Bytes { data, file_name }),
            Err(e) => {
                debug!(error = %e, "Media handle could not be fetched");
                None
            }
        }
    }
}

/// `📦 [CLOSED] {ticketId} - {first name}`.
pub fn archive_title(ticket: &Ticket) -> String {
    format!(
        "📦 [CLOSED] {} - {}",
        ticket.ticket_id,
        escape(&ticket.requester.short_name())
    )
}

fn entry_header(position: usize, message: &TicketMessage, requester: &str) -> String {
    let icon = match message.from {
        MessageSender::User => "👤",
        MessageSender::Technician => "👨‍💼",
        MessageSender::System => "⚙️",
    };
    format!(
        "<b>[{}] {} {}</b> - {}",
        position,
        icon,
        escape(&message.author_name(requester)),
        format_date(&message.timestamp),
    )
}

fn transcript_entry(position: usize, message: &TicketMessage, requester: &str) -> String {
    format!(
        "{}\n{}",
        entry_header(position, message, requester),
        escape(&message.text)
    )
}

/// Caption for an archived media message. The text is cut before escaping
/// so no entity is split.
fn media_caption(position: usize, message: &TicketMessage, requester: &str) -> String {
    format!(
        "{}\n{}",
        entry_header(position, message, requester),
        escape(&markup::truncate(&message.text, CAPTION_TEXT_LIMIT))
    )
}

fn is_public_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}
