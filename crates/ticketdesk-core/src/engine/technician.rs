//! Technician replies from the ticket thread and the dashboard.

use std::sync::Arc;

use tracing::{info, warn};

use ticketdesk_models::{
    InboundContent, MediaAttachment, MediaKind, TechnicianRef, Ticket, TicketId, TicketMessage,
    TicketStatus,
};

use super::{Engine, IngestedMedia};
use crate::blob::blob_key;
use crate::codec::is_ogg;
use crate::error::{EngineError, Result};
use crate::gateway::{
    with_timeout, Destination, GatewayError, GatewayResult, MediaSource, OutboundMedia,
    OutboundText, SentMessage, TextFormat,
};
use crate::templates;

use super::outcome::{Delivery, TechnicianReplyOutcome, WebReplyOutcome};

/// Transcript text for dashboard uploads without a caption.
pub const WEB_MEDIA_PLACEHOLDER: &str = "[Media]";

/// A file uploaded from the dashboard.
#[derive(Debug, Clone)]
pub struct WebUpload {
    pub data: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
    /// Explicit kind; guessed from the content type when absent.
    pub kind: Option<MediaKind>,
    pub caption: Option<String>,
}

impl WebUpload {
    fn resolved_kind(&self) -> MediaKind {
        self.kind.unwrap_or_else(|| {
            self.content_type
                .as_deref()
                .map(MediaKind::from_mime)
                .unwrap_or(MediaKind::Document)
        })
    }
}

fn delivery_from(result: GatewayResult<SentMessage>) -> Delivery {
    match result {
        Ok(sent) => Delivery::Delivered {
            message_id: sent.message_id,
        },
        Err(GatewayError::Blocked) => Delivery::Blocked,
        Err(e) => Delivery::Failed(e.to_string()),
    }
}

/// Status change and assignment applied when a technician answers.
fn apply_technician_activity(ticket: &mut Ticket, technician: &TechnicianRef) {
    if ticket.status == TicketStatus::Open {
        ticket.status = TicketStatus::InProgress;
    }
    ticket.assign_if_unset(technician);
}

impl Engine {
    /// Handles a message a technician wrote inside a ticket thread.
    pub async fn handle_technician_message(
        &self,
        topic_id: i32,
        technician: TechnicianRef,
        content: InboundContent,
        topic_message_id: Option<i32>,
    ) -> Result<TechnicianReplyOutcome> {
        if content.is_empty() {
            return Err(EngineError::validation("message has no content"));
        }
        let Some(ticket) = self.ticket_for_topic(topic_id).await? else {
            return Ok(TechnicianReplyOutcome::NoTicket);
        };
        self.append_technician_message(&ticket, technician, content, topic_message_id)
            .await
    }

    /// Forwards a technician message to the requester and records it.
    ///
    /// A requester who blocked the bot is reported through
    /// [`Delivery::Blocked`]; the message is still kept in the transcript.
    pub async fn append_technician_message(
        &self,
        ticket: &Ticket,
        technician: TechnicianRef,
        content: InboundContent,
        topic_message_id: Option<i32>,
    ) -> Result<TechnicianReplyOutcome> {
        if ticket.is_closed() {
            return Err(EngineError::InvalidState(format!(
                "Ticket {} is closed",
                ticket.ticket_id
            )));
        }
        let user_id = ticket.requester.user_id;
        let text = content.transcript_text();
        let body = templates::technician_message_for_user(&technician.name, &text);

        let ingested = match &content.media {
            Some(media) => Some(
                self.ingest_media(&ticket.ticket_id, &self.tech_gateway, media)
                    .await,
            ),
            None => None,
        };

        let result = match &ingested {
            Some(media) => {
                self.mirror_media(&self.user_gateway, Destination::User(user_id), media, body)
                    .await
            }
            None => self.send_user(user_id, OutboundText::html(body)).await,
        };
        let delivery = delivery_from(result);
        match &delivery {
            Delivery::Blocked => {
                warn!(ticket_id = %ticket.ticket_id, user_id, "User has blocked the bot")
            }
            Delivery::Failed(e) => {
                warn!(ticket_id = %ticket.ticket_id, user_id, error = %e, "Failed to deliver technician message")
            }
            Delivery::Delivered { .. } => {}
        }

        let mut message = TicketMessage::technician(technician.clone(), text);
        message.topic_message_id = topic_message_id;
        message.user_message_id = delivery.message_id();
        if let Some(media) = ingested {
            message.media = Some(media.attachment);
        }

        let (ticket, _) = self
            .update(&ticket.ticket_id, |t| {
                if t.is_closed() {
                    return Err(EngineError::InvalidState(format!(
                        "Ticket {} is closed",
                        t.ticket_id
                    )));
                }
                t.push_message(message.clone());
                apply_technician_activity(t, &technician);
                Ok(true)
            })
            .await?;

        info!(
            ticket_id = %ticket.ticket_id,
            technician = %technician.name,
            delivered = delivery.is_delivered(),
            "Technician message recorded"
        );
        Ok(TechnicianReplyOutcome::Replied { ticket, delivery })
    }

    /// Sends a dashboard reply to the requester and mirrors it into the thread.
    pub async fn reply_from_web(
        &self,
        id: &TicketId,
        technician: TechnicianRef,
        text: &str,
    ) -> Result<WebReplyOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::validation("message is required"));
        }
        let ticket = self.get_ticket(id).await?;
        if ticket.is_closed() {
            return Err(EngineError::InvalidState(format!("Ticket {} is closed", id)));
        }

        let to_user = self.send_user(
            ticket.requester.user_id,
            OutboundText::html(templates::technician_message_for_user(&technician.name, text)),
        );
        let to_thread = async {
            match self.thread_of(&ticket) {
                Some(dest) => Some(
                    self.send_tech(
                        dest,
                        OutboundText::html(templates::web_reply_in_thread(&technician.name, text)),
                    )
                    .await,
                ),
                None => None,
            }
        };
        let (user_result, thread_result) = tokio::join!(to_user, to_thread);
        let delivery = delivery_from(user_result);
        let topic_message_id = mirrored_id(id, thread_result);

        let mut message = TicketMessage::technician(technician.clone(), text);
        message.user_message_id = delivery.message_id();
        message.topic_message_id = topic_message_id;
        self.commit_web_message(id, message, &technician, delivery, topic_message_id.is_some())
            .await
    }

    /// Stores a dashboard upload and delivers it to the requester.
    ///
    /// Voice notes that are not OGG/Opus are transcoded when a transcoder is
    /// configured, otherwise they are sent as audio. The blob upload and the
    /// delivery run concurrently.
    pub async fn send_web_media(
        &self,
        id: &TicketId,
        technician: TechnicianRef,
        upload: WebUpload,
    ) -> Result<WebReplyOutcome> {
        if upload.data.is_empty() {
            return Err(EngineError::validation("file is required"));
        }
        let ticket = self.get_ticket(id).await?;
        if ticket.is_closed() {
            return Err(EngineError::InvalidState(format!("Ticket {} is closed", id)));
        }

        let (kind, data, content_type) = self.prepare_upload(&upload).await;
        let mut attachment = MediaAttachment {
            kind,
            file_handle: None,
            blob_key: None,
            blob_url: None,
            file_name: Some(upload.file_name.clone()),
            mime_type: Some(content_type.clone()),
        };
        if kind == MediaKind::Voice {
            attachment.file_name = Some(replace_extension(&upload.file_name, ".ogg"));
        }
        let text = upload
            .caption
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| WEB_MEDIA_PLACEHOLDER.to_string());

        let key = blob_key(id, kind, &attachment.extension());
        let store = self.blobs.put(&key, data.clone(), &content_type);
        let file_name = attachment
            .file_name
            .clone()
            .unwrap_or_else(|| upload.file_name.clone());
        let mut outbound = OutboundMedia::new(
            kind,
            MediaSource::Bytes {
                data: data.clone(),
                file_name,
            },
        );
        if let Some(caption) = upload.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            outbound = outbound.with_caption(
                templates::technician_message_for_user(&technician.name, caption),
                TextFormat::Html,
            );
        }
        let deliver = with_timeout(
            self.timeout(),
            self.user_gateway
                .send_media(Destination::User(ticket.requester.user_id), outbound),
        );

        let (stored, user_result) = tokio::join!(tokio::time::timeout(self.timeout(), store), deliver);
        match stored {
            Ok(Ok(url)) => attachment = attachment.with_blob(key, url),
            Ok(Err(e)) => warn!(ticket_id = %id, error = %e, "Blob upload failed"),
            Err(_) => warn!(ticket_id = %id, "Blob upload timed out"),
        }
        let delivery = delivery_from(user_result);

        let thread_result = match self.thread_of(&ticket) {
            Some(dest) => {
                let media = IngestedMedia {
                    attachment: attachment.clone(),
                    data: Some(data),
                };
                let caption = templates::web_reply_in_thread(&technician.name, &text);
                Some(
                    self.mirror_media(&self.tech_gateway, dest, &media, caption)
                        .await,
                )
            }
            None => None,
        };
        let topic_message_id = mirrored_id(id, thread_result);

        let mut message = TicketMessage::technician(technician.clone(), text).with_media(attachment);
        message.user_message_id = delivery.message_id();
        message.topic_message_id = topic_message_id;
        self.commit_web_message(id, message, &technician, delivery, topic_message_id.is_some())
            .await
    }

    async fn commit_web_message(
        &self,
        id: &TicketId,
        message: TicketMessage,
        technician: &TechnicianRef,
        delivery: Delivery,
        mirrored: bool,
    ) -> Result<WebReplyOutcome> {
        let (ticket, _) = self
            .update(id, |t| {
                t.push_message(message.clone());
                t.mark_read();
                apply_technician_activity(t, technician);
                Ok(true)
            })
            .await?;
        info!(
            ticket_id = %id,
            technician = %technician.name,
            delivered = delivery.is_delivered(),
            "Dashboard reply recorded"
        );
        Ok(WebReplyOutcome {
            ticket,
            delivery,
            mirrored,
        })
    }

    /// Resolves the final kind, bytes and content type of an upload.
    async fn prepare_upload(&self, upload: &WebUpload) -> (MediaKind, Vec<u8>, String) {
        let kind = upload.resolved_kind();
        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| kind.default_content_type().to_string());

        if kind != MediaKind::Voice || is_ogg(&upload.data) {
            return (kind, upload.data.clone(), content_type);
        }

        match &self.transcoder {
            Some(transcoder) => {
                let transcoder = Arc::clone(transcoder);
                match transcoder.to_ogg_opus(upload.data.clone()).await {
                    Ok(ogg) => (MediaKind::Voice, ogg, "audio/ogg".to_string()),
                    Err(e) => {
                        warn!(error = %e, "Voice transcoding failed, sending as audio");
                        (MediaKind::Audio, upload.data.clone(), content_type)
                    }
                }
            }
            None => (MediaKind::Audio, upload.data.clone(), content_type),
        }
    }
}

fn mirrored_id(id: &TicketId, result: Option<GatewayResult<SentMessage>>) -> Option<i32> {
    match result {
        Some(Ok(sent)) => Some(sent.message_id),
        Some(Err(e)) => {
            warn!(ticket_id = %id, error = %e, "Failed to mirror dashboard message into thread");
            None
        }
        None => None,
    }
}

fn replace_extension(file_name: &str, extension: &str) -> String {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(file_name);
    format!("{}{}", stem, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_kind() {
        let upload = WebUpload {
            data: vec![1],
            file_name: "a.png".into(),
            content_type: Some("image/png".into()),
            kind: None,
            caption: None,
        };
        assert_eq!(upload.resolved_kind(), MediaKind::Photo);

        let explicit = WebUpload {
            kind: Some(MediaKind::Document),
            ..upload
        };
        assert_eq!(explicit.resolved_kind(), MediaKind::Document);
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(replace_extension("note.webm", ".ogg"), "note.ogg");
        assert_eq!(replace_extension("note", ".ogg"), "note.ogg");
    }
}
