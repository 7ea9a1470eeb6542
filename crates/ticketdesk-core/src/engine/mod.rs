//! Ticket lifecycle engine.
//!
//! Every state transition goes through [`Engine`]. Mutations run under a
//! per-ticket lock and are written with an optimistic version check; the
//! find-or-create path additionally holds a per-user lock so one user never
//! ends up with two active tickets.
//!
//! Side effects (gateway sends, blob uploads, archive) are best-effort: they
//! are logged when they fail and never roll back committed state.

mod closure;
mod escalation;
pub mod outcome;
mod rating;
mod technician;

pub use outcome::*;
pub use technician::WebUpload;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use ticketdesk_models::{
    InboundContent, InboundMedia, MediaAttachment, Requester, Ticket, TicketId, TicketMessage,
    TicketStatus,
};
use ticketdesk_persistence::{FaqStore, TechnicianStore, TicketQuery, TicketStore};

use crate::archive::Archiver;
use crate::blob::{blob_key, BlobStore};
use crate::codec::VoiceTranscoder;
use crate::config::HelpdeskConfig;
use crate::error::{EngineError, Result};
use crate::gateway::{
    with_timeout, Destination, GatewayError, GatewayResult, MediaSource, NotificationGateway,
    OutboundMedia, OutboundText, SentMessage, TextFormat,
};
use crate::locks::{user_key, KeyedLocks};
use crate::templates;

/// Icon colour for ticket threads.
pub const TICKET_TOPIC_COLOR: u32 = 0x6FB9F0;

/// Attempts per mutation before a version conflict is reported.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Media copied into durable storage, plus its bytes when they were fetched.
#[derive(Debug, Clone)]
pub(crate) struct IngestedMedia {
    pub attachment: MediaAttachment,
    pub data: Option<Vec<u8>>,
}

/// Result of appending to an existing ticket.
#[derive(Debug)]
pub(crate) enum AppendResult {
    Appended(Ticket),
    /// The routing thread is missing or was deleted out-of-band. Carries
    /// media that was already fetched and stored for the message.
    RouteLost(Ticket, Option<IngestedMedia>),
}

/// The ticket lifecycle engine.
pub struct Engine {
    config: Arc<HelpdeskConfig>,
    store: Arc<dyn TicketStore>,
    technicians: Arc<TechnicianStore>,
    faqs: Arc<FaqStore>,
    blobs: Arc<dyn BlobStore>,
    user_gateway: Arc<dyn NotificationGateway>,
    tech_gateway: Arc<dyn NotificationGateway>,
    transcoder: Option<Arc<dyn VoiceTranscoder>>,
    archiver: Archiver,
    locks: KeyedLocks,
}

impl Engine {
    pub fn new(
        config: Arc<HelpdeskConfig>,
        store: Arc<dyn TicketStore>,
        technicians: Arc<TechnicianStore>,
        blobs: Arc<dyn BlobStore>,
        user_gateway: Arc<dyn NotificationGateway>,
        tech_gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        let archiver = Archiver::new(
            Arc::clone(&config),
            Arc::clone(&tech_gateway),
            Arc::clone(&user_gateway),
            Arc::clone(&blobs),
        );
        Self {
            config,
            store,
            technicians,
            faqs: Arc::new(FaqStore::in_memory()),
            blobs,
            user_gateway,
            tech_gateway,
            transcoder: None,
            archiver,
            locks: KeyedLocks::new(),
        }
    }

    /// Enables voice transcoding for dashboard uploads.
    pub fn with_transcoder(mut self, transcoder: Arc<dyn VoiceTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Serves FAQ lookups from `faqs` instead of an empty collection.
    pub fn with_faqs(mut self, faqs: Arc<FaqStore>) -> Self {
        self.faqs = faqs;
        self
    }

    pub fn config(&self) -> &Arc<HelpdeskConfig> {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    pub fn technicians(&self) -> &Arc<TechnicianStore> {
        &self.technicians
    }

    pub fn faqs(&self) -> &Arc<FaqStore> {
        &self.faqs
    }

    pub fn user_gateway(&self) -> &Arc<dyn NotificationGateway> {
        &self.user_gateway
    }

    pub fn tech_gateway(&self) -> &Arc<dyn NotificationGateway> {
        &self.tech_gateway
    }

    /// True when `telegram_id` is a configured or linked technician.
    pub async fn is_technician(&self, telegram_id: i64) -> bool {
        self.config.is_technician(telegram_id) || self.technicians.get(telegram_id).await.is_some()
    }

    fn timeout(&self) -> Duration {
        self.config.outbound_timeout()
    }

    /// Statuses counted as active for the one-ticket-per-user rule.
    pub fn active_set(&self) -> Vec<TicketStatus> {
        TicketStatus::active_set(self.config.features.escalated_is_active)
    }

    // ---- reads ----

    pub async fn get_ticket(&self, id: &TicketId) -> Result<Ticket> {
        Ok(self.store.require(id).await?)
    }

    /// Newest ticket of the user whose status is in the active set.
    pub async fn find_active_ticket_for_user(&self, user_id: i64) -> Result<Option<Ticket>> {
        let query = TicketQuery::latest_for_user(user_id, self.active_set());
        Ok(self.store.find_one(&query).await?)
    }

    /// A user's most recent tickets in any status, newest first.
    pub async fn recent_tickets_for_user(&self, user_id: i64, limit: usize) -> Result<Vec<Ticket>> {
        let query = TicketQuery {
            user_id: Some(user_id),
            limit: Some(limit),
            ..TicketQuery::default()
        };
        Ok(self.store.find(&query).await?)
    }

    /// Non-closed ticket bound to a technician thread.
    pub async fn ticket_for_topic(&self, topic_id: i32) -> Result<Option<Ticket>> {
        let statuses = vec![
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Escalated,
        ];
        Ok(self
            .store
            .find_one(&TicketQuery::for_topic(topic_id, statuses))
            .await?)
    }

    /// Active tickets, unread first then most recent activity.
    pub async fn open_queue(&self, limit: usize) -> Result<Vec<Ticket>> {
        Ok(self
            .store
            .find(&TicketQuery::queue(self.active_set(), limit))
            .await?)
    }

    /// One page of closed tickets plus the total number of closed tickets.
    pub async fn archived_page(&self, page: usize, per_page: usize) -> Result<(Vec<Ticket>, usize)> {
        let query = TicketQuery::archived_page(page.max(1), per_page);
        let tickets = self.store.find(&query).await?;
        let total = self.store.count(&query.unpaged()).await?;
        Ok((tickets, total))
    }

    /// Marks every user message on the ticket as read.
    pub async fn mark_read(&self, id: &TicketId) -> Result<Ticket> {
        let (ticket, _) = self
            .update(id, |t| {
                if !t.has_unread_messages && t.unread_count() == 0 {
                    return Ok(false);
                }
                t.mark_read();
                Ok(true)
            })
            .await?;
        Ok(ticket)
    }

    // ---- user messages ----

    /// Routes a message from the requester to their active ticket, opening
    /// one when none exists.
    pub async fn handle_user_message(
        &self,
        requester: Requester,
        content: InboundContent,
        user_message_id: Option<i32>,
    ) -> Result<UserMessageOutcome> {
        if content.is_empty() {
            return Err(EngineError::validation("message has no content"));
        }
        let user_id = requester.user_id;
        let _guard = self.locks.lock(&user_key(user_id)).await;

        let mut previous = None;
        match self.find_active_ticket_for_user(user_id).await? {
            Some(active) => match self.append_user_message(&active, &content, user_message_id).await? {
                AppendResult::Appended(ticket) => return Ok(UserMessageOutcome::Appended(ticket)),
                AppendResult::RouteLost(lost, media) => {
                    warn!(
                        ticket_id = %lost.ticket_id,
                        user_id,
                        "Routing thread lost; closing ticket and opening a new one"
                    );
                    self.close_lost_route(&lost.ticket_id).await?;
                    previous = Some((lost.ticket_id, media));
                }
            },
            None if !self.config.features.auto_create_ticket => {
                return Ok(UserMessageOutcome::NoActiveTicket);
            }
            None => {}
        }

        Ok(match previous {
            Some((previous, media)) => {
                let ticket = self.open_ticket(requester, content, user_message_id, media).await?;
                UserMessageOutcome::Recreated { previous, ticket }
            }
            None => {
                let ticket = self.open_ticket(requester, content, user_message_id, None).await?;
                UserMessageOutcome::Created(ticket)
            }
        })
    }

    /// Opens a ticket for the first message of a conversation.
    ///
    /// If the technician thread cannot be created the record is deleted again
    /// and [`EngineError::RoutingUnavailable`] is returned.
    pub async fn create_ticket(
        &self,
        requester: Requester,
        content: InboundContent,
        user_message_id: Option<i32>,
    ) -> Result<Ticket> {
        self.open_ticket(requester, content, user_message_id, None).await
    }

    /// [`Engine::create_ticket`], reusing media already ingested for the
    /// same message when there is some.
    async fn open_ticket(
        &self,
        requester: Requester,
        content: InboundContent,
        user_message_id: Option<i32>,
        prefetched: Option<IngestedMedia>,
    ) -> Result<Ticket> {
        if content.is_empty() {
            return Err(EngineError::validation("message has no content"));
        }
        let group = self.config.groups.technician_group_id;
        let id = self.store.next_ticket_id().await?;

        let mut draft = Ticket::new(id.clone(), requester, content.transcript_text());
        draft.tech_group_chat_id = Some(group);
        let draft = self.store.insert(&draft).await?;

        let title = templates::thread_title(&draft);
        let thread = match with_timeout(
            self.timeout(),
            self.tech_gateway.create_thread(group, &title, TICKET_TOPIC_COLOR),
        )
        .await
        {
            Ok(thread) => thread,
            Err(e) => {
                warn!(ticket_id = %id, error = %e, "Failed to create ticket thread");
                if let Err(del) = self.store.delete(&id).await {
                    warn!(ticket_id = %id, error = %del, "Failed to remove unroutable ticket");
                }
                return Err(EngineError::RoutingUnavailable(e.to_string()));
            }
        };
        let dest = Destination::Thread {
            chat_id: group,
            thread_id: thread.thread_id,
        };

        let ingested = match (prefetched, &content.media) {
            (Some(ingested), _) => Some(ingested),
            (None, Some(media)) => Some(self.ingest_media(&id, &self.user_gateway, media).await),
            (None, None) => None,
        };

        let card = self
            .send_tech(dest, OutboundText::html(templates::ticket_card(&draft)))
            .await;
        if let Err(e) = &card {
            warn!(ticket_id = %id, error = %e, "Failed to post ticket card");
        }

        let topic_message_id = match &ingested {
            Some(media) => {
                let caption = templates::user_message_in_thread(&draft, &content.transcript_text());
                self.mirror_media(&self.tech_gateway, dest, media, caption)
                    .await
                    .map_err(|e| warn!(ticket_id = %id, error = %e, "Failed to mirror media"))
                    .ok()
                    .map(|s| s.message_id)
            }
            None => card.ok().map(|s| s.message_id),
        };

        let mut message = TicketMessage::user(&content, user_message_id);
        message.topic_message_id = topic_message_id;
        if let Some(media) = ingested {
            message.media = Some(media.attachment);
        }

        let (ticket, _) = self
            .update(&id, |t| {
                t.topic_id = Some(thread.thread_id);
                t.topic_name = Some(thread.name.clone());
                t.push_message(message.clone());
                Ok(true)
            })
            .await?;

        info!(
            ticket_id = %ticket.ticket_id,
            user_id = ticket.requester.user_id,
            topic_id = thread.thread_id,
            "Ticket created"
        );

        self.notify_new_ticket(&ticket).await;
        Ok(ticket)
    }

    /// Adds a requester message to an existing ticket and mirrors it into
    /// the thread. A missing or deleted thread yields [`AppendResult::RouteLost`]
    /// without touching the ticket.
    pub(crate) async fn append_user_message(
        &self,
        ticket: &Ticket,
        content: &InboundContent,
        user_message_id: Option<i32>,
    ) -> Result<AppendResult> {
        let Some(dest) = self.thread_of(ticket) else {
            return Ok(AppendResult::RouteLost(ticket.clone(), None));
        };

        let ingested = match &content.media {
            Some(media) => Some(
                self.ingest_media(&ticket.ticket_id, &self.user_gateway, media)
                    .await,
            ),
            None => None,
        };

        let body = templates::user_message_in_thread(ticket, &content.transcript_text());
        let sent = match &ingested {
            Some(media) => self.mirror_media(&self.tech_gateway, dest, media, body).await,
            None => self.send_tech(dest, OutboundText::html(body)).await,
        };
        let topic_message_id = match sent {
            Ok(sent) => Some(sent.message_id),
            Err(GatewayError::ThreadNotFound) => {
                return Ok(AppendResult::RouteLost(ticket.clone(), ingested));
            }
            Err(e) => {
                warn!(ticket_id = %ticket.ticket_id, error = %e, "Failed to mirror user message");
                None
            }
        };

        let mut message = TicketMessage::user(content, user_message_id);
        message.topic_message_id = topic_message_id;
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
                Ok(true)
            })
            .await?;
        debug!(ticket_id = %ticket.ticket_id, messages = ticket.messages.len(), "User message appended");
        Ok(AppendResult::Appended(ticket))
    }

    /// Closes a ticket whose routing thread disappeared.
    async fn close_lost_route(&self, id: &TicketId) -> Result<Ticket> {
        let (ticket, _) = self
            .update(id, |t| {
                if t.is_closed() {
                    return Ok(false);
                }
                let now = chrono::Utc::now();
                t.push_message(TicketMessage::system(
                    "Routing thread was lost. Conversation continues in a new ticket.",
                ));
                if t.topic_id.is_some() {
                    t.topic_deleted_at = Some(now);
                }
                t.clear_topic();
                t.status = TicketStatus::Closed;
                t.closed_at = Some(now);
                t.schedule_topic_deletion(None);
                Ok(true)
            })
            .await?;
        Ok(ticket)
    }

    // ---- shared helpers ----

    /// Loads, mutates and writes a ticket under its lock.
    ///
    /// The closure returns whether anything changed; unchanged tickets are
    /// not written. Stale writes are retried on a fresh copy.
    pub(crate) async fn update<F>(&self, id: &TicketId, mut mutate: F) -> Result<(Ticket, bool)>
    where
        F: FnMut(&mut Ticket) -> Result<bool> + Send,
    {
        let _guard = self.locks.lock(id.as_str()).await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut ticket = self.store.require(id).await?;
            if !mutate(&mut ticket)? {
                return Ok((ticket, false));
            }
            match self.store.replace(&ticket).await {
                Ok(saved) => return Ok((saved, true)),
                Err(e) if e.is_conflict() && attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(ticket_id = %id, attempt, "Version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Thread destination of a ticket, if it still has one.
    pub fn thread_of(&self, ticket: &Ticket) -> Option<Destination> {
        ticket.topic_id.map(|thread_id| Destination::Thread {
            chat_id: ticket
                .tech_group_chat_id
                .unwrap_or(self.config.groups.technician_group_id),
            thread_id,
        })
    }

    pub(crate) async fn send_tech(&self, to: Destination, message: OutboundText) -> GatewayResult<SentMessage> {
        with_timeout(self.timeout(), self.tech_gateway.send_text(to, message)).await
    }

    pub(crate) async fn send_user(&self, user_id: i64, message: OutboundText) -> GatewayResult<SentMessage> {
        with_timeout(
            self.timeout(),
            self.user_gateway.send_text(Destination::User(user_id), message),
        )
        .await
    }

    /// File handles are only portable when both sides use the same bot.
    fn handles_are_shared(&self) -> bool {
        !self.config.has_separate_tech_bot()
    }

    /// Fetches media through the receiving gateway and stores a durable copy.
    /// Failures leave the attachment with only its transport handle.
    pub(crate) async fn ingest_media(
        &self,
        ticket_id: &TicketId,
        gateway: &Arc<dyn NotificationGateway>,
        media: &InboundMedia,
    ) -> IngestedMedia {
        let mut attachment = media.to_attachment();
        let data = match with_timeout(self.timeout(), gateway.fetch_file(&media.handle)).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(ticket_id = %ticket_id, kind = %media.kind, error = %e, "Failed to fetch media");
                None
            }
        };

        if let Some(bytes) = &data {
            let key = blob_key(ticket_id, media.kind, &attachment.extension());
            let put = self.blobs.put(&key, bytes.clone(), attachment.content_type());
            match tokio::time::timeout(self.timeout(), put).await {
                Ok(Ok(url)) => attachment = attachment.with_blob(key, url),
                Ok(Err(e)) => warn!(ticket_id = %ticket_id, error = %e, "Blob upload failed"),
                Err(_) => warn!(ticket_id = %ticket_id, "Blob upload timed out"),
            }
        }

        IngestedMedia { attachment, data }
    }

    /// Sends ingested media through `gateway`, preferring fetched bytes.
    pub(crate) async fn mirror_media(
        &self,
        gateway: &Arc<dyn NotificationGateway>,
        to: Destination,
        media: &IngestedMedia,
        caption: String,
    ) -> GatewayResult<SentMessage> {
        let attachment = &media.attachment;
        let source = match (&media.data, &attachment.file_handle) {
            (Some(data), _) => MediaSource::Bytes {
                data: data.clone(),
                file_name: attachment
                    .file_name
                    .clone()
                    .unwrap_or_else(|| format!("{}{}", attachment.kind, attachment.extension())),
            },
            (None, Some(handle)) if self.handles_are_shared() => MediaSource::Handle(handle.clone()),
            _ => {
                let text = format!("{}\n[Media unavailable]", caption);
                return with_timeout(self.timeout(), gateway.send_text(to, OutboundText::html(text))).await;
            }
        };
        let outbound = OutboundMedia::new(attachment.kind, source).with_caption(caption, TextFormat::Html);
        with_timeout(self.timeout(), gateway.send_media(to, outbound)).await
    }

    /// Direct-messages every linked technician about a new ticket.
    async fn notify_new_ticket(&self, ticket: &Ticket) {
        let technicians = self.technicians.list().await;
        if technicians.is_empty() {
            return;
        }
        let text = templates::new_ticket_notice(ticket);
        let keyboard = self
            .config
            .webapp
            .url
            .as_deref()
            .map(|url| templates::webapp_keyboard(url, &ticket.ticket_id));

        let sends = technicians.iter().map(|tech| {
            let mut message = OutboundText::html(text.clone());
            if let Some(keyboard) = &keyboard {
                message = message.with_keyboard(keyboard.clone());
            }
            self.send_tech(Destination::User(tech.telegram_id), message)
        });
        let results = join_all(sends).await;
        for (tech, result) in technicians.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    ticket_id = %ticket.ticket_id,
                    technician_id = tech.telegram_id,
                    error = %e,
                    "Failed to notify technician"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests;
