//! Closure state machine and the categorization sub-flow.
//!
//! ```text
//! OPEN | IN_PROGRESS | ESCALATED ──close──▶ (categories required and missing?)
//!        │ no                                   │ yes
//!        ▼                                      ▼
//!     finalize ◀──────── done ──────── AWAITING_CATEGORIZATION
//!        │
//!        ▼
//!     CLOSED ─▶ archive ─▶ topic disposition
//! ```
//!
//! Finalization commits `closed` before any side effect runs; nothing after
//! the commit can revert it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use ticketdesk_models::{ClosurePending, TechnicianRef, Ticket, TicketId, TicketMessage};

use super::outcome::{ArchiveStatus, CategoryToggle, ClosureReport, CloseOutcome, TopicDisposition};
use super::Engine;
use crate::error::{EngineError, Result};
use crate::gateway::{with_timeout, Destination, GatewayError, OutboundText};
use crate::templates;

impl Engine {
    /// Closes a ticket on behalf of a technician.
    ///
    /// Closing an already-closed ticket is a no-op. When categorization is
    /// mandatory and the ticket has none, the closure is parked and the
    /// category picker returned instead.
    pub async fn close_ticket(&self, id: &TicketId, actor: TechnicianRef) -> Result<CloseOutcome> {
        let ticket = self.get_ticket(id).await?;
        if ticket.is_closed() {
            return Ok(CloseOutcome::AlreadyClosed(ticket));
        }

        if ticket.closure_pending.is_none() {
            self.notify_user_closed(&ticket).await;
        }

        if self.config.categorization_required() && ticket.categories.is_empty() {
            let (ticket, _) = self
                .update(id, |t| {
                    if t.closure_pending.is_some() {
                        return Ok(false);
                    }
                    t.closure_pending = Some(ClosurePending {
                        requested_by: actor.clone(),
                        requested_at: Utc::now(),
                    });
                    t.touch();
                    Ok(true)
                })
                .await?;
            info!(ticket_id = %id, "Closure waiting for categorization");
            return Ok(CloseOutcome::AwaitingCategorization {
                prompt: templates::category_prompt(&ticket, &self.config.categories),
                keyboard: templates::category_keyboard(&ticket, &self.config.categories),
                ticket,
            });
        }

        self.finalize_closure(id, &actor).await
    }

    /// Replaces the ticket's categories, closing it afterwards.
    ///
    /// Used by the dashboard, which submits the selection with the close request.
    pub async fn close_with_categories(
        &self,
        id: &TicketId,
        actor: TechnicianRef,
        categories: Option<Vec<String>>,
    ) -> Result<CloseOutcome> {
        if let Some(categories) = categories {
            let ticket = self.get_ticket(id).await?;
            if ticket.is_closed() {
                return Ok(CloseOutcome::AlreadyClosed(ticket));
            }
            if !categories.is_empty() || self.config.categorization_required() {
                self.set_categories(id, categories, &actor).await?;
            }
        }
        self.close_ticket(id, actor).await
    }

    /// Replaces the category set after validating it against the taxonomy.
    pub async fn set_categories(
        &self,
        id: &TicketId,
        categories: Vec<String>,
        actor: &TechnicianRef,
    ) -> Result<Ticket> {
        let mut selected: Vec<String> = Vec::with_capacity(categories.len());
        for category in categories {
            if self.config.category(&category).is_none() {
                return Err(EngineError::validation(format!("unknown category: {}", category)));
            }
            if !selected.contains(&category) {
                selected.push(category);
            }
        }
        if selected.is_empty() && self.config.categorization_required() {
            return Err(EngineError::validation("at least one category is required"));
        }

        let (ticket, _) = self
            .update(id, |t| {
                t.categories = selected.clone();
                t.categorized_by = Some(actor.clone());
                t.categorized_at = Some(Utc::now());
                t.touch();
                Ok(true)
            })
            .await?;
        Ok(ticket)
    }

    /// Toggles one category from the picker. Persists immediately.
    pub async fn toggle_category(&self, id: &TicketId, category_id: &str) -> Result<CategoryToggle> {
        if self.config.category(category_id).is_none() {
            return Err(EngineError::validation(format!(
                "unknown category: {}",
                category_id
            )));
        }
        let mut selected = false;
        let (ticket, _) = self
            .update(id, |t| {
                if t.is_closed() {
                    return Err(EngineError::InvalidState(format!(
                        "Ticket {} is already closed",
                        t.ticket_id
                    )));
                }
                selected = t.toggle_category(category_id);
                Ok(true)
            })
            .await?;
        Ok(CategoryToggle {
            prompt: templates::category_prompt(&ticket, &self.config.categories),
            keyboard: templates::category_keyboard(&ticket, &self.config.categories),
            selected,
            ticket,
        })
    }

    /// The picker's "done" button: stamps the categorization and resumes closure.
    pub async fn finish_categorization(&self, id: &TicketId, actor: TechnicianRef) -> Result<CloseOutcome> {
        let ticket = self.get_ticket(id).await?;
        if ticket.is_closed() {
            return Ok(CloseOutcome::AlreadyClosed(ticket));
        }
        if ticket.categories.is_empty() {
            return Err(EngineError::validation("Please select at least one category"));
        }

        self.update(id, |t| {
            t.categorized_by = Some(actor.clone());
            t.categorized_at = Some(Utc::now());
            t.touch();
            Ok(true)
        })
        .await?;

        let closer = ticket
            .closure_pending
            .as_ref()
            .map(|p| p.requested_by.clone())
            .unwrap_or(actor);
        self.finalize_closure(id, &closer).await
    }

    /// Steps 4 to 7: commit, archive, topic disposition, report.
    async fn finalize_closure(&self, id: &TicketId, actor: &TechnicianRef) -> Result<CloseOutcome> {
        let retention = self.config.topic_retention();
        let (ticket, committed) = self
            .update(id, |t| {
                if t.is_closed() {
                    return Ok(false);
                }
                let now = Utc::now();
                t.status = ticketdesk_models::TicketStatus::Closed;
                t.closed_at = Some(now);
                t.closure_pending = None;
                if t.topic_id.is_some() {
                    t.schedule_topic_deletion(Some(now + retention));
                }
                t.push_message(TicketMessage::system(format!("Ticket closed by {}", actor.name)));
                Ok(true)
            })
            .await?;
        if !committed {
            return Ok(CloseOutcome::AlreadyClosed(ticket));
        }
        info!(ticket_id = %id, closed_by = %actor.name, "Ticket closed");

        if let Some(dest) = self.thread_of(&ticket) {
            let notice = OutboundText::html(templates::closed_in_thread(id, &actor.name));
            if let Err(e) = self.send_tech(dest, notice).await {
                warn!(ticket_id = %id, error = %e, "Failed to post closure notice in thread");
            }
        }

        let (ticket, archive) = self.archive_closed(ticket).await;
        let (ticket, topic) = self.dispose_topic(ticket).await;

        Ok(CloseOutcome::Closed(Box::new(ClosureReport {
            categories: ticket.categories.clone(),
            ticket,
            archive,
            topic,
        })))
    }

    /// Sends the "closed" notice and schedules the rating prompt.
    async fn notify_user_closed(&self, ticket: &Ticket) {
        let user_id = ticket.requester.user_id;
        if let Err(e) = self
            .send_user(user_id, OutboundText::html(templates::ticket_closed(&ticket.ticket_id)))
            .await
        {
            warn!(ticket_id = %ticket.ticket_id, user_id, error = %e, "Failed to notify user of closure");
        }

        if !self.config.features.enable_ratings || ticket.rating.is_some() {
            return;
        }
        let gateway = Arc::clone(&self.user_gateway);
        let delay = self.config.rating_prompt_delay();
        let timeout = self.timeout();
        let ticket_id = ticket.ticket_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let prompt = OutboundText::html(templates::RATING_PROMPT)
                .with_keyboard(templates::rating_keyboard(&ticket_id));
            if let Err(e) = with_timeout(timeout, gateway.send_text(Destination::User(user_id), prompt)).await {
                warn!(ticket_id = %ticket_id, user_id, error = %e, "Failed to send rating prompt");
            }
        });
    }

    async fn archive_closed(&self, ticket: Ticket) -> (Ticket, ArchiveStatus) {
        if !self.config.features.enable_archiving {
            return (ticket, ArchiveStatus::Disabled);
        }
        let receipt = match self.archiver.archive(&ticket).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(ticket_id = %ticket.ticket_id, error = %e, "Archiving failed");
                return (ticket, ArchiveStatus::Failed(e.to_string()));
            }
        };

        let status = ArchiveStatus::Archived {
            topic_id: receipt.topic_id,
            topic_name: receipt.topic_name.clone(),
        };
        match self
            .update(&ticket.ticket_id, |t| {
                t.archived_at = Some(receipt.archived_at);
                t.archive_topic_id = Some(receipt.topic_id);
                t.archive_topic_name = Some(receipt.topic_name.clone());
                t.touch();
                Ok(true)
            })
            .await
        {
            Ok((saved, _)) => (saved, status),
            Err(e) => {
                error!(ticket_id = %ticket.ticket_id, error = %e, "Failed to record archive");
                (ticket, status)
            }
        }
    }

    /// Deletes the thread now when retention is zero, otherwise leaves it to
    /// the cleanup job.
    async fn dispose_topic(&self, ticket: Ticket) -> (Ticket, TopicDisposition) {
        let Some(topic_id) = ticket.topic_id else {
            return (ticket, TopicDisposition::NoTopic);
        };
        if self.config.features.topic_cleanup_hours > 0 {
            let due = ticket.topic_deletion_scheduled_at.unwrap_or_else(Utc::now);
            return (ticket, TopicDisposition::Scheduled(due));
        }

        let chat_id = ticket
            .tech_group_chat_id
            .unwrap_or(self.config.groups.technician_group_id);
        let disposition = match with_timeout(self.timeout(), self.tech_gateway.delete_thread(chat_id, topic_id)).await {
            Ok(()) => TopicDisposition::Deleted,
            Err(GatewayError::ThreadNotFound) => TopicDisposition::AlreadyGone,
            Err(e) => {
                warn!(ticket_id = %ticket.ticket_id, topic_id, error = %e, "Topic deletion failed; cleanup will retry");
                return (ticket, TopicDisposition::Failed(e.to_string()));
            }
        };

        match self
            .update(&ticket.ticket_id, |t| {
                if t.topic_id != Some(topic_id) {
                    return Ok(false);
                }
                t.clear_topic();
                t.topic_deleted_at = Some(Utc::now());
                Ok(true)
            })
            .await
        {
            Ok((saved, _)) => (saved, disposition),
            Err(e) => {
                error!(ticket_id = %ticket.ticket_id, error = %e, "Failed to record topic deletion");
                (ticket, disposition)
            }
        }
    }
}
