//! Escalation to the level-2 pool and reopening of closed tickets.

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use ticketdesk_models::{TechnicianRef, Ticket, TicketId, TicketMessage, TicketStatus};

use super::outcome::EscalationOutcome;
use super::{Engine, TICKET_TOPIC_COLOR};
use crate::error::{EngineError, Result};
use crate::gateway::{with_timeout, Destination, OutboundText};
use crate::locks::user_key;
use crate::templates;

const NO_REASON: &str = "No reason provided";

impl Engine {
    /// Hands a ticket to the level-2 pool.
    ///
    /// The assignment is cleared so a level-2 technician picks it up on their
    /// first reply. Every pool member gets a direct message; failures are
    /// counted, not raised.
    pub async fn escalate_ticket(
        &self,
        id: &TicketId,
        reason: Option<String>,
        actor: &TechnicianRef,
    ) -> Result<EscalationOutcome> {
        let pool = self.config.admin.level2_ids.clone();
        if pool.is_empty() {
            return Err(EngineError::NoEscalationPool);
        }
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let shown_reason = reason.clone().unwrap_or_else(|| NO_REASON.to_string());

        let (ticket, _) = self
            .update(id, |t| {
                if t.is_closed() {
                    return Err(EngineError::InvalidState(format!(
                        "Ticket {} is closed",
                        t.ticket_id
                    )));
                }
                t.status = TicketStatus::Escalated;
                t.escalated_at = Some(Utc::now());
                t.escalation_reason = reason.clone();
                t.unassign();
                t.push_message(TicketMessage::system(format!(
                    "Ticket ESCALATED to Level 2\nReason: {}",
                    shown_reason
                )));
                Ok(true)
            })
            .await?;
        info!(ticket_id = %id, escalated_by = %actor.name, "Ticket escalated");

        let text = templates::escalation_notice(&ticket, &shown_reason, &actor.name);
        let keyboard = self
            .config
            .webapp
            .url
            .as_deref()
            .map(|url| templates::webapp_keyboard(url, id));
        let sends = pool.iter().map(|&tech_id| {
            let mut message = OutboundText::html(text.clone());
            if let Some(keyboard) = &keyboard {
                message = message.with_keyboard(keyboard.clone());
            }
            self.send_tech(Destination::User(tech_id), message)
        });
        let results = join_all(sends).await;

        let mut notified = 0;
        let mut failed = 0;
        for (tech_id, result) in pool.iter().zip(results) {
            match result {
                Ok(_) => notified += 1,
                Err(e) => {
                    failed += 1;
                    warn!(ticket_id = %id, technician_id = tech_id, error = %e, "Escalation notice failed");
                }
            }
        }

        if let Some(dest) = self.thread_of(&ticket) {
            let note = format!(
                "🚨 Escalated to Level 2 by {}\nReason: {}",
                crate::markup::escape(&actor.name),
                crate::markup::escape(&shown_reason)
            );
            if let Err(e) = self.send_tech(dest, OutboundText::html(note)).await {
                warn!(ticket_id = %id, error = %e, "Failed to post escalation in thread");
            }
        }

        Ok(EscalationOutcome {
            ticket,
            notified,
            failed,
        })
    }

    /// Reopens a closed ticket.
    ///
    /// Refused while the requester has another active ticket. A ticket whose
    /// thread was already deleted gets a fresh one.
    pub async fn reopen_ticket(&self, id: &TicketId, actor: &TechnicianRef) -> Result<Ticket> {
        let current = self.get_ticket(id).await?;
        if !current.is_closed() {
            return Err(EngineError::InvalidState(format!(
                "Ticket {} is not closed",
                id
            )));
        }

        let user_id = current.requester.user_id;
        let _guard = self.locks.lock(&user_key(user_id)).await;

        if let Some(active) = self.find_active_ticket_for_user(user_id).await? {
            if active.ticket_id != *id {
                return Err(EngineError::InvalidState(format!(
                    "User already has an active ticket: {}",
                    active.ticket_id
                )));
            }
        }

        let fresh_thread = match current.topic_id {
            Some(_) => None,
            None => {
                let group = self.config.groups.technician_group_id;
                let title = templates::thread_title(&current);
                let thread = with_timeout(
                    self.timeout(),
                    self.tech_gateway.create_thread(group, &title, TICKET_TOPIC_COLOR),
                )
                .await
                .map_err(|e| EngineError::RoutingUnavailable(e.to_string()))?;
                Some((group, thread))
            }
        };

        let (ticket, _) = self
            .update(id, |t| {
                if !t.is_closed() {
                    return Err(EngineError::InvalidState(format!(
                        "Ticket {} is not closed",
                        t.ticket_id
                    )));
                }
                if let Some((group, thread)) = &fresh_thread {
                    t.topic_id = Some(thread.thread_id);
                    t.topic_name = Some(thread.name.clone());
                    t.tech_group_chat_id = Some(*group);
                    t.topic_deleted_at = None;
                }
                t.status = TicketStatus::Open;
                t.closed_at = None;
                t.schedule_topic_deletion(None);
                t.closure_pending = None;
                t.push_message(TicketMessage::system(format!(
                    "Ticket reopened by {}",
                    actor.name
                )));
                Ok(true)
            })
            .await?;
        info!(ticket_id = %id, reopened_by = %actor.name, "Ticket reopened");

        if let Some(dest) = self.thread_of(&ticket) {
            let text = if fresh_thread.is_some() {
                templates::ticket_card(&ticket)
            } else {
                format!(
                    "🔓 <b>Ticket reopened</b> by {}",
                    crate::markup::escape(&actor.name)
                )
            };
            if let Err(e) = self.send_tech(dest, OutboundText::html(text)).await {
                warn!(ticket_id = %id, error = %e, "Failed to post reopen notice in thread");
            }
        }
        if let Err(e) = self
            .send_user(user_id, OutboundText::html(templates::ticket_reopened(id)))
            .await
        {
            warn!(ticket_id = %id, user_id, error = %e, "Failed to notify user of reopen");
        }

        Ok(ticket)
    }
}
