//! Results of engine operations, rendered by the presentation adapters.

use chrono::{DateTime, Utc};

use ticketdesk_models::{Ticket, TicketId};

use crate::gateway::Keyboard;

/// Result of routing a message from the requester.
#[derive(Debug, Clone)]
pub enum UserMessageOutcome {
    /// A new ticket was opened for the message.
    Created(Ticket),
    /// The message was added to the active ticket.
    Appended(Ticket),
    /// The active ticket's thread was gone; it was closed and a new one opened.
    Recreated { previous: TicketId, ticket: Ticket },
    /// No active ticket and automatic creation is disabled.
    NoActiveTicket,
}

impl UserMessageOutcome {
    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            UserMessageOutcome::Created(t)
            | UserMessageOutcome::Appended(t)
            | UserMessageOutcome::Recreated { ticket: t, .. } => Some(t),
            UserMessageOutcome::NoActiveTicket => None,
        }
    }
}

/// Whether the requester received a technician's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered { message_id: i32 },
    /// The requester blocked the bot. Never retried.
    Blocked,
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered { .. })
    }

    pub fn message_id(&self) -> Option<i32> {
        match self {
            Delivery::Delivered { message_id } => Some(*message_id),
            _ => None,
        }
    }
}

/// Result of a technician writing in a ticket thread.
#[derive(Debug, Clone)]
pub enum TechnicianReplyOutcome {
    /// The thread is not bound to an open ticket.
    NoTicket,
    Replied { ticket: Ticket, delivery: Delivery },
}

/// Result of a dashboard reply or upload.
#[derive(Debug, Clone)]
pub struct WebReplyOutcome {
    pub ticket: Ticket,
    pub delivery: Delivery,
    /// Whether the reply was mirrored into the ticket thread.
    pub mirrored: bool,
}

/// What happened to the archive copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveStatus {
    Disabled,
    Archived { topic_id: i32, topic_name: String },
    Failed(String),
}

/// What happened to the ticket's routing thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicDisposition {
    /// The ticket had no thread.
    NoTopic,
    /// Deletion is due at the given instant.
    Scheduled(DateTime<Utc>),
    Deleted,
    /// The thread was already gone.
    AlreadyGone,
    /// Deletion failed; the cleanup job retries.
    Failed(String),
}

/// Report of a finalized closure.
#[derive(Debug, Clone)]
pub struct ClosureReport {
    pub ticket: Ticket,
    pub categories: Vec<String>,
    pub archive: ArchiveStatus,
    pub topic: TopicDisposition,
}

/// Result of a close request.
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// The ticket was already closed. Nothing changed.
    AlreadyClosed(Ticket),
    /// Categories are required first; closure resumes from the picker.
    AwaitingCategorization {
        ticket: Ticket,
        prompt: String,
        keyboard: Keyboard,
    },
    Closed(Box<ClosureReport>),
}

impl CloseOutcome {
    pub fn ticket(&self) -> &Ticket {
        match self {
            CloseOutcome::AlreadyClosed(t) => t,
            CloseOutcome::AwaitingCategorization { ticket, .. } => ticket,
            CloseOutcome::Closed(report) => &report.ticket,
        }
    }
}

/// Result of toggling a category in the picker.
#[derive(Debug, Clone)]
pub struct CategoryToggle {
    pub ticket: Ticket,
    pub selected: bool,
    pub prompt: String,
    pub keyboard: Keyboard,
}

/// Result of a rating callback.
#[derive(Debug, Clone)]
pub enum RatingOutcome {
    Rated(Ticket),
    /// A rating already exists and was left unchanged.
    AlreadyRated(Ticket),
}

/// Result of an escalation.
#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub ticket: Ticket,
    pub notified: usize,
    pub failed: usize,
}
