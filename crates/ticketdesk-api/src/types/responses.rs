//! Response DTOs for the API.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ticketdesk_core::engine::{ArchiveStatus, CloseOutcome, Delivery, TopicDisposition, WebReplyOutcome};
use ticketdesk_core::markup::truncate;
use ticketdesk_models::{category_labels, Category, Rating, TechnicianRef, Ticket};

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Ticket row for queue and archive listings.
#[derive(Debug, Clone, Serialize)]
pub struct TicketSummary {
    pub ticket_id: String,
    pub status: String,
    pub user_id: i64,
    pub user_name: String,
    pub username: Option<String>,
    /// First line of the initial request.
    pub subject: String,
    pub assigned_to: Option<i64>,
    pub assigned_to_name: Option<String>,
    pub has_unread_messages: bool,
    pub unread_count: usize,
    pub message_count: usize,
    pub categories: Vec<String>,
    pub rating: Option<Rating>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<&Ticket> for TicketSummary {
    fn from(ticket: &Ticket) -> Self {
        let first_line = ticket.initial_message.lines().next().unwrap_or_default();
        Self {
            ticket_id: ticket.ticket_id.to_string(),
            status: ticket.status.as_str().to_string(),
            user_id: ticket.requester.user_id,
            user_name: ticket.requester.display_name(),
            username: ticket.requester.username.clone(),
            subject: truncate(first_line, 120),
            assigned_to: ticket.assigned_to,
            assigned_to_name: ticket.assigned_to_name.clone(),
            has_unread_messages: ticket.has_unread_messages,
            unread_count: ticket.unread_count(),
            message_count: ticket.messages.len(),
            categories: ticket.categories.clone(),
            rating: ticket.rating.clone(),
            last_message_at: ticket.last_message_at,
            created_at: ticket.created_at,
            closed_at: ticket.closed_at,
        }
    }
}

/// Open queue response.
#[derive(Debug, Clone, Serialize)]
pub struct TicketListResponse {
    pub tickets: Vec<TicketSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit.max(1)),
        }
    }
}

/// Archived tickets, newest closure first.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedListResponse {
    pub tickets: Vec<TicketSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoriesResponse {
    pub enabled: bool,
    pub required: bool,
    pub categories: Vec<Category>,
}

/// Full ticket with derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetailResponse {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub unread_count: usize,
    pub category_labels: Vec<String>,
}

impl TicketDetailResponse {
    pub fn new(ticket: Ticket, taxonomy: &[Category]) -> Self {
        Self {
            unread_count: ticket.unread_count(),
            category_labels: category_labels(taxonomy, &ticket.categories),
            ticket,
        }
    }
}

/// Result of a dashboard reply or upload.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyResponse {
    pub success: bool,
    pub ticket_id: String,
    pub status: String,
    /// Whether the requester received the message.
    pub delivered: bool,
    /// Whether the reply was mirrored into the ticket thread.
    pub mirrored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<&WebReplyOutcome> for ReplyResponse {
    fn from(outcome: &WebReplyOutcome) -> Self {
        let warning = match &outcome.delivery {
            Delivery::Delivered { .. } => None,
            Delivery::Blocked => Some("User has blocked the bot".to_string()),
            Delivery::Failed(e) => Some(format!("Delivery failed: {}", e)),
        };
        Self {
            success: true,
            ticket_id: outcome.ticket.ticket_id.to_string(),
            status: outcome.ticket.status.as_str().to_string(),
            delivered: outcome.delivery.is_delivered(),
            mirrored: outcome.mirrored,
            warning,
        }
    }
}

/// Result of a close request.
#[derive(Debug, Clone, Serialize)]
pub struct CloseResponse {
    pub ticket_id: String,
    /// `closed`, `already_closed` or `awaiting_categorization`.
    pub result: String,
    pub status: String,
    pub categories: Vec<String>,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_topic_name: Option<String>,
    /// `none`, `scheduled`, `deleted`, `already_gone` or `failed`.
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_deletion_scheduled_at: Option<DateTime<Utc>>,
}

impl From<&CloseOutcome> for CloseResponse {
    fn from(outcome: &CloseOutcome) -> Self {
        let ticket = outcome.ticket();
        let mut response = Self {
            ticket_id: ticket.ticket_id.to_string(),
            result: String::new(),
            status: ticket.status.as_str().to_string(),
            categories: ticket.categories.clone(),
            archived: ticket.archived_at.is_some(),
            archive_topic_name: ticket.archive_topic_name.clone(),
            topic: "none".to_string(),
            topic_deletion_scheduled_at: ticket.topic_deletion_scheduled_at,
        };
        match outcome {
            CloseOutcome::AlreadyClosed(_) => response.result = "already_closed".into(),
            CloseOutcome::AwaitingCategorization { .. } => {
                response.result = "awaiting_categorization".into()
            }
            CloseOutcome::Closed(report) => {
                response.result = "closed".into();
                response.archived = matches!(report.archive, ArchiveStatus::Archived { .. });
                response.topic = match &report.topic {
                    TopicDisposition::NoTopic => "none",
                    TopicDisposition::Scheduled(_) => "scheduled",
                    TopicDisposition::Deleted => "deleted",
                    TopicDisposition::AlreadyGone => "already_gone",
                    TopicDisposition::Failed(_) => "failed",
                }
                .to_string();
            }
        }
        response
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EscalateResponse {
    pub ticket_id: String,
    pub status: String,
    pub notified: usize,
    pub failed: usize,
}

/// A freshly issued link code. `secret` must accompany every poll.
#[derive(Debug, Clone, Serialize)]
pub struct LinkCodeResponse {
    pub code: String,
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

/// Poll result for a link code.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatusResponse {
    /// `pending` or `linked`.
    pub status: String,
    #[serde(flatten)]
    pub session: Option<SessionResponse>,
}

/// A dashboard session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub technician: TechnicianRef,
}
