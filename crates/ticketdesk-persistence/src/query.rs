//! Ticket query criteria shared by every store backend.

use chrono::{DateTime, Utc};
use ticketdesk_models::{Ticket, TicketStatus};

/// Ordering applied to query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketSort {
    /// Newest `created_at` first.
    #[default]
    NewestFirst,
    /// Unread first, then most recent `last_message_at`.
    UnreadThenRecent,
    /// Most recent `closed_at` first.
    RecentlyClosed,
    /// Earliest `topic_deletion_scheduled_at` first.
    DeletionDue,
}

/// Filter, sort and page criteria for tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    /// Filter by requester.
    pub user_id: Option<i64>,
    /// Filter by technician thread.
    pub topic_id: Option<i32>,
    /// Allowed statuses. Empty matches every status.
    pub statuses: Vec<TicketStatus>,
    /// Only tickets whose topic deletion is due at or before this instant.
    pub deletion_due_by: Option<DateTime<Utc>>,
    /// Only tickets that still have a routing thread.
    pub requires_topic: bool,
    pub sort: TicketSort,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TicketQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest ticket of a user within `statuses`.
    pub fn latest_for_user(user_id: i64, statuses: Vec<TicketStatus>) -> Self {
        Self {
            user_id: Some(user_id),
            statuses,
            sort: TicketSort::NewestFirst,
            limit: Some(1),
            ..Self::default()
        }
    }

    /// Ticket bound to a technician thread within `statuses`.
    pub fn for_topic(topic_id: i32, statuses: Vec<TicketStatus>) -> Self {
        Self {
            topic_id: Some(topic_id),
            statuses,
            sort: TicketSort::NewestFirst,
            limit: Some(1),
            ..Self::default()
        }
    }

    /// Dashboard queue: unread first, then most recent activity.
    pub fn queue(statuses: Vec<TicketStatus>, limit: usize) -> Self {
        Self {
            statuses,
            sort: TicketSort::UnreadThenRecent,
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// One page of closed tickets, newest closure first. Pages start at 1.
    pub fn archived_page(page: usize, per_page: usize) -> Self {
        Self {
            statuses: vec![TicketStatus::Closed],
            sort: TicketSort::RecentlyClosed,
            offset: page.saturating_sub(1) * per_page,
            limit: Some(per_page),
            ..Self::default()
        }
    }

    /// Closed tickets whose topic deletion is overdue.
    pub fn cleanup_due(now: DateTime<Utc>, limit: usize) -> Self {
        Self {
            statuses: vec![TicketStatus::Closed],
            deletion_due_by: Some(now),
            requires_topic: true,
            sort: TicketSort::DeletionDue,
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Sets the status filter.
    pub fn with_statuses(mut self, statuses: Vec<TicketStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Drops paging, keeping only the filter. Used for counts.
    pub fn unpaged(&self) -> Self {
        Self {
            offset: 0,
            limit: None,
            ..self.clone()
        }
    }

    /// Returns true if the ticket matches the filter part of this query.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(user_id) = self.user_id {
            if ticket.requester.user_id != user_id {
                return false;
            }
        }

        if let Some(topic_id) = self.topic_id {
            if ticket.topic_id != Some(topic_id) {
                return false;
            }
        }

        if !self.statuses.is_empty() && !self.statuses.contains(&ticket.status) {
            return false;
        }

        if self.requires_topic && ticket.topic_id.is_none() {
            return false;
        }

        if let Some(due_by) = self.deletion_due_by {
            match ticket.topic_deletion_scheduled_at {
                Some(at) if at <= due_by => {}
                _ => return false,
            }
        }

        true
    }

    /// Filters, sorts and pages a candidate set.
    pub fn apply<'a, I>(&self, tickets: I) -> Vec<Ticket>
    where
        I: IntoIterator<Item = &'a Ticket>,
    {
        let mut matched: Vec<&Ticket> = tickets.into_iter().filter(|t| self.matches(t)).collect();

        match self.sort {
            TicketSort::NewestFirst => matched.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.ticket_id.cmp(&a.ticket_id))
            }),
            TicketSort::UnreadThenRecent => matched.sort_by(|a, b| {
                b.has_unread_messages
                    .cmp(&a.has_unread_messages)
                    .then_with(|| b.last_message_at.cmp(&a.last_message_at))
            }),
            TicketSort::RecentlyClosed => matched.sort_by(|a, b| {
                b.closed_at
                    .cmp(&a.closed_at)
                    .then_with(|| b.ticket_id.cmp(&a.ticket_id))
            }),
            TicketSort::DeletionDue => matched.sort_by(|a, b| {
                a.topic_deletion_scheduled_at
                    .cmp(&b.topic_deletion_scheduled_at)
                    .then_with(|| a.ticket_id.cmp(&b.ticket_id))
            }),
        }

        matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
