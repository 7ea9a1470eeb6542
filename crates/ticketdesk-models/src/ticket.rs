//! The ticket aggregate.
//!
//! A ticket owns its full transcript. Status controls routing: only tickets in
//! the active set receive new user messages, and closed tickets never receive
//! appends through normal routing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::TicketId;
use crate::message::{MessageSender, TechnicianRef, TicketMessage};

const MAX_DELETION_BACKOFF_HOURS: i64 = 24;

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting for a technician.
    #[default]
    Open,
    /// A technician has replied.
    InProgress,
    /// Handed to the level-2 pool.
    Escalated,
    /// Resolved. Terminal for routing purposes.
    Closed,
}

impl TicketStatus {
    /// Statuses considered "active" for the one-ticket-per-user rule.
    pub fn active_set(include_escalated: bool) -> Vec<TicketStatus> {
        if include_escalated {
            vec![
                TicketStatus::Open,
                TicketStatus::InProgress,
                TicketStatus::Escalated,
            ]
        } else {
            vec![TicketStatus::Open, TicketStatus::InProgress]
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Escalated => "escalated",
            TicketStatus::Closed => "closed",
        }
    }

    /// Emoji badge used in listings.
    pub fn badge(&self) -> &'static str {
        match self {
            TicketStatus::Open => "🟢",
            TicketStatus::InProgress => "🟡",
            TicketStatus::Escalated => "🔴",
            TicketStatus::Closed => "⚫",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The person who opened the ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl Requester {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_names(
        mut self,
        first_name: Option<String>,
        last_name: Option<String>,
        username: Option<String>,
    ) -> Self {
        self.first_name = first_name;
        self.last_name = last_name;
        self.username = username;
        self
    }

    /// First name, else username, else the numeric id.
    pub fn short_name(&self) -> String {
        self.first_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("User {}", self.user_id))
    }

    /// "First Last", falling back to `short_name`.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) if !last.trim().is_empty() => format!("{} {}", first, last),
            _ => self.short_name(),
        }
    }
}

/// A rating left by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub stars: u8,
    pub rated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Rating {
    pub const MIN_STARS: u8 = 1;
    pub const MAX_STARS: u8 = 5;

    /// Returns true if `stars` is within 1..=5.
    pub fn is_valid_stars(stars: u8) -> bool {
        (Self::MIN_STARS..=Self::MAX_STARS).contains(&stars)
    }

    /// `★★★☆☆` rendering.
    pub fn stars_display(&self) -> String {
        let filled = usize::from(self.stars.min(Self::MAX_STARS));
        let empty = usize::from(Self::MAX_STARS) - filled;
        format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
    }
}

/// Marker persisted while closure waits for categorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosurePending {
    pub requested_by: TechnicianRef,
    pub requested_at: DateTime<Utc>,
}

/// A support ticket and its transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,

    pub requester: Requester,

    #[serde(default)]
    pub status: TicketStatus,

    /// Thread in the technician group bound to this ticket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_group_chat_id: Option<i64>,

    /// Append-only transcript.
    #[serde(default)]
    pub messages: Vec<TicketMessage>,

    pub initial_message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorized_by: Option<TechnicianRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorized_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure_pending: Option<ClosurePending>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_topic_id: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_topic_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_deletion_scheduled_at: Option<DateTime<Utc>>,

    /// Failed deletion attempts since the last schedule.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub topic_deletion_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_deleted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub has_unread_messages: bool,

    pub last_message_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub version: u64,
}

impl Ticket {
    /// Creates an open ticket with an empty transcript.
    pub fn new(ticket_id: TicketId, requester: Requester, initial_message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            ticket_id,
            requester,
            status: TicketStatus::Open,
            topic_id: None,
            topic_name: None,
            tech_group_chat_id: None,
            messages: Vec::new(),
            initial_message: initial_message.into(),
            assigned_to: None,
            assigned_to_name: None,
            rating: None,
            categories: Vec::new(),
            categorized_by: None,
            categorized_at: None,
            closure_pending: None,
            escalated_at: None,
            escalation_reason: None,
            archived_at: None,
            archive_topic_id: None,
            archive_topic_name: None,
            topic_deletion_scheduled_at: None,
            topic_deletion_attempts: 0,
            topic_deleted_at: None,
            has_unread_messages: false,
            last_message_at: now,
            created_at: now,
            updated_at: now,
            closed_at: None,
            version: 0,
        }
    }

    /// Returns true once the ticket is closed.
    pub fn is_closed(&self) -> bool {
        self.status == TicketStatus::Closed
    }

    /// Returns true if the status is in the given active set.
    pub fn is_active_in(&self, active: &[TicketStatus]) -> bool {
        active.contains(&self.status)
    }

    /// Appends a transcript entry and updates activity bookkeeping.
    pub fn push_message(&mut self, message: TicketMessage) {
        if message.from == MessageSender::User {
            self.has_unread_messages = true;
        }
        if message.from != MessageSender::System {
            self.last_message_at = message.timestamp;
        }
        self.messages.push(message);
        self.touch();
    }

    /// Assigns the technician if nobody holds the ticket. Returns true if assigned.
    pub fn assign_if_unset(&mut self, technician: &TechnicianRef) -> bool {
        if self.assigned_to.is_some() {
            return false;
        }
        self.assigned_to = Some(technician.id);
        self.assigned_to_name = Some(technician.name.clone());
        self.touch();
        true
    }

    /// Clears the assignment.
    pub fn unassign(&mut self) {
        self.assigned_to = None;
        self.assigned_to_name = None;
        self.touch();
    }

    /// Marks every user message as read.
    pub fn mark_read(&mut self) {
        for msg in self
            .messages
            .iter_mut()
            .filter(|m| m.from == MessageSender::User)
        {
            msg.is_read = true;
        }
        self.has_unread_messages = false;
        self.touch();
    }

    /// Number of unread user messages.
    pub fn unread_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.from == MessageSender::User && !m.is_read)
            .count()
    }

    /// Clears the routing thread.
    pub fn clear_topic(&mut self) {
        self.topic_id = None;
        self.topic_name = None;
        self.topic_deletion_attempts = 0;
        self.touch();
    }

    /// Schedules thread deletion at `at` and resets the retry count.
    pub fn schedule_topic_deletion(&mut self, at: Option<DateTime<Utc>>) {
        self.topic_deletion_scheduled_at = at;
        self.topic_deletion_attempts = 0;
        self.touch();
    }

    /// Pushes a failed deletion back: 1h, 2h, 4h and so on, capped at 24h.
    pub fn defer_topic_deletion(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.topic_deletion_attempts = self.topic_deletion_attempts.saturating_add(1);
        let exponent = self.topic_deletion_attempts.saturating_sub(1).min(5);
        let hours = (1i64 << exponent).min(MAX_DELETION_BACKOFF_HOURS);
        let next = now + chrono::Duration::hours(hours);
        self.topic_deletion_scheduled_at = Some(next);
        self.touch();
        next
    }

    /// Adds or removes a category id, keeping insertion order. Returns true if now selected.
    pub fn toggle_category(&mut self, category_id: &str) -> bool {
        let selected = if let Some(pos) = self.categories.iter().position(|c| c == category_id) {
            self.categories.remove(pos);
            false
        } else {
            self.categories.push(category_id.to_string());
            true
        };
        self.touch();
        selected
    }

    /// Updates `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::InboundContent;

    fn ticket() -> Ticket {
        Ticket::new(
            TicketId::from_sequence(1),
            Requester::new(42).with_names(Some("Bob".into()), None, Some("bobby".into())),
            "My printer is broken.",
        )
    }

    #[test]
    fn test_new_ticket_defaults() {
        let t = ticket();
        assert_eq!(t.status, TicketStatus::Open);
        assert!(t.messages.is_empty());
        assert!(t.topic_id.is_none());
        assert_eq!(t.version, 0);
    }

    #[test]
    fn test_deletion_backoff_doubles_and_caps() {
        let mut t = ticket();
        let now = Utc::now();
        t.schedule_topic_deletion(Some(now));

        assert_eq!(t.defer_topic_deletion(now), now + chrono::Duration::hours(1));
        assert_eq!(t.defer_topic_deletion(now), now + chrono::Duration::hours(2));
        assert_eq!(t.defer_topic_deletion(now), now + chrono::Duration::hours(4));
        for _ in 0..10 {
            t.defer_topic_deletion(now);
        }
        assert_eq!(t.topic_deletion_scheduled_at, Some(now + chrono::Duration::hours(24)));

        t.schedule_topic_deletion(None);
        assert_eq!(t.topic_deletion_attempts, 0);
    }

    #[test]
    fn test_active_set() {
        assert!(TicketStatus::active_set(true).contains(&TicketStatus::Escalated));
        assert!(!TicketStatus::active_set(false).contains(&TicketStatus::Escalated));
        assert!(!TicketStatus::active_set(true).contains(&TicketStatus::Closed));
    }

    #[test]
    fn test_push_user_message_marks_unread() {
        let mut t = ticket();
        t.push_message(TicketMessage::user(&InboundContent::text("hi"), Some(1)));
        assert!(t.has_unread_messages);
        assert_eq!(t.unread_count(), 1);

        t.mark_read();
        assert!(!t.has_unread_messages);
        assert_eq!(t.unread_count(), 0);
    }

    #[test]
    fn test_assign_first_writer_wins() {
        let mut t = ticket();
        assert!(t.assign_if_unset(&TechnicianRef::new(1, "Ana")));
        assert!(!t.assign_if_unset(&TechnicianRef::new(2, "Carl")));
        assert_eq!(t.assigned_to, Some(1));
        assert_eq!(t.assigned_to_name.as_deref(), Some("Ana"));

        t.unassign();
        assert!(t.assign_if_unset(&TechnicianRef::new(2, "Carl")));
        assert_eq!(t.assigned_to, Some(2));
    }

    #[test]
    fn test_toggle_category_keeps_order() {
        let mut t = ticket();
        assert!(t.toggle_category("network"));
        assert!(t.toggle_category("hardware"));
        assert!(!t.toggle_category("network"));
        assert_eq!(t.categories, vec!["hardware".to_string()]);
    }

    #[test]
    fn test_requester_names() {
        let r = Requester::new(5);
        assert_eq!(r.short_name(), "User 5");
        let r = r.with_names(Some("Ada".into()), Some("Lovelace".into()), None);
        assert_eq!(r.display_name(), "Ada Lovelace");
        assert_eq!(r.short_name(), "Ada");
    }

    #[test]
    fn test_rating_display() {
        let rating = Rating {
            stars: 3,
            rated_at: Utc::now(),
            comment: None,
        };
        assert_eq!(rating.stars_display(), "★★★☆☆");
        assert!(Rating::is_valid_stars(1));
        assert!(!Rating::is_valid_stars(0));
        assert!(!Rating::is_valid_stars(6));
    }

    #[test]
    fn test_ticket_json_roundtrip_keeps_status_name() {
        let mut t = ticket();
        t.status = TicketStatus::InProgress;
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["ticket_id"], "TICK-0001");
        let back: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, TicketStatus::InProgress);
    }
}
