//! Identifier types for tickets and transcript entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix shared by every ticket identifier.
pub const TICKET_PREFIX: &str = "TICK-";

/// Human-facing ticket identifier, `TICK-0001`.
///
/// Identifiers are derived from a monotonically increasing sequence number,
/// zero-padded to four digits. Sequences past 9999 keep all of their digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Builds the identifier for a sequence number.
    pub fn from_sequence(seq: u64) -> Self {
        Self(format!("{}{:04}", TICKET_PREFIX, seq))
    }

    /// Wraps an existing string without validating it.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Parses a user-supplied identifier into its canonical form.
    ///
    /// Lowercase input and any zero padding are accepted: `tick-1`,
    /// `TICK-0001` and `TICK-00001` all name the same ticket.
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let digits = upper.strip_prefix(TICKET_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self::from_sequence)
    }

    /// Returns the numeric suffix, if the identifier is well formed.
    pub fn sequence(&self) -> Option<u64> {
        self.0.strip_prefix(TICKET_PREFIX)?.parse().ok()
    }

    /// Returns the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Ord for TicketId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence()
            .cmp(&other.sequence())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for TicketId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TicketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TicketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a new random ID.
    pub fn new() -> Self {
        Self(format!("msg-{}", Uuid::new_v4()))
    }

    /// Returns the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_id_padding() {
        assert_eq!(TicketId::from_sequence(1).as_str(), "TICK-0001");
        assert_eq!(TicketId::from_sequence(42).as_str(), "TICK-0042");
        assert_eq!(TicketId::from_sequence(12345).as_str(), "TICK-12345");
    }

    #[test]
    fn test_ticket_id_sequence() {
        assert_eq!(TicketId::from_sequence(7).sequence(), Some(7));
        assert_eq!(TicketId::from_string("garbage").sequence(), None);
    }

    #[test]
    fn test_ticket_id_parse() {
        assert_eq!(
            TicketId::parse(" tick-0003 "),
            Some(TicketId::from_sequence(3))
        );
        assert_eq!(TicketId::parse("TICK-1"), Some(TicketId::from_sequence(1)));
        assert_eq!(TicketId::parse("tick-00012"), Some(TicketId::from_sequence(12)));
        assert_eq!(TicketId::parse("TICK-12345").unwrap().as_str(), "TICK-12345");
        assert!(TicketId::parse("TICK-").is_none());
        assert!(TicketId::parse("TICK-99999999999999999999999").is_none());
        assert!(TicketId::parse("TICK-12a").is_none());
        assert!(TicketId::parse("0003").is_none());
    }

    #[test]
    fn test_ticket_id_ordering_follows_sequence() {
        assert!(TicketId::from_sequence(9) < TicketId::from_sequence(10));
        assert!(TicketId::from_sequence(9999) < TicketId::from_sequence(10000));
    }

    #[test]
    fn test_message_id_prefix() {
        let id = MessageId::new();
        assert!(id.as_str().starts_with("msg-"));
        assert_ne!(id, MessageId::new());
    }

    #[test]
    fn test_ticket_id_serializes_transparently() {
        let json = serde_json::to_string(&TicketId::from_sequence(5)).unwrap();
        assert_eq!(json, "\"TICK-0005\"");
    }
}
