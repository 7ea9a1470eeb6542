//! The ticket store contract and its in-memory backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use ticketdesk_models::{Ticket, TicketId};

use crate::error::{PersistenceError, Result};
use crate::query::TicketQuery;

/// Durable collection of tickets.
///
/// Writes are guarded by an optimistic version check: `replace` only succeeds
/// if the stored document still carries the version the caller read.
/// Implementations bump `version` on every successful write and return the
/// stored copy.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Allocates the next ticket identifier from an atomic counter.
    async fn next_ticket_id(&self) -> Result<TicketId>;

    /// Inserts a new ticket. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, ticket: &Ticket) -> Result<Ticket>;

    /// Loads a ticket by id.
    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>>;

    /// Replaces a ticket if its version matches the stored one.
    async fn replace(&self, ticket: &Ticket) -> Result<Ticket>;

    /// Removes a ticket. Missing tickets are not an error.
    async fn delete(&self, id: &TicketId) -> Result<()>;

    /// Runs a query.
    async fn find(&self, query: &TicketQuery) -> Result<Vec<Ticket>>;

    /// Counts tickets matching the filter part of a query.
    async fn count(&self, query: &TicketQuery) -> Result<usize>;

    /// Loads a ticket, failing with `NotFound` when absent.
    async fn require(&self, id: &TicketId) -> Result<Ticket> {
        self.get(id)
            .await?
            .ok_or_else(|| PersistenceError::ticket_not_found(id))
    }

    /// First result of a query.
    async fn find_one(&self, query: &TicketQuery) -> Result<Option<Ticket>> {
        Ok(self.find(query).await?.into_iter().next())
    }
}

/// Checks the optimistic version and returns the next stored copy.
pub(crate) fn next_version(stored: &Ticket, incoming: &Ticket) -> Result<Ticket> {
    if stored.version != incoming.version {
        return Err(PersistenceError::Conflict {
            id: incoming.ticket_id.to_string(),
            expected: incoming.version,
            found: stored.version,
        });
    }
    let mut next = incoming.clone();
    next.version = stored.version + 1;
    Ok(next)
}

/// Ticket store held entirely in memory.
///
/// Used by tests and by deployments that do not need durability.
#[derive(Default)]
pub struct MemoryTicketStore {
    counter: AtomicU64,
    tickets: RwLock<HashMap<TicketId, Ticket>>,
}

impl MemoryTicketStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tickets.
    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    /// Returns true if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn next_ticket_id(&self) -> Result<TicketId> {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TicketId::from_sequence(seq))
    }

    async fn insert(&self, ticket: &Ticket) -> Result<Ticket> {
        let mut tickets = self.tickets.write().await;
        if tickets.contains_key(&ticket.ticket_id) {
            return Err(PersistenceError::AlreadyExists {
                kind: "ticket".to_string(),
                id: ticket.ticket_id.to_string(),
            });
        }
        let mut stored = ticket.clone();
        stored.version = 1;
        tickets.insert(stored.ticket_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &TicketId) -> Result<Option<Ticket>> {
        Ok(self.tickets.read().await.get(id).cloned())
    }

    async fn replace(&self, ticket: &Ticket) -> Result<Ticket> {
        let mut tickets = self.tickets.write().await;
        let stored = tickets
            .get(&ticket.ticket_id)
            .ok_or_else(|| PersistenceError::ticket_not_found(&ticket.ticket_id))?;
        let next = next_version(stored, ticket)?;
        tickets.insert(next.ticket_id.clone(), next.clone());
        Ok(next)
    }

    async fn delete(&self, id: &TicketId) -> Result<()> {
        self.tickets.write().await.remove(id);
        Ok(())
    }

    async fn find(&self, query: &TicketQuery) -> Result<Vec<Ticket>> {
        Ok(query.apply(self.tickets.read().await.values()))
    }

    async fn count(&self, query: &TicketQuery) -> Result<usize> {
        let tickets = self.tickets.read().await;
        Ok(tickets.values().filter(|t| query.matches(t)).count())
    }
}
