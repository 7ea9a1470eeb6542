//! JSON-file ticket store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use ticketdesk_models::{Ticket, TicketId};

use crate::atomic::{
    ensure_dir, read_json_dir, read_json_optional, remove_blocking_pool, write_json_blocking_pool,
};
use crate::error::{PersistenceError, Result};
use crate::query::TicketQuery;
use crate::ticket_store::{next_version, TicketStore};

/// Persisted id sequence.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sequence {
    last: u64,
}

/// Manages persistence of tickets as one JSON document per ticket.
///
/// ```text
/// base_path/
/// ├── sequence.json
/// └── tickets/
///     ├── TICK-0001.json
///     └── TICK-0002.json
/// ```
///
/// All documents are loaded into a cache on open; writes go through the
/// cache lock and are persisted before the lock is released.
pub struct FileTicketStore {
    base_path: PathBuf,
    sequence: Mutex<u64>,
    tickets: RwLock<HashMap<TicketId, Ticket>>,
}

impl FileTicketStore {
    /// Opens (or creates) a store rooted at `base_path`.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        ensure_dir(&base_path.join("tickets"))?;

        let mut tickets = HashMap::new();
        for (path, ticket) in read_json_dir::<Ticket>(&base_path.join("tickets"))? {
            debug!(path = %path.display(), "Loaded ticket");
            tickets.insert(ticket.ticket_id.clone(), ticket);
        }

        let stored = read_json_optional::<Sequence>(&Self::sequence_path_in(&base_path))?
            .unwrap_or_default()
            .last;
        let highest = tickets.keys().filter_map(TicketId::sequence).max().unwrap_or(0);
        if highest > stored {
            warn!(stored, highest, "Sequence file behind stored tickets; advancing");
        }

        info!(path = %base_path.display(), count = tickets.len(), "Ticket store opened");

        Ok(Self {
            base_path,
            sequence: Mutex::new(stored.max(highest)),
            tickets: RwLock::new(tickets),
        })
    }

    fn sequence_path_in(base: &Path) -> PathBuf {
        base.join("sequence.json")
    }

    fn ticket_path(&self, id: &TicketId) -> PathBuf {
        self.base_path.join("tickets").join(format!("{}.json", id))
    }
}

#[async_trait]
impl TicketStore for FileTicketStore {
    async fn next_ticket_id(&self) -> Result<TicketId> {
        let mut last = self.sequence.lock().await;
        let next = *last + 1;
        write_json_blocking_pool(
            Self::sequence_path_in(&self.base_path),
            &Sequence { last: next },
        )
        .await?;
        *last = next;
        Ok(TicketId::from_sequence(next))
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
        write_json_blocking_pool(self.ticket_path(&stored.ticket_id), &stored).await?;
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
        write_json_blocking_pool(self.ticket_path(&next.ticket_id), &next).await?;
        tickets.insert(next.ticket_id.clone(), next.clone());
        Ok(next)
    }

    async fn delete(&self, id: &TicketId) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        remove_blocking_pool(self.ticket_path(id)).await?;
        tickets.remove(id);
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
