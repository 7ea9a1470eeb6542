//! Persistence layer for ticketdesk.
//!
//! Tickets live behind the [`TicketStore`] trait. Two backends ship with the
//! crate: [`MemoryTicketStore`] for tests and ephemeral runs, and
//! [`FileTicketStore`], which keeps one JSON document per ticket and writes
//! them atomically (temp file, then rename). Both allocate ticket ids from an
//! atomic counter and reject stale writes with
//! [`PersistenceError::Conflict`].
//!
//! # Example
//!
//! ```no_run
//! use ticketdesk_persistence::{FileTicketStore, TicketStore};
//! use ticketdesk_models::{Requester, Ticket};
//!
//! # async fn demo() -> ticketdesk_persistence::Result<()> {
//! let store = FileTicketStore::open("/var/lib/ticketdesk").await?;
//! let id = store.next_ticket_id().await?;
//! let ticket = store.insert(&Ticket::new(id, Requester::new(42), "help")).await?;
//! assert_eq!(ticket.version, 1);
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod error;
pub mod faq_store;
pub mod file_store;
pub mod query;
pub mod technician_store;
pub mod ticket_store;

pub use error::{PersistenceError, Result};
pub use faq_store::{FaqStore, FAQ_SEARCH_LIMIT};
pub use file_store::FileTicketStore;
pub use query::{TicketQuery, TicketSort};
pub use technician_store::TechnicianStore;
pub use ticket_store::{MemoryTicketStore, TicketStore};
