//! Core data models for ticketdesk.
//!
//! This crate provides the types shared by every layer: the ticket aggregate
//! with its embedded transcript, media descriptors, the normalized inbound
//! content decoded from the transport, the category taxonomy and the FAQ
//! entries the user bot answers from.

pub mod category;
pub mod faq;
pub mod ids;
pub mod inbound;
pub mod media;
pub mod message;
pub mod technician;
pub mod ticket;

// Re-export main types
pub use category::{category_labels, Category};
pub use faq::{Faq, DEFAULT_FAQ_CATEGORY};
pub use ids::{MessageId, TicketId, TICKET_PREFIX};
pub use inbound::{InboundContent, InboundMedia, MEDIA_PLACEHOLDER};
pub use media::{MediaAttachment, MediaKind};
pub use message::{MessageSender, TechnicianRef, TicketMessage};
pub use technician::Technician;
pub use ticket::{ClosurePending, Rating, Requester, Ticket, TicketStatus};
