//! Ticket lifecycle core for ticketdesk.
//!
//! This crate holds everything that does not depend on a chat transport:
//! - `Engine` - every ticket state transition and its side effects
//! - `Router` - classifies inbound events and dispatches them to the engine
//! - `Archiver` - replays closed tickets into the archive group
//! - `CleanupJob` - deletes routing threads once their retention expires
//! - `ExpiringCodes` - short-lived technician link codes
//! - `SessionSigner` - dashboard session tokens and Web App init data checks
//! - `faq` - FAQ menus, answers and search results for the user bot
//!
//! Transports plug in through [`NotificationGateway`]; media storage through
//! [`BlobStore`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ticketdesk_core::{Engine, HelpdeskConfig, Router, InboundEvent};
//! use ticketdesk_models::{InboundContent, Requester};
//!
//! let engine = Arc::new(Engine::new(config, store, technicians, blobs, user_gw, tech_gw));
//! let router = Router::new(Arc::clone(&engine));
//! router
//!     .dispatch(InboundEvent::UserMessage {
//!         requester: Requester::new(42),
//!         content: InboundContent::text("My printer is jammed"),
//!         message_id: Some(1),
//!     })
//!     .await?;
//! ```
//!
//! # Key Concepts
//!
//! ## One active ticket per user
//!
//! The find-or-create path runs under a per-user lock. Whether `escalated`
//! counts as active is configurable.
//!
//! ## Best-effort side effects
//!
//! State is committed first. Sends, uploads and archival afterwards are
//! logged when they fail and never undo the commit.

pub mod archive;
pub mod auth;
pub mod blob;
pub mod cleanup;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod faq;
pub mod gateway;
pub mod linking;
pub mod locks;
pub mod markup;
pub mod router;
pub mod templates;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use archive::{ArchiveError, ArchiveReceipt, Archiver};
pub use auth::{verify_init_data, AuthError, SessionSigner, SessionToken};
pub use blob::{BlobError, BlobStore, FsBlobStore, S3BlobStore};
pub use cleanup::{cleanup_topics, CleanupJob, CleanupReport, CLEANUP_INTERVAL};
pub use codec::{FfmpegTranscoder, VoiceTranscoder};
pub use config::{ConfigError, HelpdeskConfig};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use faq::FaqCallback;
pub use gateway::{
    Destination, GatewayError, GatewayResult, NotificationGateway, OutboundMedia, OutboundText,
};
pub use linking::{ExpiringCodes, IssuedCode, LinkState, RedeemOutcome};
pub use router::{
    classify, BotRole, CallbackResponse, CallbackToken, Dispatched, EventContext, InboundEvent,
    Route, Router,
};
