//! REST API for the ticketdesk web dashboard.
//!
//! This crate exposes the ticket engine over HTTP:
//! - Open queue and paged archive
//! - Ticket detail, read marking, replies and media uploads
//! - Close, escalate and reopen
//! - FAQ entry management
//! - Technician link codes, password login and session tokens
//!
//! Ticket and FAQ routes need a credential: an `Authorization: Bearer` session token
//! or the `X-Telegram-Init-Data` of the Telegram Web App. The caller must
//! also be a configured or linked technician (401 without a valid
//! credential, 403 for anyone else).
//!
//! # Example
//!
//! ```ignore
//! use ticketdesk_api::{serve, ApiConfig, AppState};
//!
//! let config = ApiConfig::from_settings(&helpdesk.api);
//! let sessions = Arc::new(SessionSigner::from_config(&helpdesk.auth));
//! let state = AppState::new(config.clone(), engine, link_codes, sessions);
//! serve(config, state).await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod types;

pub use config::ApiConfig;
pub use error::{ApiError, Result};
pub use router::{create_router, serve};
pub use state::{AppState, Technician};
