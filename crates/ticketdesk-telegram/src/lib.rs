//! Telegram adapter for ticketdesk.
//!
//! Runs the user-facing bot and the technician bot on top of the ticket
//! engine. When no separate technician token is configured a single bot
//! serves both sides.
//!
//! # Commands
//!
//! User bot:
//! - `/start` - Welcome message
//! - `/help` - Show available commands
//! - `/status` - Show the open ticket
//!
//! Technician bot:
//! - `/id` - Show chat, thread and user ids
//! - `/link <code>` - Link a dashboard session
//! - `/list` - List open tickets
//! - `/close`, `/escalate [reason]` - Act on the ticket of the current thread
//! - `/reopen <ticketId>` - Reopen a closed ticket

pub mod bot;
pub mod decode;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod keyboards;
pub mod state;

pub use bot::HelpdeskBot;
pub use error::{Result, TelegramError};
pub use gateway::TelegramGateway;
pub use state::{BotContext, SharedContext};
