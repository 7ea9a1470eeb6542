//! State shared by the bot handlers.

use std::sync::Arc;

use teloxide::types::Message;

use ticketdesk_core::{BotRole, Engine, ExpiringCodes, HelpdeskConfig, Router};

use crate::decode;

/// Everything a handler needs, for one bot identity.
#[derive(Clone)]
pub struct BotContext {
    pub role: BotRole,
    pub router: Router,
    pub link_codes: Arc<ExpiringCodes>,
}

impl BotContext {
    pub fn new(role: BotRole, engine: Arc<Engine>, link_codes: Arc<ExpiringCodes>) -> Self {
        Self {
            role,
            router: Router::new(engine),
            link_codes,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        self.router.engine()
    }

    pub fn config(&self) -> &Arc<HelpdeskConfig> {
        self.engine().config()
    }

    /// User commands are served in private chats by the user-facing identity.
    pub fn accepts_user_commands(&self, msg: &Message) -> bool {
        matches!(self.role, BotRole::User | BotRole::Shared) && msg.chat.is_private()
    }

    /// Technician commands are served by the technician identity. The
    /// technician group is trusted as a whole; in private chats the sender
    /// must be a configured or linked technician.
    pub async fn accepts_tech_commands(&self, msg: &Message) -> bool {
        if !matches!(self.role, BotRole::Technician | BotRole::Shared) {
            return false;
        }
        if msg.chat.id.0 == self.config().groups.technician_group_id {
            return true;
        }
        match msg.from.as_ref() {
            Some(user) if msg.chat.is_private() => {
                self.engine().is_technician(decode::user_id(user)).await
            }
            _ => false,
        }
    }
}

/// Shared reference passed to the dispatcher.
pub type SharedContext = Arc<BotContext>;
