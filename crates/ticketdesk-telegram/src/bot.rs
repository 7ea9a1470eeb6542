//! Dispatcher setup for one bot identity.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::error::{Result, TelegramError};
use crate::handlers::{
    handle_callback, handle_message, handle_tech_command, handle_user_command, TechCommand,
    UserCommand,
};
use crate::state::{BotContext, SharedContext};

/// A teloxide bot bound to a [`BotContext`].
pub struct HelpdeskBot {
    bot: Bot,
    context: SharedContext,
}

impl HelpdeskBot {
    pub fn new(bot: Bot, context: BotContext) -> Self {
        Self {
            bot,
            context: Arc::new(context),
        }
    }

    /// Get the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TelegramError::BotStartFailed(e.to_string()))?;
        Ok(me.username().to_string())
    }

    /// Runs long polling until Ctrl+C.
    pub async fn run(self) {
        let role = self.context.role;
        info!(role = ?role, "Starting bot in polling mode");

        let handler = dptree::entry()
            .branch(Update::filter_callback_query().endpoint(handle_callback))
            .branch(
                Update::filter_message()
                    .branch(
                        dptree::filter(|msg: Message, ctx: SharedContext| {
                            ctx.accepts_user_commands(&msg)
                        })
                        .filter_command::<UserCommand>()
                        .endpoint(handle_user_command),
                    )
                    .branch(
                        dptree::filter_async(|msg: Message, ctx: SharedContext| async move {
                            ctx.accepts_tech_commands(&msg).await
                        })
                        .filter_command::<TechCommand>()
                        .endpoint(handle_tech_command),
                    )
                    .branch(dptree::endpoint(handle_message)),
            );

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.context])
            .default_handler(|upd| async move {
                warn!("Unhandled update: {:?}", upd.kind);
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!(role = ?role, "Bot stopped");
    }
}
