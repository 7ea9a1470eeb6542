//! Command, message and callback handlers.

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message, MessageId, ParseMode, ReactionType, ThreadId};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use ticketdesk_core::engine::{CloseOutcome, Delivery, TechnicianReplyOutcome, UserMessageOutcome};
use ticketdesk_core::markup::{escape, format_date};
use ticketdesk_core::gateway::TextFormat;
use ticketdesk_core::{
    classify, faq, templates, CallbackToken, Dispatched, EngineError, InboundEvent, OutboundText,
    RedeemOutcome, Route,
};
use ticketdesk_models::{Technician, TicketId};

use crate::decode;
use crate::keyboards::to_markup;
use crate::state::SharedContext;

/// Tickets listed by `/list`.
const LIST_LIMIT: usize = 20;

/// Tickets listed by `/mytickets`.
const MY_TICKETS_LIMIT: usize = 10;

/// Commands of the user-facing bot.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum UserCommand {
    #[command(description = "Start the bot")]
    Start,

    #[command(description = "Show help message")]
    Help,

    #[command(description = "Show your open ticket")]
    Status,

    #[command(description = "My recent tickets")]
    MyTickets,

    #[command(description = "Browse FAQs, or search them: /faq <words>")]
    Faq(String),
}

/// Commands of the technician bot.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Technician commands:")]
pub enum TechCommand {
    #[command(description = "Show help message")]
    Help,

    #[command(description = "Show chat, thread and user ids")]
    Id,

    #[command(description = "Link your account to the dashboard: /link <code> (from the technician group)")]
    Link(String),

    #[command(description = "List open tickets")]
    List,

    #[command(description = "Close the ticket of this thread")]
    Close,

    #[command(description = "Reopen a closed ticket: /reopen <ticketId>")]
    Reopen(String),

    #[command(description = "Escalate the ticket of this thread: /escalate [reason]")]
    Escalate(String),
}

const WELCOME: &str = "👋 <b>Welcome to the Help Desk!</b>\n\n\
     Describe your problem in a message and a support ticket will be created.\n\
     A technician will answer right here.\n\n\
     Photos, documents and voice notes are welcome too.\n\
     Use /status to check your ticket, /mytickets for your history\n\
     and /faq for answers to common questions.";

const NO_THREAD_TICKET: &str = "This thread is not linked to an open ticket.";

/// Text shown to a chat participant for an engine failure.
pub fn error_text(err: &EngineError) -> String {
    match err {
        EngineError::Validation(msg) | EngineError::InvalidState(msg) => msg.clone(),
        EngineError::NotFound(id) => format!("Ticket {} not found.", id),
        EngineError::NoEscalationPool => "No level-2 technicians are configured.".to_string(),
        _ => "Something went wrong. Please try again later.".to_string(),
    }
}

/// Sends HTML into the chat (and thread) a message came from.
async fn reply_html(bot: &Bot, msg: &Message, text: impl Into<String>) -> ResponseResult<Message> {
    let mut req = bot
        .send_message(msg.chat.id, text.into())
        .parse_mode(ParseMode::Html);
    if let Some(thread) = decode::thread_id(msg) {
        req = req.message_thread_id(ThreadId(MessageId(thread)));
    }
    req.await
}

/// Sends an engine-built message, keyboard included, into the chat of `msg`.
async fn reply_outbound(bot: &Bot, msg: &Message, out: OutboundText) -> ResponseResult<Message> {
    let mut req = bot.send_message(msg.chat.id, out.text);
    if out.format == TextFormat::Html {
        req = req.parse_mode(ParseMode::Html);
    }
    if let Some(keyboard) = &out.keyboard {
        req = req.reply_markup(to_markup(keyboard));
    }
    req.await
}

// ---- user bot ----

pub async fn handle_user_command(
    bot: Bot,
    msg: Message,
    cmd: UserCommand,
    ctx: SharedContext,
) -> ResponseResult<()> {
    match cmd {
        UserCommand::Start => {
            reply_html(&bot, &msg, WELCOME).await?;
            info!(chat_id = %msg.chat.id, "User started bot");
        }
        UserCommand::Help => {
            bot.send_message(msg.chat.id, UserCommand::descriptions().to_string())
                .await?;
        }
        UserCommand::Status => {
            let Some(user) = msg.from.as_ref() else {
                return Ok(());
            };
            let text = match ctx
                .engine()
                .find_active_ticket_for_user(decode::user_id(user))
                .await
            {
                Ok(Some(ticket)) => format!(
                    "🎫 <b>Ticket {}</b>\n\nStatus: {} {}\nOpened: {}\nMessages: {}",
                    ticket.ticket_id,
                    ticket.status.badge(),
                    ticket.status,
                    format_date(&ticket.created_at),
                    ticket.messages.len(),
                ),
                Ok(None) => "You have no open tickets. Send a message to create one.".to_string(),
                Err(e) => {
                    error!(error = %e, "Failed to look up ticket status");
                    error_text(&e)
                }
            };
            reply_html(&bot, &msg, text).await?;
        }
        UserCommand::MyTickets => {
            let Some(user) = msg.from.as_ref() else {
                return Ok(());
            };
            let text = match ctx
                .engine()
                .recent_tickets_for_user(decode::user_id(user), MY_TICKETS_LIMIT)
                .await
            {
                Ok(tickets) => templates::my_tickets(&tickets),
                Err(e) => {
                    error!(error = %e, "Failed to list user tickets");
                    error_text(&e)
                }
            };
            reply_html(&bot, &msg, text).await?;
        }
        UserCommand::Faq(query) => {
            let faqs = ctx.engine().faqs();
            let query = query.trim();
            let out = if query.is_empty() {
                faq::menu(&faqs.categories().await)
                    .unwrap_or_else(|| OutboundText::plain(faq::NO_FAQS))
            } else {
                faq::search_results(query, &faqs.search(query).await)
            };
            reply_outbound(&bot, &msg, out).await?;
            info!(chat_id = %msg.chat.id, searched = !query.is_empty(), "FAQ requested");
        }
    }
    Ok(())
}

// ---- technician bot ----

pub async fn handle_tech_command(
    bot: Bot,
    msg: Message,
    cmd: TechCommand,
    ctx: SharedContext,
) -> ResponseResult<()> {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let actor = decode::technician(&user);
    let engine = ctx.engine();

    match cmd {
        TechCommand::Help => {
            reply_html(&bot, &msg, escape(&TechCommand::descriptions().to_string())).await?;
        }
        TechCommand::Id => {
            let mut text = format!(
                "Chat ID: <code>{}</code>\nYour ID: <code>{}</code>",
                msg.chat.id, actor.id
            );
            if let Some(thread) = decode::thread_id(&msg) {
                text.push_str(&format!("\nThread ID: <code>{}</code>", thread));
            }
            reply_html(&bot, &msg, text).await?;
        }
        TechCommand::Link(code) => {
            let code = code.trim();
            if code.is_empty() {
                reply_html(&bot, &msg, "Usage: <code>/link CODE</code>").await?;
                return Ok(());
            }
            let text = match ctx.link_codes.redeem(code, actor.clone()) {
                RedeemOutcome::Linked => {
                    if let Err(e) = engine
                        .technicians()
                        .upsert(Technician::new(actor.id, actor.name.clone()))
                        .await
                    {
                        warn!(error = %e, technician = actor.id, "Failed to save technician");
                    }
                    info!(technician = actor.id, "Technician linked");
                    "✅ Linked. You can continue in the dashboard.".to_string()
                }
                RedeemOutcome::AlreadyLinked => "This code has already been used.".to_string(),
                RedeemOutcome::Expired => "This code has expired. Request a new one.".to_string(),
                RedeemOutcome::Unknown => "Unknown code.".to_string(),
            };
            reply_html(&bot, &msg, text).await?;
        }
        TechCommand::List => {
            let text = match engine.open_queue(LIST_LIMIT).await {
                Ok(tickets) if tickets.is_empty() => "No open tickets.".to_string(),
                Ok(tickets) => {
                    let lines: Vec<String> = tickets.iter().map(templates::ticket_list_line).collect();
                    format!("📋 <b>Open tickets</b>\n\n{}", lines.join("\n"))
                }
                Err(e) => error_text(&e),
            };
            reply_html(&bot, &msg, text).await?;
        }
        TechCommand::Close => {
            let Some(ticket) = thread_ticket(&msg, &ctx).await else {
                reply_html(&bot, &msg, NO_THREAD_TICKET).await?;
                return Ok(());
            };
            match engine.close_ticket(&ticket, actor).await {
                Ok(CloseOutcome::Closed(_)) => {}
                Ok(CloseOutcome::AlreadyClosed(_)) => {
                    reply_html(&bot, &msg, format!("Ticket {} is already closed.", ticket)).await?;
                }
                Ok(CloseOutcome::AwaitingCategorization { prompt, keyboard, .. }) => {
                    let mut req = bot
                        .send_message(msg.chat.id, prompt)
                        .parse_mode(ParseMode::Html)
                        .reply_markup(to_markup(&keyboard));
                    if let Some(thread) = decode::thread_id(&msg) {
                        req = req.message_thread_id(ThreadId(MessageId(thread)));
                    }
                    req.await?;
                }
                Err(e) => {
                    warn!(ticket_id = %ticket, error = %e, "Close failed");
                    reply_html(&bot, &msg, escape(&error_text(&e))).await?;
                }
            }
        }
        TechCommand::Reopen(raw) => {
            let Some(id) = TicketId::parse(&raw) else {
                reply_html(&bot, &msg, "Usage: <code>/reopen TICK-0001</code>").await?;
                return Ok(());
            };
            let text = match engine.reopen_ticket(&id, &actor).await {
                Ok(ticket) => format!("🔓 Ticket {} reopened.", ticket.ticket_id),
                Err(e) => escape(&error_text(&e)),
            };
            reply_html(&bot, &msg, text).await?;
        }
        TechCommand::Escalate(reason) => {
            let Some(ticket) = thread_ticket(&msg, &ctx).await else {
                reply_html(&bot, &msg, NO_THREAD_TICKET).await?;
                return Ok(());
            };
            let reason = Some(reason).filter(|r| !r.trim().is_empty());
            match engine.escalate_ticket(&ticket, reason, &actor).await {
                Ok(outcome) => {
                    if outcome.failed > 0 {
                        reply_html(
                            &bot,
                            &msg,
                            format!("⚠️ {} level-2 technician(s) could not be notified.", outcome.failed),
                        )
                        .await?;
                    }
                }
                Err(e) => {
                    reply_html(&bot, &msg, escape(&error_text(&e))).await?;
                }
            }
        }
    }
    Ok(())
}

/// Ticket bound to the thread the command was sent in.
async fn thread_ticket(msg: &Message, ctx: &SharedContext) -> Option<TicketId> {
    let thread = decode::thread_id(msg)?;
    match ctx.engine().ticket_for_topic(thread).await {
        Ok(ticket) => ticket.map(|t| t.ticket_id),
        Err(e) => {
            warn!(thread_id = thread, error = %e, "Thread lookup failed");
            None
        }
    }
}

// ---- messages ----

/// Routes a non-command message to the engine.
pub async fn handle_message(bot: Bot, msg: Message, ctx: SharedContext) -> ResponseResult<()> {
    let event_ctx = decode::event_context(&msg, ctx.role);
    if event_ctx.is_command {
        if event_ctx.is_private {
            let text = msg.text().unwrap_or_default();
            bot.send_message(
                msg.chat.id,
                format!(
                    "Unknown command: {}\n\nUse /help to see available commands.",
                    text.split_whitespace().next().unwrap_or(text)
                ),
            )
            .await?;
        }
        return Ok(());
    }

    let Some(user) = msg.from.clone() else {
        return Ok(());
    };

    match classify(&event_ctx, ctx.config()) {
        Route::Ignore => {
            debug!(chat_id = %msg.chat.id, "Ignoring message");
            Ok(())
        }
        Route::UserMessage => {
            let Some(content) = decode::content(&msg) else {
                reply_html(
                    &bot,
                    &msg,
                    "Sorry, this type of message is not supported. Please send text, a photo, a document or a voice note.",
                )
                .await?;
                return Ok(());
            };
            let event = InboundEvent::UserMessage {
                requester: decode::requester(&user),
                content,
                message_id: Some(msg.id.0),
            };
            match ctx.router.dispatch(event).await {
                Ok(Dispatched::User(outcome)) => on_user_outcome(&bot, &msg, outcome).await,
                Ok(_) => Ok(()),
                Err(e) => {
                    error!(chat_id = %msg.chat.id, error = %e, "Failed to handle user message");
                    reply_html(&bot, &msg, escape(&error_text(&e))).await?;
                    Ok(())
                }
            }
        }
        Route::TechnicianMessage { topic_id } => {
            let Some(content) = decode::content(&msg) else {
                return Ok(());
            };
            let event = InboundEvent::TechnicianMessage {
                topic_id,
                technician: decode::technician(&user),
                content,
                message_id: Some(msg.id.0),
            };
            match ctx.router.dispatch(event).await {
                Ok(Dispatched::Technician(outcome)) => on_technician_outcome(&bot, &msg, outcome).await,
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!(topic_id, error = %e, "Failed to relay technician message");
                    reply_html(&bot, &msg, format!("⚠️ {}", escape(&error_text(&e)))).await?;
                    Ok(())
                }
            }
        }
    }
}

async fn on_user_outcome(bot: &Bot, msg: &Message, outcome: UserMessageOutcome) -> ResponseResult<()> {
    match outcome {
        UserMessageOutcome::Created(ticket) | UserMessageOutcome::Recreated { ticket, .. } => {
            reply_html(bot, msg, templates::ticket_created(&ticket.ticket_id)).await?;
        }
        UserMessageOutcome::Appended(ticket) => {
            debug!(ticket_id = %ticket.ticket_id, "Message appended");
        }
        UserMessageOutcome::NoActiveTicket => {
            reply_html(
                bot,
                msg,
                "You have no open ticket. Please contact support to open a new one.",
            )
            .await?;
        }
    }
    Ok(())
}

async fn on_technician_outcome(
    bot: &Bot,
    msg: &Message,
    outcome: TechnicianReplyOutcome,
) -> ResponseResult<()> {
    match outcome {
        TechnicianReplyOutcome::NoTicket => {
            debug!(chat_id = %msg.chat.id, "Thread has no open ticket");
        }
        TechnicianReplyOutcome::Replied { delivery, .. } => match delivery {
            Delivery::Delivered { .. } => {
                let reacted = bot
                    .set_message_reaction(msg.chat.id, msg.id)
                    .reaction(vec![ReactionType::Emoji {
                        emoji: "👍".to_string(),
                    }])
                    .await;
                if let Err(e) = reacted {
                    debug!(error = %e, "Failed to react to technician message");
                }
            }
            Delivery::Blocked => {
                reply_html(
                    bot,
                    msg,
                    "⚠️ The user has blocked the bot. The message was saved but not delivered.",
                )
                .await?;
            }
            Delivery::Failed(reason) => {
                reply_html(
                    bot,
                    msg,
                    format!("⚠️ Message not delivered: {}", escape(&reason)),
                )
                .await?;
            }
        },
    }
    Ok(())
}

// ---- callbacks ----

pub async fn handle_callback(bot: Bot, q: CallbackQuery, ctx: SharedContext) -> ResponseResult<()> {
    let Some(data) = q.data.clone() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let result = match CallbackToken::parse(&data) {
        Ok(token) => {
            let event = InboundEvent::Callback {
                token,
                actor: decode::technician(&q.from),
            };
            ctx.router.dispatch(event).await
        }
        Err(e) => Err(e),
    };

    let response = match result {
        Ok(Dispatched::Callback(response)) => response,
        Ok(_) => {
            bot.answer_callback_query(q.id.clone()).await?;
            return Ok(());
        }
        Err(e) => {
            debug!(data = %data, error = %e, "Callback rejected");
            bot.answer_callback_query(q.id.clone())
                .text(error_text(&e))
                .show_alert(true)
                .await?;
            return Ok(());
        }
    };

    let mut answer = bot.answer_callback_query(q.id.clone());
    if !response.notice.is_empty() {
        answer = answer.text(response.notice.clone());
    }
    answer.await?;

    if let (Some(replace), Some(message)) = (response.replace, q.regular_message()) {
        let mut req = bot.edit_message_text(message.chat.id, message.id, replace.text);
        if replace.format == TextFormat::Html {
            req = req.parse_mode(ParseMode::Html);
        }
        if let Some(keyboard) = &replace.keyboard {
            req = req.reply_markup(to_markup(keyboard));
        }
        if let Err(e) = req.await {
            warn!(error = %e, "Failed to update callback message");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_command_parsing() {
        assert_eq!(UserCommand::parse("/status", "deskbot").unwrap(), UserCommand::Status);
        assert_eq!(UserCommand::parse("/mytickets", "deskbot").unwrap(), UserCommand::MyTickets);
        assert_eq!(UserCommand::parse("/faq", "deskbot").unwrap(), UserCommand::Faq(String::new()));
        assert_eq!(
            UserCommand::parse("/faq reset password", "deskbot").unwrap(),
            UserCommand::Faq("reset password".into())
        );
        assert!(UserCommand::parse("/close", "deskbot").is_err());
    }

    #[test]
    fn test_tech_command_parsing() {
        assert_eq!(
            TechCommand::parse("/link 123456", "deskbot").unwrap(),
            TechCommand::Link("123456".into())
        );
        assert_eq!(
            TechCommand::parse("/escalate needs admin rights", "deskbot").unwrap(),
            TechCommand::Escalate("needs admin rights".into())
        );
        assert_eq!(
            TechCommand::parse("/reopen TICK-0003", "deskbot").unwrap(),
            TechCommand::Reopen("TICK-0003".into())
        );
        assert_eq!(TechCommand::parse("/close", "deskbot").unwrap(), TechCommand::Close);
    }

    #[test]
    fn test_error_text() {
        assert_eq!(
            error_text(&EngineError::validation("Please select at least one category")),
            "Please select at least one category"
        );
        assert_eq!(
            error_text(&EngineError::NotFound("TICK-0009".into())),
            "Ticket TICK-0009 not found."
        );
        assert_eq!(
            error_text(&EngineError::RoutingUnavailable("flood".into())),
            "Something went wrong. Please try again later."
        );
    }
}
