//! Inbound event classification and dispatch.
//!
//! Transport adapters describe each event with an [`EventContext`] or a
//! [`CallbackToken`], wrap it in an [`InboundEvent`] and hand it to the
//! [`Router`]. The router picks the engine operation and nothing else.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use ticketdesk_models::{
    category_labels, InboundContent, Requester, TechnicianRef, TicketId,
};

use crate::cleanup::{cleanup_topics, CleanupReport};
use crate::config::HelpdeskConfig;
use crate::engine::{
    CloseOutcome, Engine, RatingOutcome, TechnicianReplyOutcome, UserMessageOutcome,
};
use crate::error::{EngineError, Result};
use crate::faq::{self, FaqCallback};
use crate::gateway::OutboundText;
use crate::templates;

/// Which bot identity received an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotRole {
    User,
    Technician,
    /// One bot serves both sides.
    Shared,
}

impl BotRole {
    fn serves_users(self) -> bool {
        matches!(self, BotRole::User | BotRole::Shared)
    }

    fn serves_technicians(self) -> bool {
        matches!(self, BotRole::Technician | BotRole::Shared)
    }
}

/// Transport-neutral facts about an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub role: BotRole,
    pub chat_id: i64,
    pub is_private: bool,
    pub thread_id: Option<i32>,
    pub from_bot: bool,
    pub is_command: bool,
}

/// Where an inbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    UserMessage,
    TechnicianMessage { topic_id: i32 },
    Ignore,
}

/// Classifies a message. Commands are handled by the adapters and ignored here.
pub fn classify(ctx: &EventContext, config: &HelpdeskConfig) -> Route {
    if ctx.from_bot || ctx.is_command {
        return Route::Ignore;
    }
    if ctx.is_private {
        return if ctx.role.serves_users() {
            Route::UserMessage
        } else {
            Route::Ignore
        };
    }
    if !ctx.role.serves_technicians() || ctx.chat_id != config.groups.technician_group_id {
        return Route::Ignore;
    }
    match ctx.thread_id {
        Some(topic_id) if Some(topic_id) != config.groups.general_topic_id => {
            Route::TechnicianMessage { topic_id }
        }
        _ => Route::Ignore,
    }
}

/// Action encoded in the last segment of a ticket callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Rate(u8),
    ToggleCategory(String),
    FinishCategorization,
}

/// Parsed button payload: `<domain>:<ticketId>:<action>` for ticket
/// buttons, or one of the `faq:` forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackToken {
    Ticket {
        ticket_id: TicketId,
        action: CallbackAction,
    },
    Faq(FaqCallback),
}

impl CallbackToken {
    pub fn parse(data: &str) -> Result<Self> {
        let malformed = || EngineError::validation(format!("malformed callback: {}", data));
        if data.starts_with("faq:") {
            return FaqCallback::parse(data)
                .map(CallbackToken::Faq)
                .ok_or_else(malformed);
        }

        let mut parts = data.splitn(3, ':');
        let (Some(domain), Some(ticket), Some(action)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if action.is_empty() {
            return Err(malformed());
        }

        let action = match domain {
            "rate" => {
                let stars = action
                    .parse::<u8>()
                    .map_err(|_| EngineError::validation(format!("invalid rating: {}", action)))?;
                CallbackAction::Rate(stars)
            }
            "cat" if action == "done" => CallbackAction::FinishCategorization,
            "cat" => CallbackAction::ToggleCategory(action.to_string()),
            other => {
                return Err(EngineError::validation(format!(
                    "unknown callback domain: {}",
                    other
                )))
            }
        };

        let ticket_id = TicketId::parse(ticket)
            .ok_or_else(|| EngineError::validation(format!("invalid ticket id: {}", ticket)))?;
        Ok(CallbackToken::Ticket { ticket_id, action })
    }
}

/// What the adapter shows after a callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResponse {
    /// Short notice shown to whoever pressed the button.
    pub notice: String,
    /// Replacement for the message that carried the keyboard.
    pub replace: Option<OutboundText>,
}

impl CallbackResponse {
    fn notice(notice: impl Into<String>) -> Self {
        Self {
            notice: notice.into(),
            replace: None,
        }
    }

    fn replacing(notice: impl Into<String>, replace: OutboundText) -> Self {
        Self {
            notice: notice.into(),
            replace: Some(replace),
        }
    }
}

/// An event entering the system.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    UserMessage {
        requester: Requester,
        content: InboundContent,
        message_id: Option<i32>,
    },
    TechnicianMessage {
        topic_id: i32,
        technician: TechnicianRef,
        content: InboundContent,
        message_id: Option<i32>,
    },
    Callback {
        token: CallbackToken,
        /// The presser, as a technician reference. For rating callbacks this is
        /// the requester.
        actor: TechnicianRef,
    },
    CleanupTick(DateTime<Utc>),
}

/// Engine result for a dispatched event.
#[derive(Debug, Clone)]
pub enum Dispatched {
    User(UserMessageOutcome),
    Technician(TechnicianReplyOutcome),
    Callback(CallbackResponse),
    Cleanup(CleanupReport),
}

/// Dispatches inbound events onto the engine.
#[derive(Clone)]
pub struct Router {
    engine: Arc<Engine>,
}

impl Router {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn dispatch(&self, event: InboundEvent) -> Result<Dispatched> {
        match event {
            InboundEvent::UserMessage {
                requester,
                content,
                message_id,
            } => Ok(Dispatched::User(
                self.engine
                    .handle_user_message(requester, content, message_id)
                    .await?,
            )),
            InboundEvent::TechnicianMessage {
                topic_id,
                technician,
                content,
                message_id,
            } => Ok(Dispatched::Technician(
                self.engine
                    .handle_technician_message(topic_id, technician, content, message_id)
                    .await?,
            )),
            InboundEvent::Callback { token, actor } => {
                Ok(Dispatched::Callback(self.callback(token, actor).await?))
            }
            InboundEvent::CleanupTick(now) => {
                Ok(Dispatched::Cleanup(cleanup_topics(&self.engine, now).await?))
            }
        }
    }

    async fn callback(&self, token: CallbackToken, actor: TechnicianRef) -> Result<CallbackResponse> {
        let (ticket_id, action) = match token {
            CallbackToken::Ticket { ticket_id, action } => (ticket_id, action),
            CallbackToken::Faq(request) => return Ok(self.faq_callback(request).await),
        };
        debug!(ticket_id = %ticket_id, action = ?action, "Callback");
        let id = &ticket_id;
        match action {
            CallbackAction::Rate(stars) => {
                let outcome = self.engine.set_rating(id, Some(actor.id), stars).await?;
                Ok(match outcome {
                    RatingOutcome::Rated(_) => CallbackResponse::replacing(
                        "Thank you for your feedback!",
                        OutboundText::html(templates::rating_thanks(stars)),
                    ),
                    RatingOutcome::AlreadyRated(ticket) => {
                        let existing = ticket.rating.map(|r| r.stars).unwrap_or(stars);
                        CallbackResponse::replacing(
                            "You already rated this ticket",
                            OutboundText::html(templates::rating_already(existing)),
                        )
                    }
                })
            }
            CallbackAction::ToggleCategory(category) => {
                let toggle = self.engine.toggle_category(id, &category).await?;
                let label = self
                    .engine
                    .config()
                    .category(&category)
                    .map(|c| c.label.clone())
                    .unwrap_or(category);
                let notice = if toggle.selected {
                    format!("Added: {}", label)
                } else {
                    format!("Removed: {}", label)
                };
                Ok(CallbackResponse::replacing(
                    notice,
                    OutboundText::html(toggle.prompt).with_keyboard(toggle.keyboard),
                ))
            }
            CallbackAction::FinishCategorization => {
                match self.engine.finish_categorization(id, actor).await? {
                    CloseOutcome::Closed(report) => {
                        let labels = category_labels(&self.engine.config().categories, &report.categories);
                        Ok(CallbackResponse::replacing(
                            "Ticket closed",
                            OutboundText::html(categorized_text(id, &labels)),
                        ))
                    }
                    CloseOutcome::AlreadyClosed(_) => Ok(CallbackResponse::notice(format!(
                        "Ticket {} is already closed",
                        id
                    ))),
                    CloseOutcome::AwaitingCategorization { .. } => {
                        Ok(CallbackResponse::notice("Please select at least one category"))
                    }
                }
            }
        }
    }

    async fn faq_callback(&self, request: FaqCallback) -> CallbackResponse {
        debug!(request = ?request, "FAQ callback");
        let faqs = self.engine.faqs();
        let page = match &request {
            FaqCallback::Menu => faq::menu(&faqs.categories().await),
            FaqCallback::Category(category) => {
                faq::category_page(category, &faqs.in_category(category).await)
            }
            FaqCallback::Show(id) => faqs.get_active(id).await.map(|f| faq::answer(&f)),
        };
        match (page, request) {
            (Some(page), _) => CallbackResponse::replacing("", page),
            (None, FaqCallback::Show(_)) => CallbackResponse::notice(faq::FAQ_NOT_FOUND),
            (None, _) => CallbackResponse::notice(faq::NO_FAQS),
        }
    }
}

fn categorized_text(id: &TicketId, labels: &[String]) -> String {
    format!(
        "✅ <b>Ticket {} categorized and closed</b>\n\nCategories: {}",
        id,
        crate::markup::escape(&labels.join(", "))
    )
}
