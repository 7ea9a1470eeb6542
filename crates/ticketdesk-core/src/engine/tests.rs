//! Lifecycle scenarios against in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use ticketdesk_models::{
    InboundContent, InboundMedia, MediaKind, MessageSender, Requester, TechnicianRef, Technician,
    TicketId, TicketStatus,
};
use ticketdesk_persistence::{MemoryTicketStore, TechnicianStore, TicketStore};

use super::*;
use crate::cleanup::cleanup_topics;
use crate::config::HelpdeskConfig;
use crate::gateway::{Destination, MediaSource};
use crate::testing::{GatewayCall, MemoryBlobStore, RecordingGateway};

const GROUP: i64 = -100;
const USER: i64 = 42;

pub(crate) struct Harness {
    pub engine: Arc<Engine>,
    pub store: Arc<MemoryTicketStore>,
    pub technicians: Arc<TechnicianStore>,
    pub user: Arc<RecordingGateway>,
    pub tech: Arc<RecordingGateway>,
    pub blobs: Arc<MemoryBlobStore>,
}

pub(crate) fn base_config() -> HelpdeskConfig {
    HelpdeskConfig::from_toml_str(
        r#"
[bot]
user_token = "123:abc"

[groups]
technician_group_id = -100

[features]
rating_prompt_delay_ms = 0

[[categories]]
id = "hardware"
label = "Hardware"

[[categories]]
id = "network"
label = "Network"
"#,
    )
    .unwrap()
}

pub(crate) fn harness_with(edit: impl FnOnce(&mut HelpdeskConfig)) -> Harness {
    let mut config = base_config();
    edit(&mut config);
    let store = Arc::new(MemoryTicketStore::new());
    let technicians = Arc::new(TechnicianStore::in_memory());
    let user = Arc::new(RecordingGateway::new());
    let tech = Arc::new(RecordingGateway::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = Engine::new(
        Arc::new(config),
        store.clone(),
        Arc::clone(&technicians),
        blobs.clone(),
        user.clone(),
        tech.clone(),
    );
    Harness {
        engine: Arc::new(engine),
        store,
        technicians,
        user,
        tech,
        blobs,
    }
}

pub(crate) fn harness() -> Harness {
    harness_with(|_| {})
}

fn requester() -> Requester {
    Requester::new(USER).with_names(Some("Ana".into()), None, Some("ana".into()))
}

fn bob() -> TechnicianRef {
    TechnicianRef::new(9, "Bob")
}

fn thread(ticket: &Ticket) -> Destination {
    Destination::Thread {
        chat_id: GROUP,
        thread_id: ticket.topic_id.unwrap(),
    }
}

impl Harness {
    async fn open(&self, text: &str) -> Ticket {
        self.engine
            .handle_user_message(requester(), InboundContent::text(text), Some(1))
            .await
            .unwrap()
            .ticket()
            .cloned()
            .unwrap()
    }

    async fn reload(&self, id: &TicketId) -> Ticket {
        self.store.require(id).await.unwrap()
    }
}

#[tokio::test]
async fn test_first_message_creates_ticket_and_thread() {
    let h = harness();
    h.technicians.upsert(Technician::new(9, "Bob")).await.unwrap();

    let outcome = h
        .engine
        .handle_user_message(requester(), InboundContent::text("My printer is jammed"), Some(1))
        .await
        .unwrap();

    let UserMessageOutcome::Created(ticket) = outcome else {
        panic!("expected a new ticket");
    };
    assert_eq!(ticket.ticket_id.as_str(), "TICK-0001");
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.messages.len(), 1);
    assert_eq!(ticket.initial_message, "My printer is jammed");
    assert!(ticket.has_unread_messages);
    assert_eq!(h.tech.created_threads(), vec!["TICK-0001 - Ana".to_string()]);

    let card = h.tech.texts_to(thread(&ticket));
    assert_eq!(card.len(), 1);
    assert!(card[0].contains("TICK-0001"));
    assert_eq!(h.tech.texts_to(Destination::User(9)).len(), 1);
}

#[tokio::test]
async fn test_second_message_appends_to_active_ticket() {
    let h = harness();
    let first = h.open("My printer is jammed").await;

    let outcome = h
        .engine
        .handle_user_message(requester(), InboundContent::text("It is the one on floor 2"), Some(2))
        .await
        .unwrap();

    let UserMessageOutcome::Appended(ticket) = outcome else {
        panic!("expected an append");
    };
    assert_eq!(ticket.ticket_id, first.ticket_id);
    assert_eq!(ticket.messages.len(), 2);
    assert_eq!(h.store.len().await, 1);

    let mirrored = h.tech.texts_to(thread(&ticket));
    assert!(mirrored.last().unwrap().contains("It is the one on floor 2"));
    assert!(ticket.messages[1].topic_message_id.is_some());
}

#[tokio::test]
async fn test_no_active_ticket_without_auto_create() {
    let h = harness_with(|c| c.features.auto_create_ticket = false);
    let outcome = h
        .engine
        .handle_user_message(requester(), InboundContent::text("hello"), None)
        .await
        .unwrap();
    assert!(matches!(outcome, UserMessageOutcome::NoActiveTicket));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_lost_thread_closes_ticket_and_opens_new_one() {
    let h = harness();
    let first = h.open("first").await;
    h.tech.remove_thread(first.topic_id.unwrap());

    let outcome = h
        .engine
        .handle_user_message(requester(), InboundContent::text("anyone there?"), Some(2))
        .await
        .unwrap();

    let UserMessageOutcome::Recreated { previous, ticket } = outcome else {
        panic!("expected recreation");
    };
    assert_eq!(previous, first.ticket_id);
    assert_eq!(ticket.ticket_id.as_str(), "TICK-0002");
    assert_eq!(ticket.initial_message, "anyone there?");

    let old = h.reload(&first.ticket_id).await;
    assert_eq!(old.status, TicketStatus::Closed);
    assert!(old.topic_id.is_none());
    assert_eq!(old.messages.last().unwrap().from, MessageSender::System);
}

#[tokio::test]
async fn test_technician_membership() {
    let h = harness_with(|c| c.admin.technician_ids = vec![11]);
    h.technicians.upsert(Technician::new(9, "Bob")).await.unwrap();

    assert!(h.engine.is_technician(9).await);
    assert!(h.engine.is_technician(11).await);
    assert!(!h.engine.is_technician(USER).await);
}

#[tokio::test]
async fn test_recent_tickets_for_user() {
    let h = harness();
    for n in 0..12 {
        let id = h.store.next_ticket_id().await.unwrap();
        let mut ticket = Ticket::new(id, requester(), format!("issue {}", n));
        ticket.status = TicketStatus::Closed;
        ticket.created_at = Utc::now() - chrono::Duration::minutes(60 - n);
        h.store.insert(&ticket).await.unwrap();
    }
    let other = h.store.next_ticket_id().await.unwrap();
    h.store
        .insert(&Ticket::new(other, Requester::new(7), "not mine"))
        .await
        .unwrap();

    let recent = h.engine.recent_tickets_for_user(USER, 10).await.unwrap();
    assert_eq!(recent.len(), 10);
    assert_eq!(recent[0].initial_message, "issue 11");
    assert!(recent.iter().all(|t| t.requester.user_id == USER));
}

#[tokio::test]
async fn test_faq_callbacks_navigate() {
    let faqs = Arc::new(ticketdesk_persistence::FaqStore::in_memory());
    let h = harness();
    let router = crate::router::Router::new(Arc::new(
        Engine::new(
            Arc::clone(h.engine.config()),
            h.store.clone(),
            Arc::clone(&h.technicians),
            h.blobs.clone(),
            h.user.clone(),
            h.tech.clone(),
        )
        .with_faqs(Arc::clone(&faqs)),
    ));
    let press = |data: &str| crate::router::InboundEvent::Callback {
        token: crate::router::CallbackToken::parse(data).unwrap(),
        actor: TechnicianRef::new(USER, "Ana"),
    };
    let response = |d: crate::router::Dispatched| match d {
        crate::router::Dispatched::Callback(r) => r,
        other => panic!("unexpected dispatch result {:?}", other),
    };

    let empty = response(router.dispatch(press("faq:menu")).await.unwrap());
    assert_eq!(empty.notice, crate::faq::NO_FAQS);
    assert!(empty.replace.is_none());

    let entry = ticketdesk_models::Faq::new("How do I reset my password?", "Use the Forgot Password link.")
        .with_category("Account");
    faqs.upsert(entry.clone()).await.unwrap();

    let menu = response(router.dispatch(press("faq:menu")).await.unwrap());
    assert_eq!(
        menu.replace.unwrap().keyboard.unwrap().callback_data(),
        vec!["faq:category:Account"]
    );

    let page = response(router.dispatch(press("faq:category:Account")).await.unwrap());
    let show = format!("faq:{}", entry.id);
    assert_eq!(
        page.replace.unwrap().keyboard.unwrap().callback_data(),
        vec![show.as_str(), "faq:menu"]
    );

    let answer = response(router.dispatch(press(&show)).await.unwrap());
    assert!(answer.replace.unwrap().text.contains("Forgot Password"));

    let missing = response(router.dispatch(press("faq:deadbeef")).await.unwrap());
    assert_eq!(missing.notice, crate::faq::FAQ_NOT_FOUND);
}

#[tokio::test]
async fn test_lost_thread_reuses_ingested_media() {
    let h = harness();
    let first = h.open("first").await;
    h.tech.remove_thread(first.topic_id.unwrap());
    h.user.add_file("photo-handle", b"jpeg");

    let photo = InboundContent::media(
        InboundMedia::new(MediaKind::Photo, "photo-handle"),
        Some("still broken".into()),
    );
    let outcome = h
        .engine
        .handle_user_message(requester(), photo, Some(2))
        .await
        .unwrap();

    let UserMessageOutcome::Recreated { ticket, .. } = outcome else {
        panic!("expected recreation");
    };
    assert_eq!(h.user.fetched_files(), vec!["photo-handle".to_string()]);
    let keys = h.blobs.keys();
    assert_eq!(keys.len(), 1);

    let media = ticket.messages[0].media.as_ref().unwrap();
    assert_eq!(media.blob_key.as_deref(), Some(keys[0].as_str()));
    let mirrored = h.tech.media_to(thread(&ticket));
    assert_eq!(mirrored.len(), 1);
    assert!(matches!(&mirrored[0].source, MediaSource::Bytes { data, .. } if data == b"jpeg"));
}

#[tokio::test]
async fn test_thread_creation_failure_removes_ticket() {
    let h = harness();
    h.tech.fail_create_thread(true);

    let err = h
        .engine
        .handle_user_message(requester(), InboundContent::text("help"), Some(1))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::RoutingUnavailable(_)));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let h = harness();
    let err = h
        .engine
        .handle_user_message(requester(), InboundContent::text("   "), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_concurrent_first_messages_open_one_ticket() {
    let h = harness();
    let mut handles = Vec::new();
    for i in 0..5 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move {
            engine
                .handle_user_message(requester(), InboundContent::text(format!("message {}", i)), Some(i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.store.len().await, 1);
    let ticket = h.engine.find_active_ticket_for_user(USER).await.unwrap().unwrap();
    assert_eq!(ticket.messages.len(), 5);
    assert_eq!(h.tech.created_threads().len(), 1);
}

#[tokio::test]
async fn test_user_media_is_stored_and_mirrored() {
    let h = harness();
    h.user.add_file("photo-1", b"jpeg-bytes");
    let content = InboundContent::media(
        InboundMedia::new(MediaKind::Photo, "photo-1"),
        Some("see the error".into()),
    );

    let outcome = h
        .engine
        .handle_user_message(requester(), content, Some(1))
        .await
        .unwrap();
    let ticket = outcome.ticket().unwrap();

    let media = ticket.messages[0].media.as_ref().unwrap();
    assert!(media.blob_key.as_deref().unwrap().starts_with("tickets/TICK-0001/photo_"));
    assert_eq!(h.blobs.keys().len(), 1);

    let sent = h.tech.media_to(thread(ticket));
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0].source, MediaSource::Bytes { data, .. } if data == b"jpeg-bytes"));
}

#[tokio::test]
async fn test_blob_failure_keeps_handle() {
    let h = harness();
    h.user.add_file("doc-1", b"pdf");
    h.blobs.fail(true);
    let content = InboundContent::media(InboundMedia::new(MediaKind::Document, "doc-1"), None);

    let outcome = h
        .engine
        .handle_user_message(requester(), content, Some(1))
        .await
        .unwrap();

    let media = outcome.ticket().unwrap().messages[0].media.clone().unwrap();
    assert!(media.blob_url.is_none());
    assert_eq!(media.file_handle.as_deref(), Some("doc-1"));
}

#[tokio::test]
async fn test_technician_reply_assigns_and_forwards() {
    let h = harness();
    let ticket = h.open("help").await;

    let outcome = h
        .engine
        .handle_technician_message(ticket.topic_id.unwrap(), bob(), InboundContent::text("On my way"), Some(77))
        .await
        .unwrap();

    let TechnicianReplyOutcome::Replied { ticket, delivery } = outcome else {
        panic!("expected a reply");
    };
    assert!(delivery.is_delivered());
    assert_eq!(ticket.status, TicketStatus::InProgress);
    assert_eq!(ticket.assigned_to, Some(9));
    assert_eq!(ticket.messages.len(), 2);
    assert_eq!(ticket.messages[1].topic_message_id, Some(77));

    let to_user = h.user.texts_to(Destination::User(USER));
    assert_eq!(to_user, vec!["💬 <b>Bob:</b>\n\nOn my way".to_string()]);
}

#[tokio::test]
async fn test_technician_message_in_unknown_thread() {
    let h = harness();
    let outcome = h
        .engine
        .handle_technician_message(999, bob(), InboundContent::text("hi"), None)
        .await
        .unwrap();
    assert!(matches!(outcome, TechnicianReplyOutcome::NoTicket));
}

#[tokio::test]
async fn test_blocked_user_is_reported_and_message_kept() {
    let h = harness();
    let ticket = h.open("help").await;
    h.user.block_user(USER);

    let outcome = h
        .engine
        .handle_technician_message(ticket.topic_id.unwrap(), bob(), InboundContent::text("hello?"), None)
        .await
        .unwrap();

    let TechnicianReplyOutcome::Replied { ticket, delivery } = outcome else {
        panic!("expected a reply");
    };
    assert_eq!(delivery, Delivery::Blocked);
    assert_eq!(ticket.messages.len(), 2);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let h = harness();
    let ticket = h.open("help").await;

    let first = h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();
    let CloseOutcome::Closed(report) = first else {
        panic!("expected closure");
    };
    let closed_at = report.ticket.closed_at.unwrap();
    assert_eq!(report.ticket.status, TicketStatus::Closed);
    assert_eq!(report.archive, ArchiveStatus::Disabled);
    assert!(matches!(report.topic, TopicDisposition::Scheduled(_)));

    let second = h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();
    assert!(matches!(second, CloseOutcome::AlreadyClosed(_)));
    assert_eq!(h.reload(&ticket.ticket_id).await.closed_at, Some(closed_at));

    let closed_notices = h
        .user
        .texts_to(Destination::User(USER))
        .into_iter()
        .filter(|t| t.contains("Closed"))
        .count();
    assert_eq!(closed_notices, 1);
}

#[tokio::test]
async fn test_close_sends_rating_prompt() {
    let h = harness();
    let ticket = h.open("help").await;
    h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let prompt = h.user.calls().into_iter().find_map(|call| match call {
        GatewayCall::Text { message, .. } if message.text == templates::RATING_PROMPT => Some(message),
        _ => None,
    });
    let prompt = prompt.expect("rating prompt sent");
    let keyboard = prompt.keyboard.unwrap();
    assert_eq!(keyboard.callback_data()[0], "rate:TICK-0001:1");
}

#[tokio::test]
async fn test_user_message_after_close_opens_new_ticket() {
    let h = harness();
    let first = h.open("help").await;
    h.engine.close_ticket(&first.ticket_id, bob()).await.unwrap();

    let outcome = h
        .engine
        .handle_user_message(requester(), InboundContent::text("new problem"), Some(5))
        .await
        .unwrap();
    let UserMessageOutcome::Created(ticket) = outcome else {
        panic!("expected a new ticket");
    };
    assert_ne!(ticket.ticket_id, first.ticket_id);
}

#[tokio::test]
async fn test_mandatory_categorization_blocks_closure() {
    let h = harness_with(|c| {
        c.features.enable_categorization = true;
        c.features.require_categorization = true;
    });
    let ticket = h.open("help").await;
    let id = ticket.ticket_id.clone();

    let outcome = h.engine.close_ticket(&id, bob()).await.unwrap();
    let CloseOutcome::AwaitingCategorization { keyboard, .. } = outcome else {
        panic!("expected the category picker");
    };
    assert_eq!(
        keyboard.callback_data(),
        vec!["cat:TICK-0001:hardware", "cat:TICK-0001:network", "cat:TICK-0001:done"]
    );
    let parked = h.reload(&id).await;
    assert_ne!(parked.status, TicketStatus::Closed);
    assert!(parked.closure_pending.is_some());

    let err = h.engine.finish_categorization(&id, bob()).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let toggle = h.engine.toggle_category(&id, "hardware").await.unwrap();
    assert!(toggle.selected);
    assert!(toggle.keyboard.rows[0][0].label().starts_with("✓ "));

    let done = h.engine.finish_categorization(&id, bob()).await.unwrap();
    let CloseOutcome::Closed(report) = done else {
        panic!("expected closure");
    };
    assert_eq!(report.categories, vec!["hardware".to_string()]);
    assert_eq!(report.ticket.categorized_by.as_ref().map(|t| t.id), Some(9));
    assert!(report.ticket.closure_pending.is_none());
}

#[tokio::test]
async fn test_close_with_categories_from_dashboard() {
    let h = harness_with(|c| {
        c.features.enable_categorization = true;
        c.features.require_categorization = true;
    });
    let ticket = h.open("help").await;

    let err = h
        .engine
        .close_with_categories(&ticket.ticket_id, bob(), Some(vec!["bogus".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let outcome = h
        .engine
        .close_with_categories(&ticket.ticket_id, bob(), Some(vec!["network".into()]))
        .await
        .unwrap();
    assert!(matches!(outcome, CloseOutcome::Closed(_)));
}

#[tokio::test]
async fn test_rating_is_recorded_once() {
    let h = harness();
    let ticket = h.open("help").await;
    let id = &ticket.ticket_id;

    let first = h.engine.set_rating(id, Some(USER), 4).await.unwrap();
    assert!(matches!(first, RatingOutcome::Rated(_)));

    let second = h.engine.set_rating(id, Some(USER), 2).await.unwrap();
    let RatingOutcome::AlreadyRated(ticket) = second else {
        panic!("expected already rated");
    };
    assert_eq!(ticket.rating.unwrap().stars, 4);

    assert!(matches!(
        h.engine.set_rating(id, Some(USER), 6).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        h.engine.set_rating(id, Some(7), 3).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn test_escalation_requires_pool() {
    let h = harness();
    let ticket = h.open("help").await;
    let err = h
        .engine
        .escalate_ticket(&ticket.ticket_id, None, &bob())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoEscalationPool));
    assert_eq!(h.reload(&ticket.ticket_id).await.status, TicketStatus::Open);
}

#[tokio::test]
async fn test_escalation_notifies_pool() {
    let h = harness_with(|c| c.admin.level2_ids = vec![7, 8]);
    let ticket = h.open("help").await;
    h.engine
        .handle_technician_message(ticket.topic_id.unwrap(), bob(), InboundContent::text("looking"), None)
        .await
        .unwrap();
    h.tech.block_user(8);

    let outcome = h
        .engine
        .escalate_ticket(&ticket.ticket_id, Some("needs admin rights".into()), &bob())
        .await
        .unwrap();

    assert_eq!(outcome.notified, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.ticket.status, TicketStatus::Escalated);
    assert!(outcome.ticket.assigned_to.is_none());
    assert_eq!(
        outcome.ticket.messages.last().unwrap().text,
        "Ticket ESCALATED to Level 2\nReason: needs admin rights"
    );
    assert!(h.tech.texts_to(Destination::User(7))[0].contains("Ticket Escalated"));
}

#[tokio::test]
async fn test_escalated_ticket_still_receives_user_messages() {
    let h = harness_with(|c| c.admin.level2_ids = vec![7]);
    let ticket = h.open("help").await;
    h.engine
        .escalate_ticket(&ticket.ticket_id, None, &bob())
        .await
        .unwrap();

    let outcome = h
        .engine
        .handle_user_message(requester(), InboundContent::text("still broken"), Some(3))
        .await
        .unwrap();
    assert!(matches!(outcome, UserMessageOutcome::Appended(_)));
}

#[tokio::test]
async fn test_reopen_recreates_deleted_thread() {
    let h = harness_with(|c| c.features.topic_cleanup_hours = 0);
    let ticket = h.open("help").await;
    let outcome = h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected closure");
    };
    assert_eq!(report.topic, TopicDisposition::Deleted);
    assert!(report.ticket.topic_id.is_none());

    let reopened = h.engine.reopen_ticket(&ticket.ticket_id, &bob()).await.unwrap();
    assert_eq!(reopened.status, TicketStatus::Open);
    assert!(reopened.closed_at.is_none());
    assert!(reopened.topic_deletion_scheduled_at.is_none());
    assert!(reopened.topic_id.is_some());
    assert_ne!(reopened.topic_id, ticket.topic_id);
    assert_eq!(h.tech.created_threads().len(), 2);
    assert!(h
        .user
        .texts_to(Destination::User(USER))
        .iter()
        .any(|t| t.contains("Ticket Reopened")));
}

#[tokio::test]
async fn test_reopen_rejected_when_user_has_active_ticket() {
    let h = harness();
    let first = h.open("help").await;
    h.engine.close_ticket(&first.ticket_id, bob()).await.unwrap();
    h.open("another issue").await;

    let err = h.engine.reopen_ticket(&first.ticket_id, &bob()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let open = h.engine.find_active_ticket_for_user(USER).await.unwrap().unwrap();
    let err = h.engine.reopen_ticket(&open.ticket_id, &bob()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn test_cleanup_deletes_due_topics_once() {
    let h = harness();
    let ticket = h.open("help").await;
    let topic_id = ticket.topic_id.unwrap();
    h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();

    let early = cleanup_topics(&h.engine, Utc::now()).await.unwrap();
    assert_eq!(early.total(), 0);

    let later = Utc::now() + chrono::Duration::hours(25);
    let report = cleanup_topics(&h.engine, later).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(h.tech.deleted_threads(), vec![topic_id]);

    let cleaned = h.reload(&ticket.ticket_id).await;
    assert!(cleaned.topic_id.is_none());
    assert!(cleaned.topic_deleted_at.is_some());

    let again = cleanup_topics(&h.engine, later).await.unwrap();
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn test_cleanup_retries_failed_deletion() {
    let h = harness();
    let ticket = h.open("help").await;
    h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();
    let later = Utc::now() + chrono::Duration::hours(25);

    h.tech.fail_delete_thread(true);
    let report = cleanup_topics(&h.engine, later).await.unwrap();
    assert_eq!(report.failed, 1);
    let deferred = h.reload(&ticket.ticket_id).await;
    assert!(deferred.topic_id.is_some());
    assert_eq!(deferred.topic_deletion_attempts, 1);
    assert_eq!(
        deferred.topic_deletion_scheduled_at,
        Some(later + chrono::Duration::hours(1))
    );

    h.tech.fail_delete_thread(false);
    let report = cleanup_topics(&h.engine, later).await.unwrap();
    assert_eq!(report.total(), 0);

    let report = cleanup_topics(&h.engine, later + chrono::Duration::hours(1)).await.unwrap();
    assert_eq!(report.deleted, 1);
    let cleaned = h.reload(&ticket.ticket_id).await;
    assert!(cleaned.topic_id.is_none());
    assert_eq!(cleaned.topic_deletion_attempts, 0);
}

#[tokio::test]
async fn test_cleanup_is_not_starved_by_failing_topics() {
    let h = harness();
    let now = Utc::now();

    for n in 1..=101u64 {
        let mut ticket = Ticket::new(
            TicketId::from_sequence(n),
            Requester::new(1000 + n as i64),
            "old issue",
        );
        ticket.status = TicketStatus::Closed;
        ticket.closed_at = Some(now - chrono::Duration::days(2));
        ticket.topic_id = Some(5000 + n as i32);
        ticket.tech_group_chat_id = Some(GROUP);
        // The healthy ticket is due last.
        ticket.topic_deletion_scheduled_at =
            Some(now - chrono::Duration::hours(if n == 101 { 1 } else { 10 }));
        if n != 101 {
            h.tech.fail_delete_for(5000 + n as i32);
        }
        h.store.insert(&ticket).await.unwrap();
    }

    let report = cleanup_topics(&h.engine, now).await.unwrap();
    assert_eq!(report.failed, 100);
    assert_eq!(report.deleted, 1);
    assert_eq!(h.tech.deleted_threads(), vec![5101]);

    let healthy = h.reload(&TicketId::from_sequence(101)).await;
    assert!(healthy.topic_id.is_none());
    let stuck = h.reload(&TicketId::from_sequence(1)).await;
    assert!(stuck.topic_id.is_some());
    assert!(stuck.topic_deletion_scheduled_at.unwrap() > now);

    let again = cleanup_topics(&h.engine, now).await.unwrap();
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn test_close_archives_when_enabled() {
    let h = harness_with(|c| {
        c.features.enable_archiving = true;
        c.groups.archive_group_id = Some(-200);
    });
    let ticket = h.open("help").await;

    let outcome = h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected closure");
    };
    let ArchiveStatus::Archived { topic_id, topic_name } = &report.archive else {
        panic!("expected an archive, got {:?}", report.archive);
    };
    assert_eq!(topic_name, "📦 [CLOSED] TICK-0001 - Ana");
    assert_eq!(report.ticket.archive_topic_id, Some(*topic_id));
    assert!(report.ticket.archived_at.is_some());
}

#[tokio::test]
async fn test_archive_failure_keeps_ticket_closed() {
    let h = harness_with(|c| c.features.enable_archiving = true);
    let ticket = h.open("help").await;

    let outcome = h.engine.close_ticket(&ticket.ticket_id, bob()).await.unwrap();
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected closure");
    };
    assert!(matches!(report.archive, ArchiveStatus::Failed(_)));
    assert_eq!(h.reload(&ticket.ticket_id).await.status, TicketStatus::Closed);
}

#[tokio::test]
async fn test_web_reply_is_delivered_and_mirrored() {
    let h = harness();
    let ticket = h.open("help").await;

    let outcome = h
        .engine
        .reply_from_web(&ticket.ticket_id, bob(), "Restart the spooler")
        .await
        .unwrap();

    assert!(outcome.delivery.is_delivered());
    assert!(outcome.mirrored);
    assert!(!outcome.ticket.has_unread_messages);
    assert_eq!(outcome.ticket.status, TicketStatus::InProgress);
    assert!(h
        .tech
        .texts_to(thread(&ticket))
        .iter()
        .any(|t| t.contains("(web)") && t.contains("Restart the spooler")));

    let err = h
        .engine
        .reply_from_web(&ticket.ticket_id, bob(), "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_web_media_is_stored_and_sent() {
    let h = harness();
    let ticket = h.open("help").await;

    let upload = WebUpload {
        data: b"png".to_vec(),
        file_name: "screen.png".into(),
        content_type: Some("image/png".into()),
        kind: None,
        caption: None,
    };
    let outcome = h
        .engine
        .send_web_media(&ticket.ticket_id, bob(), upload)
        .await
        .unwrap();

    let message = outcome.ticket.messages.last().unwrap();
    assert_eq!(message.text, technician::WEB_MEDIA_PLACEHOLDER);
    let media = message.media.as_ref().unwrap();
    assert_eq!(media.kind, MediaKind::Photo);
    assert!(media.blob_url.as_deref().unwrap().starts_with("mem://tickets/TICK-0001/photo_"));
    assert_eq!(h.user.media_to(Destination::User(USER)).len(), 1);
    assert_eq!(h.tech.media_to(thread(&ticket)).len(), 1);
}

#[tokio::test]
async fn test_web_voice_without_transcoder_is_sent_as_audio() {
    let h = harness();
    let ticket = h.open("help").await;

    let upload = WebUpload {
        data: b"webm-bytes".to_vec(),
        file_name: "note.webm".into(),
        content_type: Some("audio/webm".into()),
        kind: Some(MediaKind::Voice),
        caption: Some("listen".into()),
    };
    let outcome = h
        .engine
        .send_web_media(&ticket.ticket_id, bob(), upload)
        .await
        .unwrap();

    let media = outcome.ticket.messages.last().unwrap().media.clone().unwrap();
    assert_eq!(media.kind, MediaKind::Audio);
    assert_eq!(outcome.ticket.messages.last().unwrap().text, "listen");
    assert_eq!(h.user.media_to(Destination::User(USER))[0].kind, MediaKind::Audio);
}

#[tokio::test]
async fn test_mark_read_and_queue_order() {
    let h = harness();
    let first = h.open("first user").await;
    let other = Requester::new(43).with_names(Some("Cy".into()), None, None);
    h.engine
        .handle_user_message(other, InboundContent::text("second user"), Some(1))
        .await
        .unwrap();

    h.engine.mark_read(&first.ticket_id).await.unwrap();
    let queue = h.engine.open_queue(100).await.unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].ticket_id.as_str(), "TICK-0002");
    assert!(!queue[1].has_unread_messages);
}

#[tokio::test]
async fn test_archived_page_counts_closed_tickets() {
    let h = harness();
    let first = h.open("help").await;
    h.engine.close_ticket(&first.ticket_id, bob()).await.unwrap();
    h.open("again").await;

    let (page, total) = h.engine.archived_page(1, 50).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(page[0].ticket_id, first.ticket_id);
}
