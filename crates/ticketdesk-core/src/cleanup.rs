//! Deferred deletion of routing threads for closed tickets.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use ticketdesk_models::Ticket;
use ticketdesk_persistence::TicketQuery;

use crate::engine::Engine;
use crate::error::Result;
use crate::gateway::{with_timeout, GatewayError};

/// Tickets read per query.
pub const CLEANUP_PAGE_SIZE: usize = 100;

/// Upper bound on queries in one tick.
const MAX_PAGES_PER_TICK: usize = 50;

/// Default time between ticks.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Counts from one cleanup tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub already_gone: usize,
    pub failed: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.deleted + self.already_gone + self.failed
    }
}

/// Deletes threads whose retention has expired.
pub struct CleanupJob {
    engine: Arc<Engine>,
    shutdown: watch::Receiver<bool>,
}

impl CleanupJob {
    pub fn new(engine: Arc<Engine>, shutdown: watch::Receiver<bool>) -> Self {
        Self { engine, shutdown }
    }

    /// Runs once immediately, then every `every`, until shutdown.
    pub async fn run(&mut self, every: Duration) {
        let mut ticker = interval(every);
        debug!(interval_secs = every.as_secs(), "starting topic cleanup");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(report) if report.total() > 0 => info!(
                            deleted = report.deleted,
                            already_gone = report.already_gone,
                            failed = report.failed,
                            "Topic cleanup finished"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Topic cleanup query failed"),
                    }
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        debug!("cleanup received shutdown signal");
                        break;
                    }
                }
            }
        }

        debug!("topic cleanup stopped");
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        cleanup_topics(&self.engine, now).await
    }
}

/// One pass over tickets whose thread deletion is due at `now`.
///
/// Deletion that succeeds or finds the thread already gone clears the
/// handle. Other failures are pushed back with a growing delay so they
/// never hold up the rest of the queue; the pass keeps paging until no
/// unseen due ticket remains.
pub async fn cleanup_topics(engine: &Engine, now: DateTime<Utc>) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let mut seen = HashSet::new();

    for _ in 0..MAX_PAGES_PER_TICK {
        let due = engine
            .store()
            .find(&TicketQuery::cleanup_due(now, CLEANUP_PAGE_SIZE))
            .await?;
        let page_len = due.len();
        let fresh: Vec<_> = due
            .into_iter()
            .filter(|t| seen.insert(t.ticket_id.clone()))
            .collect();
        if fresh.is_empty() {
            break;
        }

        for ticket in fresh {
            delete_one(engine, &ticket, now, &mut report).await;
        }
        if page_len < CLEANUP_PAGE_SIZE {
            break;
        }
    }
    Ok(report)
}

async fn delete_one(engine: &Engine, ticket: &Ticket, now: DateTime<Utc>, report: &mut CleanupReport) {
    let Some(topic_id) = ticket.topic_id else {
        return;
    };
    let chat_id = ticket
        .tech_group_chat_id
        .unwrap_or(engine.config().groups.technician_group_id);

    let deleted = with_timeout(
        engine.config().outbound_timeout(),
        engine.tech_gateway().delete_thread(chat_id, topic_id),
    )
    .await;
    let gone = match deleted {
        Ok(()) => {
            report.deleted += 1;
            true
        }
        Err(GatewayError::ThreadNotFound) => {
            report.already_gone += 1;
            true
        }
        Err(e) => {
            report.failed += 1;
            warn!(ticket_id = %ticket.ticket_id, topic_id, error = %e, "Topic deletion failed");
            false
        }
    };

    let recorded = engine
        .update(&ticket.ticket_id, |t| {
            if t.topic_id != Some(topic_id) {
                return Ok(false);
            }
            if gone {
                t.clear_topic();
                t.topic_deleted_at = Some(Utc::now());
            } else {
                let retry_at = t.defer_topic_deletion(now);
                debug!(ticket_id = %t.ticket_id, retry_at = %retry_at, "Topic deletion deferred");
            }
            Ok(true)
        })
        .await;
    if let Err(e) = recorded {
        warn!(ticket_id = %ticket.ticket_id, error = %e, "Failed to record topic cleanup");
    }
}
