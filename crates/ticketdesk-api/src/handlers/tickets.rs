//! Ticket handlers for the web dashboard.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use tracing::{debug, info};

use ticketdesk_core::engine::WebUpload;
use ticketdesk_models::{MediaKind, TicketId};

use crate::error::{ApiError, Result};
use crate::state::{AppState, Technician};
use crate::types::{
    ArchivedListResponse, ArchivedQuery, CategoriesResponse, CloseRequest, CloseResponse,
    EscalateRequest, EscalateResponse, Pagination, ReplyRequest, ReplyResponse, TicketDetailResponse,
    TicketListResponse, TicketSummary,
};

/// Tickets shown in the open queue.
pub const OPEN_QUEUE_LIMIT: usize = 100;
/// Archived tickets per page.
pub const ARCHIVE_PAGE_SIZE: usize = 50;

fn parse_ticket_id(id: &str) -> Result<TicketId> {
    TicketId::parse(id).ok_or_else(|| ApiError::NotFound(format!("ticket not found: {}", id)))
}

/// GET /api/tickets/open - Active tickets, unread first.
pub async fn list_open_tickets(
    State(state): State<AppState>,
    _technician: Technician,
) -> Result<Json<TicketListResponse>> {
    let tickets = state.engine.open_queue(OPEN_QUEUE_LIMIT).await?;
    let summaries: Vec<TicketSummary> = tickets.iter().map(TicketSummary::from).collect();
    let total = summaries.len();
    Ok(Json(TicketListResponse {
        tickets: summaries,
        total,
    }))
}

/// GET /api/tickets/archived - Closed tickets, newest closure first.
pub async fn list_archived_tickets(
    State(state): State<AppState>,
    _technician: Technician,
    Query(query): Query<ArchivedQuery>,
) -> Result<Json<ArchivedListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let (tickets, total) = state.engine.archived_page(page, ARCHIVE_PAGE_SIZE).await?;
    Ok(Json(ArchivedListResponse {
        tickets: tickets.iter().map(TicketSummary::from).collect(),
        pagination: Pagination::new(page, ARCHIVE_PAGE_SIZE, total),
    }))
}

/// GET /api/tickets/categories - Category taxonomy.
pub async fn list_categories(
    State(state): State<AppState>,
    _technician: Technician,
) -> Json<CategoriesResponse> {
    let config = state.engine.config();
    Json(CategoriesResponse {
        enabled: config.features.enable_categorization,
        required: config.categorization_required(),
        categories: config.categories.clone(),
    })
}

/// GET /api/tickets/:id - Full ticket with its transcript.
pub async fn get_ticket(
    State(state): State<AppState>,
    _technician: Technician,
    Path(id): Path<String>,
) -> Result<Json<TicketDetailResponse>> {
    let id = parse_ticket_id(&id)?;
    let ticket = state.engine.get_ticket(&id).await?;
    Ok(Json(TicketDetailResponse::new(
        ticket,
        &state.engine.config().categories,
    )))
}

/// POST /api/tickets/:id/read - Marks user messages as read.
pub async fn mark_ticket_read(
    State(state): State<AppState>,
    _technician: Technician,
    Path(id): Path<String>,
) -> Result<Json<TicketDetailResponse>> {
    let id = parse_ticket_id(&id)?;
    let ticket = state.engine.mark_read(&id).await?;
    Ok(Json(TicketDetailResponse::new(
        ticket,
        &state.engine.config().categories,
    )))
}

/// POST /api/tickets/:id/reply - Sends a text reply to the requester.
pub async fn reply_to_ticket(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Path(id): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>> {
    let id = parse_ticket_id(&id)?;
    let outcome = state
        .engine
        .reply_from_web(&id, technician, &req.message)
        .await?;
    Ok(Json(ReplyResponse::from(&outcome)))
}

/// POST /api/tickets/:id/media - Uploads a file and sends it to the requester.
///
/// Multipart fields: `file` (required), `caption` and `kind`.
pub async fn send_ticket_media(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ReplyResponse>> {
    let id = parse_ticket_id(&id)?;

    let mut file: Option<(Vec<u8>, String, Option<String>)> = None;
    let mut caption = None;
    let mut kind = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                file = Some((data.to_vec(), file_name, content_type));
            }
            "caption" => {
                caption = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            "kind" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                kind = Some(
                    MediaKind::parse(raw.trim())
                        .ok_or_else(|| ApiError::BadRequest(format!("unknown media kind: {}", raw)))?,
                );
            }
            other => debug!(field = %other, "Ignoring multipart field"),
        }
    }

    let (data, file_name, content_type) =
        file.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;
    let upload = WebUpload {
        data,
        file_name,
        content_type,
        kind,
        caption,
    };
    let outcome = state.engine.send_web_media(&id, technician, upload).await?;
    Ok(Json(ReplyResponse::from(&outcome)))
}

/// POST /api/tickets/:id/close - Closes the ticket.
///
/// When categorization is mandatory the body must carry `categories`.
pub async fn close_ticket(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Path(id): Path<String>,
    body: Option<Json<CloseRequest>>,
) -> Result<Json<CloseResponse>> {
    let id = parse_ticket_id(&id)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .engine
        .close_with_categories(&id, technician, req.categories)
        .await?;
    let response = CloseResponse::from(&outcome);
    info!(ticket_id = %id, result = %response.result, "Close requested from dashboard");
    Ok(Json(response))
}

/// POST /api/tickets/:id/escalate - Escalates to the level-2 pool.
pub async fn escalate_ticket(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Path(id): Path<String>,
    body: Option<Json<EscalateRequest>>,
) -> Result<Json<EscalateResponse>> {
    let id = parse_ticket_id(&id)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .engine
        .escalate_ticket(&id, req.reason, &technician)
        .await?;
    Ok(Json(EscalateResponse {
        ticket_id: outcome.ticket.ticket_id.to_string(),
        status: outcome.ticket.status.as_str().to_string(),
        notified: outcome.notified,
        failed: outcome.failed,
    }))
}

/// POST /api/tickets/:id/reopen - Reopens a closed ticket.
pub async fn reopen_ticket(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Path(id): Path<String>,
) -> Result<Json<TicketDetailResponse>> {
    let id = parse_ticket_id(&id)?;
    let ticket = state.engine.reopen_ticket(&id, &technician).await?;
    Ok(Json(TicketDetailResponse::new(
        ticket,
        &state.engine.config().categories,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{make_test_app, TECH_ID};
    use ticketdesk_models::TechnicianRef;
    use ticketdesk_models::{InboundContent, Requester};

    #[test]
    fn test_parse_ticket_id() {
        assert_eq!(parse_ticket_id("tick-0003").unwrap().as_str(), "TICK-0003");
        assert!(matches!(parse_ticket_id("bogus"), Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_categories_handler() {
        let app = make_test_app();
        let Json(body) = list_categories(State(app.state), Technician(TechnicianRef::new(TECH_ID, "Bob"))).await;
        assert!(body.enabled);
        assert!(!body.required);
        assert_eq!(body.categories.len(), 2);
    }

    #[tokio::test]
    async fn test_open_queue_handler() {
        let app = make_test_app();
        app.state
            .engine
            .handle_user_message(Requester::new(7), InboundContent::text("VPN is down"), Some(1))
            .await
            .unwrap();

        let Json(body) = list_open_tickets(State(app.state), Technician(TechnicianRef::new(TECH_ID, "Bob"))).await.unwrap();
        assert_eq!(body.total, 1);
        assert_eq!(body.tickets[0].subject, "VPN is down");
        assert!(body.tickets[0].has_unread_messages);
    }
}
