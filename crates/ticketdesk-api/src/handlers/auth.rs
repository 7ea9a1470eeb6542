//! Dashboard authentication handlers.
//!
//! A browser without Telegram context links itself: it requests a code, the
//! technician sends `/link <code>` to the technician bot, and the dashboard
//! polls with the code's secret until it receives a session token.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::{info, warn};

use ticketdesk_core::auth::constant_time_eq;
use ticketdesk_core::LinkState;
use ticketdesk_models::TechnicianRef;

use crate::error::{ApiError, Result};
use crate::state::{AppState, Technician};
use crate::types::{LinkCodeResponse, LinkStatusResponse, LoginRequest, SessionResponse};

/// Secret returned with a link code, required to poll it.
pub const LINK_SECRET_HEADER: &str = "x-link-secret";

fn session_for(state: &AppState, technician: TechnicianRef) -> Result<SessionResponse> {
    let issued = state
        .sessions
        .issue(&technician)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(SessionResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        technician,
    })
}

/// POST /api/auth/link-codes - Issues a new link code.
pub async fn create_link_code(
    State(state): State<AppState>,
) -> (StatusCode, Json<LinkCodeResponse>) {
    let issued = state.link_codes.issue();
    (
        StatusCode::CREATED,
        Json(LinkCodeResponse {
            code: issued.code,
            secret: issued.secret,
            expires_at: issued.expires_at,
        }),
    )
}

/// GET /api/auth/link-codes/:code - Polls a link code. Once linked, the
/// code is consumed and a session token is returned.
pub async fn get_link_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LinkStatusResponse>> {
    let not_found = || ApiError::NotFound(format!("link code not found: {}", code));
    let secret = headers
        .get(LINK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(not_found)?;

    match state.link_codes.status(&code, secret).ok_or_else(not_found)? {
        LinkState::Pending => Ok(Json(LinkStatusResponse {
            status: "pending".into(),
            session: None,
        })),
        LinkState::Linked(_) => {
            let technician = state.link_codes.claim(&code, secret).ok_or_else(not_found)?;
            info!(technician = technician.id, "Dashboard session issued for linked technician");
            Ok(Json(LinkStatusResponse {
                status: "linked".into(),
                session: Some(session_for(&state, technician)?),
            }))
        }
    }
}

/// POST /api/auth/login - Password login acting as the configured owner.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let config = state.engine.config();
    let (Some(password), Some(owner_id)) = (config.auth.admin_password.as_deref(), config.admin.owner_id)
    else {
        return Err(ApiError::NotFound("password login is not enabled".into()));
    };
    if !constant_time_eq(password, &req.password) {
        warn!("Rejected dashboard password login");
        return Err(ApiError::Unauthorized("invalid credentials".into()));
    }
    let session = session_for(&state, TechnicianRef::new(owner_id, "Web Admin"))?;
    Ok(Json(session))
}

/// GET /api/auth/me - The technician behind the request's credentials.
pub async fn current_technician(Technician(technician): Technician) -> Json<TechnicianRef> {
    Json(technician)
}
