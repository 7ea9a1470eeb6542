//! FAQ management for the dashboard.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use ticketdesk_models::Faq;

use crate::error::{ApiError, Result};
use crate::state::{AppState, Technician};
use crate::types::FaqRequest;

fn apply(mut faq: Faq, req: FaqRequest) -> Result<Faq> {
    if let Some(question) = req.question {
        faq.question = question.trim().to_string();
    }
    if let Some(answer) = req.answer {
        faq.answer = answer;
    }
    if let Some(category) = req.category {
        faq = faq.with_category(category);
    }
    if let Some(order) = req.order {
        faq.order = order;
    }
    if let Some(is_active) = req.is_active {
        faq.is_active = is_active;
    }
    faq.validate().map_err(ApiError::BadRequest)?;
    Ok(faq)
}

/// GET /api/faqs - Every FAQ entry, inactive ones included.
pub async fn list_faqs(
    State(state): State<AppState>,
    _technician: Technician,
) -> Json<Vec<Faq>> {
    Json(state.engine.faqs().list().await)
}

/// POST /api/faqs - Creates an entry.
pub async fn create_faq(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Json(req): Json<FaqRequest>,
) -> Result<(StatusCode, Json<Faq>)> {
    let (Some(question), Some(answer)) = (req.question.clone(), req.answer.clone()) else {
        return Err(ApiError::BadRequest("question and answer are required".into()));
    };
    let faq = apply(Faq::new(question, answer), req)?;
    state.engine.faqs().upsert(faq.clone()).await?;
    info!(faq_id = %faq.id, technician = technician.id, "FAQ created");
    Ok((StatusCode::CREATED, Json(faq)))
}

/// PUT /api/faqs/:id - Updates the given fields of an entry.
pub async fn update_faq(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Path(id): Path<String>,
    Json(req): Json<FaqRequest>,
) -> Result<Json<Faq>> {
    let existing = state
        .engine
        .faqs()
        .list()
        .await
        .into_iter()
        .find(|f| f.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("faq not found: {}", id)))?;
    let faq = apply(existing, req)?;
    state.engine.faqs().upsert(faq.clone()).await?;
    info!(faq_id = %faq.id, technician = technician.id, "FAQ updated");
    Ok(Json(faq))
}

/// DELETE /api/faqs/:id - Removes an entry.
pub async fn delete_faq(
    State(state): State<AppState>,
    Technician(technician): Technician,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.engine.faqs().remove(&id).await? {
        return Err(ApiError::NotFound(format!("faq not found: {}", id)));
    }
    info!(faq_id = %id, technician = technician.id, "FAQ deleted");
    Ok(StatusCode::NO_CONTENT)
}
