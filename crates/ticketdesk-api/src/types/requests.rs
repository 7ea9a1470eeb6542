//! Request DTOs for the API.

use serde::Deserialize;

/// Dashboard reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRequest {
    pub message: String,
}

/// Close request. Categories are required when categorization is mandatory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloseRequest {
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EscalateRequest {
    pub reason: Option<String>,
}

/// Archived list query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchivedQuery {
    /// 1-based page number.
    pub page: Option<usize>,
}

/// Password login for the web admin.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// FAQ create or update. Omitted fields keep their defaults (or, on update,
/// their current values).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FaqRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub category: Option<String>,
    pub order: Option<u32>,
    pub is_active: Option<bool>,
}
