//! Application state shared across handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use chrono::Utc;
use tracing::debug;

use ticketdesk_core::{verify_init_data, Engine, ExpiringCodes, SessionSigner};
use ticketdesk_models::TechnicianRef;

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Raw init data of the Telegram Web App the dashboard runs in.
pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: Arc<ApiConfig>,
    /// Ticket lifecycle engine.
    pub engine: Arc<Engine>,
    /// Pending technician link codes.
    pub link_codes: Arc<ExpiringCodes>,
    /// Dashboard session tokens.
    pub sessions: Arc<SessionSigner>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        engine: Arc<Engine>,
        link_codes: Arc<ExpiringCodes>,
        sessions: Arc<SessionSigner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            link_codes,
            sessions,
        }
    }

    /// Identity proven by the request's credentials. A bearer session token
    /// wins over Web App init data.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<TechnicianRef, ApiError> {
        if let Some(value) = headers.get(AUTHORIZATION) {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::Unauthorized("malformed Authorization header".into()))?;
            return self
                .sessions
                .verify(token)
                .map_err(|e| ApiError::Unauthorized(e.to_string()));
        }

        if let Some(value) = headers.get(INIT_DATA_HEADER) {
            let init_data = value
                .to_str()
                .map_err(|_| ApiError::Unauthorized("malformed init data header".into()))?;
            return self.verify_web_app(init_data);
        }

        Err(ApiError::Unauthorized(
            "missing authentication credentials".into(),
        ))
    }

    /// Init data is signed by whichever bot opened the Web App.
    fn verify_web_app(&self, init_data: &str) -> Result<TechnicianRef, ApiError> {
        let config = self.engine.config();
        let max_age = config.auth.init_data_max_age();
        let now = Utc::now();

        let mut tokens = vec![config.tech_token()];
        if config.has_separate_tech_bot() {
            tokens.push(config.bot.user_token.as_str());
        }

        let mut last_error = None;
        for token in tokens {
            match verify_init_data(init_data, token, max_age, now) {
                Ok(technician) => return Ok(technician),
                Err(e) => last_error = Some(e),
            }
        }
        Err(ApiError::Unauthorized(
            last_error.map_or_else(|| "invalid init data".to_string(), |e| e.to_string()),
        ))
    }
}

/// The technician acting through the dashboard: authenticated, and known
/// to the configuration or the technician registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Technician(pub TechnicianRef);

#[async_trait]
impl FromRequestParts<AppState> for Technician {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = state.authenticate(&parts.headers)?;
        if !state.engine.is_technician(identity.id).await {
            debug!(user_id = identity.id, "Rejected dashboard caller who is not a technician");
            return Err(ApiError::Forbidden("not a technician".into()));
        }
        Ok(Technician(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    use crate::handlers::test_support::{init_data_for, make_test_app};

    #[test]
    fn test_authenticate_requires_credentials() {
        let app = make_test_app();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            app.state.authenticate(&headers),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert("x-technician-id", HeaderValue::from_static("501"));
        assert!(matches!(
            app.state.authenticate(&headers),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Ym9iOmJvYg=="));
        assert!(matches!(
            app.state.authenticate(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_authenticate_accepts_session_and_init_data() {
        let app = make_test_app();
        let issued = app
            .state
            .sessions
            .issue(&TechnicianRef::new(501, "Bob"))
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", issued.token)).unwrap(),
        );
        assert_eq!(app.state.authenticate(&headers).unwrap().id, 501);

        let mut headers = HeaderMap::new();
        headers.insert(
            INIT_DATA_HEADER,
            HeaderValue::from_str(&init_data_for(502, "123:abc")).unwrap(),
        );
        assert_eq!(app.state.authenticate(&headers).unwrap().id, 502);

        let mut headers = HeaderMap::new();
        headers.insert(
            INIT_DATA_HEADER,
            HeaderValue::from_str(&init_data_for(502, "999:other")).unwrap(),
        );
        assert!(matches!(
            app.state.authenticate(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
