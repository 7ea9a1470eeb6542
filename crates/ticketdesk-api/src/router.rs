//! Router configuration and server setup.

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::handlers;
use crate::state::AppState;

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Creates the API router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let upload_limit = state.config.upload_limit;

    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        // Queues
        .route("/api/tickets/open", get(handlers::list_open_tickets))
        .route("/api/tickets/archived", get(handlers::list_archived_tickets))
        .route("/api/tickets/categories", get(handlers::list_categories))
        // Single ticket
        .route("/api/tickets/:id", get(handlers::get_ticket))
        .route("/api/tickets/:id/read", post(handlers::mark_ticket_read))
        .route("/api/tickets/:id/reply", post(handlers::reply_to_ticket))
        .route(
            "/api/tickets/:id/media",
            post(handlers::send_ticket_media).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/tickets/:id/close", post(handlers::close_ticket))
        .route("/api/tickets/:id/escalate", post(handlers::escalate_ticket))
        .route("/api/tickets/:id/reopen", post(handlers::reopen_ticket))
        // FAQ
        .route("/api/faqs", get(handlers::list_faqs).post(handlers::create_faq))
        .route(
            "/api/faqs/:id",
            put(handlers::update_faq).delete(handlers::delete_faq),
        )
        // Authentication
        .route("/api/auth/link-codes", post(handlers::create_link_code))
        .route("/api/auth/link-codes/:code", get(handlers::get_link_code))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/me", get(handlers::current_technician))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
pub async fn serve(config: ApiConfig, state: AppState) -> Result<(), std::io::Error> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, create_router(state)).await
}
