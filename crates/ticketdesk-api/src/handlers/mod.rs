//! API request handlers.

pub mod auth;
pub mod faqs;
pub mod health;
pub mod tickets;

pub use auth::*;
pub use faqs::*;
pub use health::*;
pub use tickets::*;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};

    use ticketdesk_core::auth::sign_init_data;
    use ticketdesk_core::testing::{MemoryBlobStore, RecordingGateway};
    use ticketdesk_core::{Engine, ExpiringCodes, HelpdeskConfig, SessionSigner};
    use ticketdesk_models::TechnicianRef;
    use ticketdesk_persistence::{MemoryTicketStore, TechnicianStore};

    use crate::config::ApiConfig;
    use crate::state::AppState;

    /// Allowlisted in [`test_config`].
    pub const TECH_ID: i64 = 501;

    pub struct TestApp {
        pub state: AppState,
        pub technicians: Arc<TechnicianStore>,
        pub user: Arc<RecordingGateway>,
        pub tech: Arc<RecordingGateway>,
        pub blobs: Arc<MemoryBlobStore>,
    }

    impl TestApp {
        /// `Authorization` value carrying a session for `id`.
        pub fn bearer_for(&self, id: i64, name: &str) -> HeaderValue {
            let issued = self
                .state
                .sessions
                .issue(&TechnicianRef::new(id, name))
                .unwrap();
            HeaderValue::from_str(&format!("Bearer {}", issued.token)).unwrap()
        }

        /// Session for the allowlisted technician Bob.
        pub fn bearer(&self) -> HeaderValue {
            self.bearer_for(TECH_ID, "Bob")
        }
    }

    /// Web App init data for `user_id`, signed with `bot_token`.
    pub fn init_data_for(user_id: i64, bot_token: &str) -> String {
        let user = format!(r#"{{"id":{},"first_name":"Web","last_name":"User"}}"#, user_id);
        sign_init_data(
            &[
                ("auth_date", &Utc::now().timestamp().to_string()),
                ("user", &user),
            ],
            bot_token,
        )
        .unwrap()
    }

    pub fn test_config() -> HelpdeskConfig {
        HelpdeskConfig::from_toml_str(
            r#"
[bot]
user_token = "123:abc"

[groups]
technician_group_id = -100

[admin]
owner_id = 1
level2_ids = [900]
technician_ids = [501]

[auth]
admin_password = "correct horse"

[features]
rating_prompt_delay_ms = 0

[[categories]]
id = "hardware"
label = "Hardware"
emoji = "🖨"

[[categories]]
id = "network"
label = "Network"
"#,
        )
        .unwrap()
    }

    pub fn make_test_app_with(edit: impl FnOnce(&mut HelpdeskConfig)) -> TestApp {
        let mut config = test_config();
        edit(&mut config);
        let user = Arc::new(RecordingGateway::new());
        let tech = Arc::new(RecordingGateway::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let technicians = Arc::new(TechnicianStore::in_memory());
        let api_config = ApiConfig::from_settings(&config.api);
        let engine = Engine::new(
            Arc::new(config),
            Arc::new(MemoryTicketStore::new()),
            Arc::clone(&technicians),
            blobs.clone(),
            user.clone(),
            tech.clone(),
        );
        TestApp {
            state: AppState::new(
                api_config,
                Arc::new(engine),
                Arc::new(ExpiringCodes::default()),
                Arc::new(SessionSigner::new(b"test-secret", Duration::hours(24))),
            ),
            technicians,
            user,
            tech,
            blobs,
        }
    }

    pub fn make_test_app() -> TestApp {
        make_test_app_with(|_| {})
    }
}
