//! Runtime settings of the dashboard server.

use std::time::Instant;

use ticketdesk_core::config::ApiSettings;

const MIB: usize = 1024 * 1024;

/// Resolved server settings plus the start instant used by `/api/health`.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Largest accepted multipart body, in bytes.
    pub upload_limit: usize,
    started: Instant,
}

impl ApiConfig {
    /// Builds the server settings from the `[api]` section.
    pub fn from_settings(settings: &ApiSettings) -> Self {
        let origins = settings
            .cors_origins
            .iter()
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        Self {
            host: settings.host.clone(),
            port: settings.port,
            cors_origins: origins,
            upload_limit: settings.max_upload_mb.max(1).saturating_mul(MIB),
            started: Instant::now(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when any origin may call the API.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_settings(&ApiSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_settings() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8765");
        assert!(config.allows_any_origin());
        assert_eq!(config.upload_limit, 50 * MIB);
    }

    #[test]
    fn test_origins_normalized() {
        let settings = ApiSettings {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["https://desk.example.com/".into(), "  ".into()],
            max_upload_mb: 0,
        };
        let config = ApiConfig::from_settings(&settings);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.cors_origins, vec!["https://desk.example.com".to_string()]);
        assert!(!config.allows_any_origin());
        assert_eq!(config.upload_limit, MIB);
    }
}
