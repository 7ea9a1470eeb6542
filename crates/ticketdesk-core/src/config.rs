//! Helpdesk configuration.
//!
//! Configuration is read once at startup from a TOML file and then shared
//! immutably behind an `Arc`.
//!
//! # Storage Structure
//!
//! ```text
//! ~/.ticketdesk/
//! ├── config.toml   # Helpdesk configuration
//! └── data/         # Ticket documents, sequence and technician registry
//! ```
//!
//! # Environment Variables
//!
//! - `TICKETDESK_STATE_DIR`: Override the base state directory
//! - `TICKETDESK_CONFIG`: Override the config file path
//! - `TICKETDESK_USER_BOT_TOKEN`, `TICKETDESK_TECH_BOT_TOKEN`: Bot tokens
//! - `TICKETDESK_TECH_GROUP_ID`, `TICKETDESK_ARCHIVE_GROUP_ID`: Group chat ids
//! - `TICKETDESK_SESSION_SECRET`, `TICKETDESK_ADMIN_PASSWORD`: Dashboard auth
//! - `TICKETDESK_S3_ENDPOINT`, `AWS_REGION`: Object storage location
//! - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`: Object storage credentials

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use ticketdesk_models::{Category, Faq};

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "TICKETDESK_STATE_DIR";

/// Environment variable for the config file path.
pub const CONFIG_PATH_ENV: &str = "TICKETDESK_CONFIG";

pub const USER_TOKEN_ENV: &str = "TICKETDESK_USER_BOT_TOKEN";
pub const TECH_TOKEN_ENV: &str = "TICKETDESK_TECH_BOT_TOKEN";
pub const TECH_GROUP_ENV: &str = "TICKETDESK_TECH_GROUP_ID";
pub const ARCHIVE_GROUP_ENV: &str = "TICKETDESK_ARCHIVE_GROUP_ID";
pub const SESSION_SECRET_ENV: &str = "TICKETDESK_SESSION_SECRET";
pub const ADMIN_PASSWORD_ENV: &str = "TICKETDESK_ADMIN_PASSWORD";
pub const S3_ENDPOINT_ENV: &str = "TICKETDESK_S3_ENDPOINT";
pub const S3_ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const S3_SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const S3_REGION_ENV: &str = "AWS_REGION";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".ticketdesk";

/// Get the ticketdesk state directory.
///
/// The state directory is determined by:
/// 1. `TICKETDESK_STATE_DIR` environment variable if set
/// 2. `~/.ticketdesk` if home directory is available
/// 3. `.ticketdesk` in current directory as fallback
pub fn state_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_STATE_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
        })
}

/// Default config file location, honouring `TICKETDESK_CONFIG`.
pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join("config.toml"))
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub user_token: String,
    /// Technician bot token. Falls back to the user token when unset.
    pub tech_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    pub technician_group_id: i64,
    pub archive_group_id: Option<i64>,
    /// The forum's "General" thread, never bound to a ticket.
    pub general_topic_id: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub owner_id: Option<i64>,
    pub level2_ids: Vec<i64>,
    /// Technicians allowed to use technician commands in private chats and
    /// the dashboard without linking first.
    pub technician_ids: Vec<i64>,
}

/// Feature switches and lifecycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub auto_create_ticket: bool,
    pub enable_ratings: bool,
    pub enable_categorization: bool,
    pub require_categorization: bool,
    pub enable_archiving: bool,
    /// Whether escalated tickets keep receiving the user's messages.
    pub escalated_is_active: bool,
    /// Hours a closed ticket's thread is kept. 0 deletes on close.
    pub topic_cleanup_hours: u32,
    pub rating_prompt_delay_ms: u64,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            auto_create_ticket: true,
            enable_ratings: true,
            enable_categorization: false,
            require_categorization: false,
            enable_archiving: false,
            escalated_is_active: true,
            topic_cleanup_hours: 24,
            rating_prompt_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebAppConfig {
    /// Dashboard URL offered to technicians on new-ticket notices.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Fs,
    S3,
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend.
    pub dir: Option<PathBuf>,
    /// Base URL under which stored blobs are reachable.
    pub public_base_url: Option<String>,
    /// S3-compatible endpoint. AWS when unset.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Path-style addressing, needed by MinIO and LocalStack.
    pub force_path_style: bool,
    /// Origins allowed to load media straight from the bucket.
    pub cors_origins: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            dir: None,
            public_base_url: None,
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: Some("telegram-media".to_string()),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: true,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    /// Dashboard origins; `*` allows any.
    pub cors_origins: Vec<String>,
    pub max_upload_mb: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            cors_origins: vec!["*".to_string()],
            max_upload_mb: 50,
        }
    }
}

/// Dashboard authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for session tokens. Random per process when unset.
    pub session_secret: Option<String>,
    pub session_ttl_hours: u32,
    /// Oldest Telegram Web App init data still accepted.
    pub init_data_max_age_secs: u64,
    /// Enables `POST /api/auth/login`, acting as `admin.owner_id`.
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_hours: 24,
            init_data_max_age_secs: 86_400,
            admin_password: None,
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_ttl_hours.max(1)))
    }

    pub fn init_data_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.init_data_max_age_secs.min(i64::MAX as u64) as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub outbound_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { outbound_secs: 15 }
    }
}

/// FAQ entry loaded into an empty FAQ collection at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqSeed {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub order: u32,
}

impl FaqSeed {
    pub fn to_faq(&self) -> Faq {
        let faq = Faq::new(self.question.clone(), self.answer.clone()).with_order(self.order);
        match &self.category {
            Some(category) => faq.with_category(category.clone()),
            None => faq,
        }
    }
}

/// Full helpdesk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpdeskConfig {
    pub bot: BotConfig,
    pub groups: GroupsConfig,
    pub admin: AdminConfig,
    pub features: FeatureFlags,
    pub categories: Vec<Category>,
    pub faqs: Vec<FaqSeed>,
    pub webapp: WebAppConfig,
    pub storage: StorageConfig,
    pub api: ApiSettings,
    pub auth: AuthConfig,
    pub timeouts: TimeoutConfig,
}

impl HelpdeskConfig {
    /// Loads the file at `path` (missing file means defaults), applies
    /// environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        info!(
            path = %path.display(),
            categories = config.categories.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(USER_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.bot.user_token = token;
        }
        if let Some(token) = lookup(TECH_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.bot.tech_token = Some(token);
        }
        if let Some(raw) = lookup(TECH_GROUP_ENV) {
            self.groups.technician_group_id = parse_chat_id(TECH_GROUP_ENV, &raw)?;
        }
        if let Some(raw) = lookup(ARCHIVE_GROUP_ENV) {
            self.groups.archive_group_id = Some(parse_chat_id(ARCHIVE_GROUP_ENV, &raw)?);
        }
        if let Some(secret) = lookup(SESSION_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.auth.session_secret = Some(secret);
        }
        if let Some(password) = lookup(ADMIN_PASSWORD_ENV).filter(|p| !p.is_empty()) {
            self.auth.admin_password = Some(password);
        }
        if let Some(endpoint) = lookup(S3_ENDPOINT_ENV).filter(|e| !e.is_empty()) {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(region) = lookup(S3_REGION_ENV).filter(|r| !r.is_empty()) {
            self.storage.region = region;
        }
        if let Some(key) = lookup(S3_ACCESS_KEY_ENV).filter(|k| !k.is_empty()) {
            self.storage.access_key_id = Some(key);
        }
        if let Some(secret) = lookup(S3_SECRET_KEY_ENV).filter(|k| !k.is_empty()) {
            self.storage.secret_access_key = Some(secret);
        }
        Ok(())
    }

    /// Checks required fields and the category taxonomy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.user_token.trim().is_empty() {
            return Err(ConfigError::Invalid("bot.user_token is required".into()));
        }
        if self.groups.technician_group_id == 0 {
            return Err(ConfigError::Invalid(
                "groups.technician_group_id is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.id.trim().is_empty() {
                return Err(ConfigError::Invalid("category id must not be empty".into()));
            }
            if category.id == "done" || category.id.contains(':') {
                return Err(ConfigError::Invalid(format!(
                    "reserved category id: {}",
                    category.id
                )));
            }
            if !seen.insert(category.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate category id: {}",
                    category.id
                )));
            }
        }

        for seed in &self.faqs {
            seed.to_faq().validate().map_err(|e| {
                ConfigError::Invalid(format!("faq {:?}: {}", seed.question, e))
            })?;
        }

        if self.auth.admin_password.is_some() && self.admin.owner_id.is_none() {
            return Err(ConfigError::Invalid(
                "auth.admin_password needs admin.owner_id".into(),
            ));
        }

        if self.categorization_required() && self.categories.is_empty() {
            return Err(ConfigError::Invalid(
                "require_categorization needs at least one category".into(),
            ));
        }
        Ok(())
    }

    /// Technician bot token, falling back to the user bot token.
    pub fn tech_token(&self) -> &str {
        self.bot
            .tech_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.bot.user_token)
    }

    /// True when a separate technician bot is configured.
    pub fn has_separate_tech_bot(&self) -> bool {
        self.tech_token() != self.bot.user_token
    }

    pub fn categorization_required(&self) -> bool {
        self.features.enable_categorization && self.features.require_categorization
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.outbound_secs.max(1))
    }

    pub fn rating_prompt_delay(&self) -> Duration {
        Duration::from_millis(self.features.rating_prompt_delay_ms)
    }

    /// Topic retention after closure.
    pub fn topic_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.features.topic_cleanup_hours))
    }

    /// Directory for ticket documents.
    pub fn data_dir(&self) -> PathBuf {
        state_dir().join("data")
    }

    /// Directory for the filesystem blob backend.
    pub fn blob_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .unwrap_or_else(|| state_dir().join("blobs"))
    }

    pub fn is_level2(&self, telegram_id: i64) -> bool {
        self.admin.level2_ids.contains(&telegram_id)
    }

    /// True for ids the configuration itself trusts as technicians: the
    /// owner, level-2 staff and the technician allowlist.
    pub fn is_technician(&self, telegram_id: i64) -> bool {
        self.admin.owner_id == Some(telegram_id)
            || self.is_level2(telegram_id)
            || self.admin.technician_ids.contains(&telegram_id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }
}

fn parse_chat_id(key: &str, raw: &str) -> Result<i64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be an integer, got {:?}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[bot]
user_token = "123:abc"

[groups]
technician_group_id = -1001
archive_group_id = -1002

[admin]
owner_id = 1
level2_ids = [7, 8]
technician_ids = [9]

[features]
enable_categorization = true
require_categorization = true
topic_cleanup_hours = 0

[[categories]]
id = "hardware"
label = "Hardware"
emoji = "🖨"

[[categories]]
id = "network"
label = "Network"

[[faqs]]
question = "How do I reset my password?"
answer = "Go to the login page and click Forgot Password."
category = "Account"
order = 1

[[faqs]]
question = "What are your business hours?"
answer = "Monday to Friday, 9am to 6pm."
"#;

    #[test]
    fn test_parse_sample() {
        let config = HelpdeskConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.groups.technician_group_id, -1001);
        assert_eq!(config.admin.level2_ids, vec![7, 8]);
        assert_eq!(config.features.topic_cleanup_hours, 0);
        assert!(config.features.enable_ratings);
        assert!(config.categorization_required());
        assert_eq!(config.categories[0].display(), "🖨 Hardware");
        config.validate().unwrap();
    }

    #[test]
    fn test_trusted_technicians() {
        let config = HelpdeskConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.is_technician(1));
        assert!(config.is_technician(7));
        assert!(config.is_technician(9));
        assert!(!config.is_technician(42));
        assert!(!HelpdeskConfig::default().is_technician(0));
    }

    #[test]
    fn test_tech_token_falls_back() {
        let mut config = HelpdeskConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.tech_token(), "123:abc");
        assert!(!config.has_separate_tech_bot());
        config.bot.tech_token = Some("456:def".into());
        assert_eq!(config.tech_token(), "456:def");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HelpdeskConfig::default();
        let env: HashMap<&str, &str> = [
            (USER_TOKEN_ENV, "tok"),
            (TECH_GROUP_ENV, "-42"),
            (ARCHIVE_GROUP_ENV, "-43"),
            (SESSION_SECRET_ENV, "s3cret"),
            (S3_ENDPOINT_ENV, "http://localstack:4566"),
            (S3_ACCESS_KEY_ENV, "test"),
            (S3_SECRET_KEY_ENV, "test-secret"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bot.user_token, "tok");
        assert_eq!(config.groups.technician_group_id, -42);
        assert_eq!(config.groups.archive_group_id, Some(-43));
        assert_eq!(config.auth.session_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.session_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://localstack:4566"));
        assert_eq!(config.storage.access_key_id.as_deref(), Some("test"));
        assert_eq!(config.storage.secret_access_key.as_deref(), Some("test-secret"));
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.bucket.as_deref(), Some("telegram-media"));
    }

    #[test]
    fn test_bad_env_group_id() {
        let mut config = HelpdeskConfig::default();
        let err = config
            .apply_overrides(|k| (k == TECH_GROUP_ENV).then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validation_rules() {
        assert!(HelpdeskConfig::default().validate().is_err());

        let mut config = HelpdeskConfig::from_toml_str(SAMPLE).unwrap();
        config.categories.push(Category::new("network", "Dup"));
        assert!(config.validate().is_err());

        config.categories.clear();
        assert!(config.validate().is_err());
        config.categories.push(Category::new("network", "Network"));

        config.auth.admin_password = Some("hunter2".into());
        config.admin.owner_id = None;
        assert!(config.validate().is_err());
        config.admin.owner_id = Some(1);
        config.validate().unwrap();
        config.categories.clear();

        config.features.require_categorization = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = HelpdeskConfig::load(&path).unwrap();
        assert_eq!(config.categories.len(), 2);
    }

    #[test]
    fn test_faq_seeds() {
        let mut config = HelpdeskConfig::from_toml_str(SAMPLE).unwrap();
        let faqs: Vec<Faq> = config.faqs.iter().map(FaqSeed::to_faq).collect();
        assert_eq!(faqs[0].category, "Account");
        assert_eq!(faqs[0].order, 1);
        assert_eq!(faqs[1].category, "General");

        config.faqs[1].answer = "Soon".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
