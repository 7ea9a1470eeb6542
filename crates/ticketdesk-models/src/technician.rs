//! Technicians linked to the technician bot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::TechnicianRef;

/// A technician who linked their Telegram account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technician {
    pub telegram_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub linked_at: DateTime<Utc>,
}

impl Technician {
    pub fn new(telegram_id: i64, name: impl Into<String>) -> Self {
        Self {
            telegram_id,
            name: name.into(),
            username: None,
            linked_at: Utc::now(),
        }
    }

    /// Snapshot stored on transcript entries.
    pub fn to_ref(&self) -> TechnicianRef {
        TechnicianRef::new(self.telegram_id, self.name.clone())
    }
}
