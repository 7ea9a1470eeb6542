//! Technician registry persisted as a single JSON document.

use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::info;
use ticketdesk_models::Technician;

use crate::atomic::{read_json_optional, write_json_blocking_pool};
use crate::error::Result;

/// Technicians who linked their account, keyed by Telegram id.
pub struct TechnicianStore {
    path: Option<PathBuf>,
    technicians: RwLock<Vec<Technician>>,
}

impl TechnicianStore {
    /// Opens the registry stored at `base_path/technicians.json`.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let path = base_path.into().join("technicians.json");
        let technicians: Vec<Technician> = read_json_optional(&path)?.unwrap_or_default();
        info!(count = technicians.len(), "Technician registry loaded");
        Ok(Self {
            path: Some(path),
            technicians: RwLock::new(technicians),
        })
    }

    /// Creates a registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            technicians: RwLock::new(Vec::new()),
        }
    }

    /// Inserts or updates a technician. Returns true if newly linked.
    pub async fn upsert(&self, technician: Technician) -> Result<bool> {
        let mut technicians = self.technicians.write().await;
        let is_new = match technicians
            .iter_mut()
            .find(|t| t.telegram_id == technician.telegram_id)
        {
            Some(existing) => {
                existing.name = technician.name;
                existing.username = technician.username;
                false
            }
            None => {
                technicians.push(technician);
                true
            }
        };
        self.persist(&technicians).await?;
        Ok(is_new)
    }

    /// Removes a technician. Returns true if one was removed.
    pub async fn remove(&self, telegram_id: i64) -> Result<bool> {
        let mut technicians = self.technicians.write().await;
        let before = technicians.len();
        technicians.retain(|t| t.telegram_id != telegram_id);
        let removed = technicians.len() != before;
        if removed {
            self.persist(&technicians).await?;
        }
        Ok(removed)
    }

    pub async fn get(&self, telegram_id: i64) -> Option<Technician> {
        self.technicians
            .read()
            .await
            .iter()
            .find(|t| t.telegram_id == telegram_id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<Technician> {
        self.technicians.read().await.clone()
    }

    async fn persist(&self, technicians: &[Technician]) -> Result<()> {
        match &self.path {
            Some(path) => write_json_blocking_pool(path.clone(), &technicians).await,
            None => Ok(()),
        }
    }
}
