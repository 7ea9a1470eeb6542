//! FAQ entries persisted as a single JSON document.

use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;
use ticketdesk_models::Faq;

use crate::atomic::{read_json_optional, write_json_blocking_pool};
use crate::error::Result;

/// Matches returned by [`FaqStore::search`].
pub const FAQ_SEARCH_LIMIT: usize = 10;

/// FAQ collection keyed by id.
pub struct FaqStore {
    path: Option<PathBuf>,
    faqs: RwLock<Vec<Faq>>,
}

fn sorted(mut faqs: Vec<Faq>) -> Vec<Faq> {
    faqs.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.question.cmp(&b.question)));
    faqs
}

impl FaqStore {
    /// Opens the collection stored at `base_path/faqs.json`.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let path = base_path.into().join("faqs.json");
        let faqs: Vec<Faq> = read_json_optional(&path)?.unwrap_or_default();
        info!(count = faqs.len(), "FAQ collection loaded");
        Ok(Self {
            path: Some(path),
            faqs: RwLock::new(faqs),
        })
    }

    /// Creates a collection that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            faqs: RwLock::new(Vec::new()),
        }
    }

    /// Inserts the entries when the collection is empty. Returns how many
    /// were inserted.
    pub async fn seed(&self, entries: Vec<Faq>) -> Result<usize> {
        let mut faqs = self.faqs.write().await;
        if !faqs.is_empty() || entries.is_empty() {
            return Ok(0);
        }
        let count = entries.len();
        faqs.extend(entries);
        self.persist(&faqs).await?;
        info!(count, "FAQ collection seeded");
        Ok(count)
    }

    /// Inserts or replaces an entry by id. Returns true if newly inserted.
    pub async fn upsert(&self, mut faq: Faq) -> Result<bool> {
        let mut faqs = self.faqs.write().await;
        let is_new = match faqs.iter_mut().find(|f| f.id == faq.id) {
            Some(existing) => {
                faq.created_at = existing.created_at;
                faq.updated_at = Utc::now();
                *existing = faq;
                false
            }
            None => {
                faqs.push(faq);
                true
            }
        };
        self.persist(&faqs).await?;
        Ok(is_new)
    }

    /// Removes an entry. Returns true if one was removed.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut faqs = self.faqs.write().await;
        let before = faqs.len();
        faqs.retain(|f| f.id != id);
        let removed = faqs.len() != before;
        if removed {
            self.persist(&faqs).await?;
        }
        Ok(removed)
    }

    /// Active entry by id.
    pub async fn get_active(&self, id: &str) -> Option<Faq> {
        self.faqs
            .read()
            .await
            .iter()
            .find(|f| f.id == id && f.is_active)
            .cloned()
    }

    /// Every entry, inactive ones included, in display order.
    pub async fn list(&self) -> Vec<Faq> {
        sorted(self.faqs.read().await.clone())
    }

    /// Distinct categories of active entries, alphabetical.
    pub async fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .faqs
            .read()
            .await
            .iter()
            .filter(|f| f.is_active)
            .map(|f| f.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Active entries of one category in display order.
    pub async fn in_category(&self, category: &str) -> Vec<Faq> {
        let faqs = self.faqs.read().await;
        sorted(
            faqs.iter()
                .filter(|f| f.is_active && f.category == category)
                .cloned()
                .collect(),
        )
    }

    /// Active entries whose question or answer contains `query`, at most
    /// [`FAQ_SEARCH_LIMIT`].
    pub async fn search(&self, query: &str) -> Vec<Faq> {
        let faqs = self.faqs.read().await;
        let mut matches = sorted(
            faqs.iter()
                .filter(|f| f.is_active && f.matches(query))
                .cloned()
                .collect(),
        );
        matches.truncate(FAQ_SEARCH_LIMIT);
        matches
    }

    async fn persist(&self, faqs: &[Faq]) -> Result<()> {
        match &self.path {
            Some(path) => write_json_blocking_pool(path.clone(), &faqs).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn faq(question: &str, category: &str, order: u32) -> Faq {
        Faq::new(question, "An answer long enough to be valid.")
            .with_category(category)
            .with_order(order)
    }

    #[tokio::test]
    async fn test_seed_only_when_empty_and_reload() {
        let dir = tempdir().unwrap();
        let store = FaqStore::open(dir.path()).unwrap();
        assert_eq!(store.seed(vec![faq("Where is the office?", "General", 1)]).await.unwrap(), 1);
        assert_eq!(store.seed(vec![faq("Second seed entry?", "General", 2)]).await.unwrap(), 0);

        let reloaded = FaqStore::open(dir.path()).unwrap();
        let list = reloaded.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].question, "Where is the office?");
    }

    #[tokio::test]
    async fn test_categories_and_ordering_skip_inactive() {
        let store = FaqStore::in_memory();
        store.upsert(faq("Printer jams often?", "Support", 2)).await.unwrap();
        store.upsert(faq("How to open a ticket?", "Support", 1)).await.unwrap();
        store.upsert(faq("Password reset steps?", "Account", 0)).await.unwrap();
        let mut hidden = faq("Old VPN instructions?", "Network", 0);
        hidden.is_active = false;
        store.upsert(hidden.clone()).await.unwrap();

        assert_eq!(store.categories().await, vec!["Account", "Support"]);
        let support: Vec<String> = store
            .in_category("Support")
            .await
            .into_iter()
            .map(|f| f.question)
            .collect();
        assert_eq!(support, vec!["How to open a ticket?", "Printer jams often?"]);
        assert!(store.get_active(&hidden.id).await.is_none());
        assert_eq!(store.list().await.len(), 4);
    }

    #[tokio::test]
    async fn test_search_limit_and_case() {
        let store = FaqStore::in_memory();
        for i in 0..12 {
            store
                .upsert(faq(&format!("Printer question {}?", i), "Support", i))
                .await
                .unwrap();
        }
        store.upsert(faq("Password reset steps?", "Account", 0)).await.unwrap();

        assert_eq!(store.search("PRINTER").await.len(), FAQ_SEARCH_LIMIT);
        assert_eq!(store.search("password").await.len(), 1);
        assert!(store.search("fax").await.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_remove() {
        let store = FaqStore::in_memory();
        let mut entry = faq("Where is the office?", "General", 0);
        assert!(store.upsert(entry.clone()).await.unwrap());
        entry.answer = "Second floor, next to the lifts.".into();
        assert!(!store.upsert(entry.clone()).await.unwrap());
        assert_eq!(
            store.get_active(&entry.id).await.unwrap().answer,
            "Second floor, next to the lifts."
        );
        assert!(store.remove(&entry.id).await.unwrap());
        assert!(!store.remove(&entry.id).await.unwrap());
    }
}
