//! Category taxonomy configured for closure.

use serde::{Deserialize, Serialize};

/// A category label technicians can apply to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Category {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            emoji: None,
            description: None,
        }
    }

    /// Label with the emoji prefix, if any.
    pub fn display(&self) -> String {
        match &self.emoji {
            Some(emoji) => format!("{} {}", emoji, self.label),
            None => self.label.clone(),
        }
    }
}

/// Resolves category ids to display labels, keeping unknown ids verbatim.
pub fn category_labels(taxonomy: &[Category], ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| {
            taxonomy
                .iter()
                .find(|c| &c.id == id)
                .map(Category::display)
                .unwrap_or_else(|| id.clone())
        })
        .collect()
}
