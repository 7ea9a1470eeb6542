//! Frequently asked questions offered by the user bot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category assigned when none is given.
pub const DEFAULT_FAQ_CATEGORY: &str = "General";

pub const QUESTION_MIN_CHARS: usize = 5;
pub const QUESTION_MAX_CHARS: usize = 200;
pub const ANSWER_MIN_CHARS: usize = 10;
pub const ANSWER_MAX_CHARS: usize = 4000;
/// Category names travel inside callback data, which Telegram caps at 64 bytes.
pub const CATEGORY_MAX_BYTES: usize = 48;

/// A question and its canned answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub category: String,
    /// Position within the category, lowest first.
    #[serde(default)]
    pub order: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Faq {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            question: question.into().trim().to_string(),
            answer: answer.into(),
            category: DEFAULT_FAQ_CATEGORY.to_string(),
            order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into().trim().to_string();
        if !category.is_empty() {
            self.category = category;
        }
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Checks length limits. Returns the first violation.
    pub fn validate(&self) -> Result<(), String> {
        let question = self.question.trim().chars().count();
        if !(QUESTION_MIN_CHARS..=QUESTION_MAX_CHARS).contains(&question) {
            return Err(format!(
                "question must be {}-{} characters",
                QUESTION_MIN_CHARS, QUESTION_MAX_CHARS
            ));
        }
        let answer = self.answer.chars().count();
        if !(ANSWER_MIN_CHARS..=ANSWER_MAX_CHARS).contains(&answer) {
            return Err(format!(
                "answer must be {}-{} characters",
                ANSWER_MIN_CHARS, ANSWER_MAX_CHARS
            ));
        }
        if self.category.trim().is_empty() || self.category.len() > CATEGORY_MAX_BYTES {
            return Err(format!("category must be 1-{} bytes", CATEGORY_MAX_BYTES));
        }
        Ok(())
    }

    /// Case-insensitive substring match on question or answer.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        !query.is_empty()
            && (self.question.to_lowercase().contains(&query)
                || self.answer.to_lowercase().contains(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let faq = Faq::new("  How do I reset my password? ", "Use the Forgot Password link.");
        assert_eq!(faq.question, "How do I reset my password?");
        assert_eq!(faq.category, DEFAULT_FAQ_CATEGORY);
        assert!(faq.is_active);
        assert_eq!(faq.id.len(), 32);
        faq.validate().unwrap();

        assert_eq!(faq.clone().with_category("  ").category, DEFAULT_FAQ_CATEGORY);
        assert_eq!(faq.with_category("Account").category, "Account");
    }

    #[test]
    fn test_validation_limits() {
        assert!(Faq::new("Why?", "Because it is so.").validate().is_err());
        assert!(Faq::new("Why is that?", "Because").validate().is_err());
        assert!(Faq::new("Why is that?", "x".repeat(4001)).validate().is_err());
        assert!(Faq::new("Why is that?", "Because it is so.")
            .with_category("c".repeat(49))
            .validate()
            .is_err());
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let faq = Faq::new("How do I reset my PASSWORD?", "Open Settings and pick Security.");
        assert!(faq.matches("password"));
        assert!(faq.matches("settings"));
        assert!(!faq.matches("printer"));
        assert!(!faq.matches("  "));
    }
}
