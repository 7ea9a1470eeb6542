//! FAQ navigation for the user bot.
//!
//! Buttons carry `faq:menu`, `faq:category:<name>` or `faq:<id>`. Each press
//! replaces the message it came from, so browsing stays in one message.

use ticketdesk_models::Faq;

use crate::gateway::{Button, Keyboard, OutboundText};
use crate::markup::{escape, truncate, MESSAGE_LIMIT};

pub const NO_FAQS: &str = "❌ No FAQs available at the moment.";
pub const FAQ_NOT_FOUND: &str = "❌ FAQ not found";

const MENU_HEADER: &str = "📚 <b>Frequently Asked Questions</b>\n\nPlease select a category:";
const SEPARATOR: &str = "─────────────────";
const NEED_HELP: &str =
    "💡 <b>Need more help?</b>\nSend me a direct message to create a support ticket!";

/// Button labels longer than this are shortened.
const QUESTION_LABEL_CHARS: usize = 60;

/// Parsed FAQ button payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaqCallback {
    Menu,
    Category(String),
    Show(String),
}

impl FaqCallback {
    pub fn parse(data: &str) -> Option<Self> {
        let rest = data.strip_prefix("faq:")?;
        if rest == "menu" {
            return Some(FaqCallback::Menu);
        }
        if let Some(category) = rest.strip_prefix("category:") {
            return (!category.is_empty()).then(|| FaqCallback::Category(category.to_string()));
        }
        (!rest.is_empty() && !rest.contains(':')).then(|| FaqCallback::Show(rest.to_string()))
    }

    pub fn data(&self) -> String {
        match self {
            FaqCallback::Menu => "faq:menu".to_string(),
            FaqCallback::Category(category) => format!("faq:category:{}", category),
            FaqCallback::Show(id) => format!("faq:{}", id),
        }
    }
}

fn question_button(faq: &Faq) -> Vec<Button> {
    vec![Button::callback(
        format!("❓ {}", truncate(&faq.question, QUESTION_LABEL_CHARS)),
        FaqCallback::Show(faq.id.clone()).data(),
    )]
}

fn back_button(label: &str, target: FaqCallback) -> Vec<Button> {
    vec![Button::callback(label, target.data())]
}

/// Category menu, or `None` when there is nothing to show.
pub fn menu(categories: &[String]) -> Option<OutboundText> {
    if categories.is_empty() {
        return None;
    }
    let rows = categories
        .iter()
        .map(|c| {
            vec![Button::callback(
                format!("📁 {}", c),
                FaqCallback::Category(c.clone()).data(),
            )]
        })
        .collect();
    Some(OutboundText::html(MENU_HEADER).with_keyboard(Keyboard::new(rows)))
}

/// Questions of one category, or `None` when it has no active entries.
pub fn category_page(category: &str, faqs: &[Faq]) -> Option<OutboundText> {
    if faqs.is_empty() {
        return None;
    }
    let mut rows: Vec<Vec<Button>> = faqs.iter().map(question_button).collect();
    rows.push(back_button("⬅️ All categories", FaqCallback::Menu));
    Some(
        OutboundText::html(format!(
            "📁 <b>{}</b>\n\nSelect a question:",
            escape(category)
        ))
        .with_keyboard(Keyboard::new(rows)),
    )
}

/// A question with its answer and a way back to its category.
pub fn answer(faq: &Faq) -> OutboundText {
    let keyboard = Keyboard::new(vec![back_button(
        "⬅️ Back",
        FaqCallback::Category(faq.category.clone()),
    )]);
    let html = format!(
        "<b>{}</b>\n\n{}\n\n{}\n{}",
        escape(&faq.question),
        escape(&faq.answer),
        SEPARATOR,
        NEED_HELP
    );
    if html.chars().count() <= MESSAGE_LIMIT {
        return OutboundText::html(html).with_keyboard(keyboard);
    }
    let plain = format!("{}\n\n{}", faq.question, faq.answer);
    OutboundText::plain(truncate(&plain, MESSAGE_LIMIT)).with_keyboard(keyboard)
}

/// Search results for `/faq <query>`.
pub fn search_results(query: &str, faqs: &[Faq]) -> OutboundText {
    if faqs.is_empty() {
        return OutboundText::html(format!(
            "🔍 No FAQs match \"{}\".\nUse /faq to browse all categories.",
            escape(query)
        ));
    }
    let rows = faqs.iter().map(question_button).collect();
    OutboundText::html(format!(
        "🔍 <b>FAQs matching</b> \"{}\":",
        escape(query)
    ))
    .with_keyboard(Keyboard::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faq() -> Faq {
        Faq::new("How do I <reset> my password?", "Use the Forgot Password link.")
            .with_category("Account")
    }

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(FaqCallback::parse("faq:menu"), Some(FaqCallback::Menu));
        assert_eq!(
            FaqCallback::parse("faq:category:Account"),
            Some(FaqCallback::Category("Account".into()))
        );
        assert_eq!(
            FaqCallback::parse("faq:0af3"),
            Some(FaqCallback::Show("0af3".into()))
        );
        for data in ["faq:", "faq:category:", "faq:a:b", "rate:TICK-0001:3"] {
            assert_eq!(FaqCallback::parse(data), None, "{} should be rejected", data);
        }
        assert_eq!(FaqCallback::Category("Net work".into()).data(), "faq:category:Net work");
    }

    #[test]
    fn test_menu_lists_categories() {
        assert!(menu(&[]).is_none());
        let menu = menu(&["Account".into(), "Support".into()]).unwrap();
        assert!(menu.text.contains("Frequently Asked Questions"));
        let keyboard = menu.keyboard.unwrap();
        assert_eq!(
            keyboard.callback_data(),
            vec!["faq:category:Account", "faq:category:Support"]
        );
        assert_eq!(keyboard.rows[0][0].label(), "📁 Account");
    }

    #[test]
    fn test_category_page_links_questions_and_back() {
        let faq = faq();
        assert!(category_page("Account", &[]).is_none());
        let page = category_page("Account", &[faq.clone()]).unwrap();
        let show = format!("faq:{}", faq.id);
        assert_eq!(
            page.keyboard.unwrap().callback_data(),
            vec![show.as_str(), "faq:menu"]
        );
    }

    #[test]
    fn test_answer_escapes_and_links_back() {
        let shown = answer(&faq());
        assert!(shown.text.starts_with("<b>How do I &lt;reset&gt; my password?</b>"));
        assert!(shown.text.contains("Need more help?"));
        assert_eq!(
            shown.keyboard.unwrap().callback_data(),
            vec!["faq:category:Account"]
        );
    }

    #[test]
    fn test_oversized_answer_falls_back_to_plain() {
        let long = Faq::new("Why so many ampersands?", "&".repeat(3990));
        let shown = answer(&long);
        assert_eq!(shown.format, crate::gateway::TextFormat::Plain);
        assert!(shown.text.chars().count() <= MESSAGE_LIMIT);
    }

    #[test]
    fn test_search_results() {
        let empty = search_results("fax <machine>", &[]);
        assert!(empty.text.contains("fax &lt;machine&gt;"));
        assert!(empty.keyboard.is_none());

        let found = search_results("password", &[faq()]);
        assert_eq!(found.keyboard.unwrap().rows.len(), 1);
    }
}
