//! Conversion of engine keyboards into Telegram inline keyboards.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, WebAppInfo};
use tracing::warn;
use url::Url;

use ticketdesk_core::gateway::{Button, Keyboard};

fn to_button(button: &Button) -> Option<InlineKeyboardButton> {
    match button {
        Button::Callback { label, data } => {
            Some(InlineKeyboardButton::callback(label.clone(), data.clone()))
        }
        Button::Url { label, url } | Button::WebApp { label, url } => {
            let parsed = match Url::parse(url) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(url = %url, error = %e, "Dropping button with invalid URL");
                    return None;
                }
            };
            Some(match button {
                Button::WebApp { .. } => {
                    InlineKeyboardButton::web_app(label.clone(), WebAppInfo { url: parsed })
                }
                _ => InlineKeyboardButton::url(label.clone(), parsed),
            })
        }
    }
}

/// Builds the inline markup. Rows left empty after dropping invalid buttons are removed.
pub fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
        .rows
        .iter()
        .map(|row| row.iter().filter_map(to_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_callback_rows_preserved() {
        let keyboard = Keyboard::new(vec![
            vec![Button::callback("1", "rate:TICK-0001:1"), Button::callback("2", "rate:TICK-0001:2")],
            vec![Button::callback("Done", "cat:TICK-0001:done")],
        ]);
        let markup = to_markup(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert!(matches!(
            &markup.inline_keyboard[1][0].kind,
            InlineKeyboardButtonKind::CallbackData(data) if data == "cat:TICK-0001:done"
        ));
    }

    #[test]
    fn test_invalid_url_dropped() {
        let keyboard = Keyboard::new(vec![vec![Button::Url {
            label: "Open".into(),
            url: "not a url".into(),
        }]]);
        assert!(to_markup(&keyboard).inline_keyboard.is_empty());
    }

    #[test]
    fn test_web_app_button() {
        let keyboard = Keyboard::new(vec![vec![Button::WebApp {
            label: "Open".into(),
            url: "https://desk.example.com/app".into(),
        }]]);
        let markup = to_markup(&keyboard);
        assert!(matches!(
            markup.inline_keyboard[0][0].kind,
            InlineKeyboardButtonKind::WebApp(_)
        ));
    }
}
