//! Message templates and keyboards.
//!
//! All output is HTML; user-supplied text is escaped here.

use ticketdesk_models::{category_labels, Category, Rating, Ticket, TicketId};

use crate::gateway::{Button, Keyboard};
use crate::markup::{escape, format_date, truncate};

/// Thread title for a ticket: `{ticketId} - {name}`.
pub fn thread_title(ticket: &Ticket) -> String {
    format!("{} - {}", ticket.ticket_id, ticket.requester.short_name())
}

/// Requester line: name, optional @username.
pub fn requester_line(ticket: &Ticket) -> String {
    let mut line = escape(&ticket.requester.display_name());
    if let Some(username) = &ticket.requester.username {
        line.push_str(&format!(" (@{})", escape(username)));
    }
    line
}

/// Card posted at the top of a new ticket's thread.
pub fn ticket_card(ticket: &Ticket) -> String {
    format!(
        "🎫 <b>New Ticket: {}</b>\n\n\
         👤 <b>User:</b> {}\n\
         🆔 <b>User ID:</b> <code>{}</code>\n\
         📅 <b>Created:</b> {}\n\n\
         💬 <b>Message:</b>\n{}",
        ticket.ticket_id,
        requester_line(ticket),
        ticket.requester.user_id,
        format_date(&ticket.created_at),
        escape(&ticket.initial_message),
    )
}

/// A user's follow-up message mirrored into the thread.
pub fn user_message_in_thread(ticket: &Ticket, text: &str) -> String {
    format!(
        "👤 <b>{}:</b>\n{}",
        escape(&ticket.requester.short_name()),
        escape(text)
    )
}

/// A technician message delivered to the user.
pub fn technician_message_for_user(technician_name: &str, text: &str) -> String {
    format!("💬 <b>{}:</b>\n\n{}", escape(technician_name), escape(text))
}

/// A dashboard reply mirrored into the thread.
pub fn web_reply_in_thread(technician_name: &str, text: &str) -> String {
    format!("👨‍💼 <b>{}</b> (web):\n{}", escape(technician_name), escape(text))
}

pub fn ticket_created(ticket_id: &TicketId) -> String {
    format!(
        "✅ <b>Ticket Created: {}</b>\n\n\
         Your message has been sent to our support team.\n\
         We'll respond as soon as possible!",
        ticket_id
    )
}

pub fn ticket_closed(ticket_id: &TicketId) -> String {
    format!(
        "✅ <b>Ticket Closed: {}</b>\n\n\
         Your ticket has been resolved.\n\n\
         Need more help? Just send us a new message.",
        ticket_id
    )
}

pub fn ticket_reopened(ticket_id: &TicketId) -> String {
    format!(
        "🔓 <b>Ticket Reopened: {}</b>\n\nA technician will follow up here.",
        ticket_id
    )
}

pub fn closed_in_thread(ticket_id: &TicketId, technician_name: &str) -> String {
    format!(
        "🔒 Ticket {} closed by {}.",
        ticket_id,
        escape(technician_name)
    )
}

pub const RATING_PROMPT: &str = "⭐ <b>Rate Your Experience (Optional)</b>\n\n\
     How would you rate the support you received?\n\
     Your feedback helps us improve our service.";

/// Star buttons `rate:{ticketId}:{1..5}`, three then two per row.
pub fn rating_keyboard(ticket_id: &TicketId) -> Keyboard {
    let button = |n: u8| {
        Button::callback(
            format!("{} {}", "⭐".repeat(usize::from(n)), n),
            format!("rate:{}:{}", ticket_id, n),
        )
    };
    Keyboard::new(vec![
        vec![button(1), button(2), button(3)],
        vec![button(4), button(5)],
    ])
}

pub fn rating_thanks(stars: u8) -> String {
    format!(
        "✅ You rated this ticket with {}.\n\nThank you for your feedback!",
        "⭐".repeat(usize::from(stars))
    )
}

pub fn rating_already(stars: u8) -> String {
    format!(
        "✅ You already rated this ticket with {}.\n\nThank you for your feedback!",
        "⭐".repeat(usize::from(stars))
    )
}

/// Multi-select picker: two per row, `✓ ` marks selection, final Done row.
pub fn category_keyboard(ticket: &Ticket, taxonomy: &[Category]) -> Keyboard {
    let mut rows: Vec<Vec<Button>> = taxonomy
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|category| {
                    let selected = ticket.categories.iter().any(|c| c == &category.id);
                    let label = if selected {
                        format!("✓ {}", category.label)
                    } else {
                        category.label.clone()
                    };
                    Button::callback(label, format!("cat:{}:{}", ticket.ticket_id, category.id))
                })
                .collect()
        })
        .collect();
    rows.push(vec![Button::callback(
        "✅ Done Categorizing",
        format!("cat:{}:done", ticket.ticket_id),
    )]);
    Keyboard::new(rows)
}

/// Text shown above the category picker.
pub fn category_prompt(ticket: &Ticket, taxonomy: &[Category]) -> String {
    let current = if ticket.categories.is_empty() {
        "No categories selected yet.\n\n".to_string()
    } else {
        format!(
            "Current: {}\n\n",
            escape(&category_labels(taxonomy, &ticket.categories).join(", "))
        )
    };
    format!(
        "🏷️ <b>Categorize Ticket</b>\n\n\
         Ticket: {}\n\
         Select one or more categories that apply:\n\n\
         {}Click \"✅ Done\" when finished.",
        ticket.ticket_id, current
    )
}

/// Direct message to linked technicians about a new ticket.
pub fn new_ticket_notice(ticket: &Ticket) -> String {
    format!(
        "🔔 <b>New Ticket Created</b>\nID: <code>{}</code>\nUser: {}\nMessage: {}",
        ticket.ticket_id,
        requester_line(ticket),
        escape(&truncate(&ticket.initial_message, 53)),
    )
}

/// Dashboard deep link for a ticket.
pub fn webapp_keyboard(base_url: &str, ticket_id: &TicketId) -> Keyboard {
    Keyboard::new(vec![vec![Button::Url {
        label: "🔎 View in Web App".to_string(),
        url: format!("{}?startapp={}", base_url, ticket_id),
    }]])
}

/// Direct message to the level-2 pool.
pub fn escalation_notice(ticket: &Ticket, reason: &str, actor_name: &str) -> String {
    format!(
        "🚨 <b>Ticket Escalated</b>\n\n\
         Ticket: <code>{}</code>\n\
         User: {}\n\
         Reason: {}\n\
         Escalated by: {}",
        ticket.ticket_id,
        requester_line(ticket),
        escape(reason),
        escape(actor_name),
    )
}

/// `★★★☆☆ 3/5`, or the pending marker.
pub fn rating_summary(rating: Option<&Rating>) -> String {
    match rating {
        Some(r) => format!("{} {}/5", r.stars_display(), r.stars),
        None => "Pending / Not rated".to_string(),
    }
}

/// One line per ticket for `/list` style listings.
pub fn ticket_list_line(ticket: &Ticket) -> String {
    format!(
        "{} <code>{}</code> {} · {}",
        ticket.status.badge(),
        ticket.ticket_id,
        escape(&ticket.requester.short_name()),
        escape(&truncate(&ticket.initial_message, 40)),
    )
}

/// Reply to `/mytickets` when the user has no tickets.
pub const NO_TICKETS_YET: &str = "📭 No tickets yet. Just send me a message to create one!";

/// `/mytickets` listing, newest first.
pub fn my_tickets(tickets: &[Ticket]) -> String {
    if tickets.is_empty() {
        return NO_TICKETS_YET.to_string();
    }
    let mut text = String::from("🎫 <b>Your Tickets</b>\n");
    for ticket in tickets {
        text.push_str(&format!(
            "\n{} <b>{}</b>\n{}\n<i>{}</i>\n",
            ticket.status.badge(),
            ticket.ticket_id,
            escape(&truncate(&ticket.initial_message, 60)),
            ticket.created_at.format("%b %-d, %Y"),
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketdesk_models::Requester;

    fn ticket() -> Ticket {
        Ticket::new(
            TicketId::from_sequence(1),
            Requester::new(42).with_names(Some("Bob".into()), Some("Smith".into()), Some("bobby".into())),
            "My <printer> is broken.",
        )
    }

    #[test]
    fn test_thread_title() {
        assert_eq!(thread_title(&ticket()), "TICK-0001 - Bob");
    }

    #[test]
    fn test_card_escapes_user_text() {
        let card = ticket_card(&ticket());
        assert!(card.contains("My &lt;printer&gt; is broken."));
        assert!(card.contains("Bob Smith (@bobby)"));
        assert!(card.contains("<code>42</code>"));
    }

    #[test]
    fn test_rating_keyboard_tokens() {
        let kb = rating_keyboard(&TicketId::from_sequence(1));
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.callback_data()[4], "rate:TICK-0001:5");
    }

    #[test]
    fn test_category_keyboard_layout() {
        let mut t = ticket();
        t.categories.push("network".into());
        let taxonomy = vec![
            Category::new("hardware", "Hardware"),
            Category::new("network", "Network"),
            Category::new("software", "Software"),
        ];
        let kb = category_keyboard(&t, &taxonomy);
        assert_eq!(kb.rows.len(), 3);
        assert_eq!(kb.rows[0].len(), 2);
        assert_eq!(kb.rows[0][1].label(), "✓ Network");
        assert_eq!(kb.rows[1].len(), 1);
        assert_eq!(kb.rows[2][0].label(), "✅ Done Categorizing");
        assert_eq!(kb.callback_data().last(), Some(&"cat:TICK-0001:done"));
    }

    #[test]
    fn test_rating_summary() {
        assert_eq!(rating_summary(None), "Pending / Not rated");
        let rating = Rating {
            stars: 3,
            rated_at: chrono::Utc::now(),
            comment: None,
        };
        assert_eq!(rating_summary(Some(&rating)), "★★★☆☆ 3/5");
    }

    #[test]
    fn test_my_tickets_listing() {
        assert_eq!(my_tickets(&[]), NO_TICKETS_YET);

        let mut long = ticket();
        long.initial_message = "x".repeat(80);
        let text = my_tickets(&[ticket(), long]);
        assert!(text.starts_with("🎫 <b>Your Tickets</b>"));
        assert!(text.contains("<b>TICK-0001</b>"));
        assert!(text.contains("My &lt;printer&gt; is broken."));
        assert!(text.contains(&format!("{}...", "x".repeat(57))));
    }
}
