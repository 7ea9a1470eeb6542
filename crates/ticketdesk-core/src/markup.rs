//! Text rendering helpers.
//!
//! Stored text is always raw. Everything user-supplied goes through
//! [`escape`] before it is embedded in HTML-formatted output.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Maximum length of a single chat message.
pub const MESSAGE_LIMIT: usize = 4096;

/// Buffered text is flushed once it grows past this length.
pub const FLUSH_THRESHOLD: usize = 3500;

/// Escapes text for HTML parse mode.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("tag pattern compiles"))
}

/// Strips tags and unescapes entities, for plain-text fallback sends.
pub fn plain_text(html: &str) -> String {
    tag_regex()
        .replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Date format used in transcripts and summaries, e.g. `Mar 4, 2024, 09:15 AM`.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%b %-d, %Y, %I:%M %p").to_string()
}

/// Truncates to `max` characters, ending with `...` when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Accumulates text and splits it into sendable chunks.
///
/// Lines are never split unless a single line exceeds [`MESSAGE_LIMIT`].
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    current: String,
    ready: Vec<String>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text, moving full chunks to the ready list.
    pub fn push(&mut self, text: &str) {
        for line in text.split_inclusive('\n') {
            self.push_line(line);
        }
        if self.current.chars().count() >= FLUSH_THRESHOLD {
            self.flush();
        }
    }

    fn push_line(&mut self, line: &str) {
        let line_len = line.chars().count();
        if line_len > MESSAGE_LIMIT {
            self.flush();
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(MESSAGE_LIMIT) {
                self.ready.push(piece.iter().collect());
            }
            return;
        }
        if self.current.chars().count() + line_len > MESSAGE_LIMIT {
            self.flush();
        }
        self.current.push_str(line);
    }

    /// Moves any pending text to the ready list.
    pub fn flush(&mut self) {
        if !self.current.trim().is_empty() {
            self.ready.push(std::mem::take(&mut self.current));
        } else {
            self.current.clear();
        }
    }

    /// Takes the chunks ready to send.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.ready)
    }

    /// Flushes and takes everything.
    pub fn finish(mut self) -> Vec<String> {
        self.flush();
        self.ready
    }
}

/// Splits text into chunks that each fit in one message.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut buffer = ChunkBuffer::new();
    buffer.push(text);
    buffer.finish()
}
