// src/formatting.rs

use chrono::{DateTime, Local, TimeZone};

/// A trait for turning a caller-supplied body into one numbered alert.
pub trait MessageFormatter: Send + Sync {
    fn format_notification(&self, attempt: u32, body_text: &str) -> String;
}

/// The default wake-up formatter: loud preamble, attempt number and the local
/// time, then the caller's body. Output is Telegram HTML; the body is escaped
/// so it is always shown as plain text.
pub struct WakeUpFormatter;

/// Escapes the characters Telegram's HTML parse mode treats as markup.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl WakeUpFormatter {
    fn format_at<Tz: TimeZone>(&self, attempt: u32, body_text: &str, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "🚨 <b>ATTENTION! NEW EVENT #{}</b> 🚨\n\n⏰ TIME: {}\n🎯 ACT FAST!\n\n{}\n\n💥 WAKE UP! 💥",
            attempt,
            at.format("%H:%M:%S"),
            escape_html(body_text.trim())
        )
    }
}

impl MessageFormatter for WakeUpFormatter {
    fn format_notification(&self, attempt: u32, body_text: &str) -> String {
        self.format_at(attempt, body_text, &Local::now())
    }
}
