/// Console formatting and writing
use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Utc;
use colored::Colorize;
use std::io::{self, Write};

pub fn format_and_log(tag: LogTag, level: LogLevel, message: &str) {
    let timestamp = Utc::now().format("%H:%M:%S%.3f").to_string();
    let tag_label = tag.label().color(tag.color()).bold();
    let timestamp = format!("[{}]", timestamp).dimmed();

    let line = match level {
        LogLevel::Error => format!("{} {} {}", timestamp, tag_label, message.red()),
        LogLevel::Warning => format!("{} {} {}", timestamp, tag_label, message.yellow()),
        LogLevel::Info => format!("{} {} {}", timestamp, tag_label, message),
        LogLevel::Debug | LogLevel::Verbose => {
            format!("{} {} {}", timestamp, tag_label, message.dimmed())
        }
    };

    println!("{}", line);
    let _ = io::stdout().flush();
}
