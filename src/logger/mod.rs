//! Structured logging for the indexer
//!
//! Standard log levels (Error/Warning/Info/Debug/Verbose), per-module debug
//! control via `--debug-<module>` flags and colored console output.
//!
//! ## Usage
//!
//! ```rust
//! use spike_indexer::logger::{self, LogTag};
//!
//! logger::info(LogTag::Poller, "Initialized poller at block 100");
//! logger::debug(LogTag::Rpc, "GET /block"); // Only with --debug-rpc
//! ```
//!
//! Call `logger::init()` once at startup, before any logging occurs.

mod config;
mod format;
mod levels;
mod tags;

pub use config::{get_logger_config, init_from_args, set_logger_config, LoggerConfig};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system from command-line arguments
pub fn init() {
    config::init_from_args();
}

/// Check if a log message should be displayed
///
/// Errors always pass; Debug additionally requires the tag's --debug flag.
fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    if level == LogLevel::Error {
        return true;
    }

    let config = config::get_logger_config();
    if level > config.min_level && level != LogLevel::Debug {
        return false;
    }

    if level == LogLevel::Debug {
        return config.min_level >= LogLevel::Debug || config::is_debug_enabled_for_tag(tag);
    }

    true
}

fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }
    format::format_and_log(tag, level, message);
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (shown unless --quiet filters lower levels only)
pub fn warning(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (only with --debug-<module> or --verbose)
pub fn debug(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (only with --verbose)
pub fn verbose(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Verbose, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_error_always_logs() {
        set_logger_config(LoggerConfig {
            min_level: LogLevel::Warning,
            debug_tags: HashSet::new(),
        });
        assert!(should_log(&LogTag::System, LogLevel::Error));
        assert!(should_log(&LogTag::System, LogLevel::Warning));
        assert!(!should_log(&LogTag::System, LogLevel::Info));
    }

    #[test]
    fn test_debug_requires_flag() {
        let mut debug_tags = HashSet::new();
        debug_tags.insert(LogTag::Rpc.to_debug_key());
        set_logger_config(LoggerConfig {
            min_level: LogLevel::Info,
            debug_tags,
        });
        assert!(should_log(&LogTag::Rpc, LogLevel::Debug));
        assert!(!should_log(&LogTag::Poller, LogLevel::Debug));
    }
}
