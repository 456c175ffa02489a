/// Logger configuration derived from command-line arguments
use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level shown on the console (errors always pass)
    pub min_level: LogLevel,
    /// Tags with --debug-<key> enabled
    pub debug_tags: HashSet<&'static str>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> = Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Scan command-line arguments for --verbose, --quiet and --debug-<module> flags
pub fn init_from_args() {
    let mut config = LoggerConfig::default();

    if arguments::has_arg("--verbose") {
        config.min_level = LogLevel::Verbose;
    } else if arguments::has_arg("--quiet") {
        config.min_level = LogLevel::Warning;
    }

    for tag in LogTag::all() {
        let flag = format!("--debug-{}", tag.to_debug_key());
        if arguments::has_arg(&flag) {
            config.debug_tags.insert(tag.to_debug_key());
        }
    }

    set_logger_config(config);
}

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_default()
}

pub fn set_logger_config(config: LoggerConfig) {
    if let Ok(mut current) = LOGGER_CONFIG.write() {
        *current = config;
    }
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    get_logger_config().debug_tags.contains(tag.to_debug_key())
}
