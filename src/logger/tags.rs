/// Log tags identifying the subsystem a message came from
///
/// Each tag maps to a `--debug-<key>` command-line flag.
use colored::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Rpc,
    Poller,
    Processor,
    Tokens,
    Ohlc,
    Tvl,
    Database,
    Scheduler,
}

impl LogTag {
    /// Label printed in the log line
    pub fn label(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Rpc => "RPC",
            LogTag::Poller => "POLLER",
            LogTag::Processor => "PROCESSOR",
            LogTag::Tokens => "TOKENS",
            LogTag::Ohlc => "OHLC",
            LogTag::Tvl => "TVL",
            LogTag::Database => "DATABASE",
            LogTag::Scheduler => "SCHEDULER",
        }
    }

    /// Key used for --debug-<key> flags
    pub fn to_debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Rpc => "rpc",
            LogTag::Poller => "poller",
            LogTag::Processor => "processor",
            LogTag::Tokens => "tokens",
            LogTag::Ohlc => "ohlc",
            LogTag::Tvl => "tvl",
            LogTag::Database => "database",
            LogTag::Scheduler => "scheduler",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            LogTag::System => Color::Cyan,
            LogTag::Rpc => Color::Blue,
            LogTag::Poller => Color::Green,
            LogTag::Processor => Color::Magenta,
            LogTag::Tokens => Color::Yellow,
            LogTag::Ohlc => Color::BrightBlue,
            LogTag::Tvl => Color::BrightMagenta,
            LogTag::Database => Color::White,
            LogTag::Scheduler => Color::BrightGreen,
        }
    }

    pub fn all() -> &'static [LogTag] {
        &[
            LogTag::System,
            LogTag::Rpc,
            LogTag::Poller,
            LogTag::Processor,
            LogTag::Tokens,
            LogTag::Ohlc,
            LogTag::Tvl,
            LogTag::Database,
            LogTag::Scheduler,
        ]
    }
}
