/// Centralized argument handling for the indexer
///
/// Consolidates command-line argument parsing and debug flag checking so the
/// logger and binaries never scan `env::args()` themselves.
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
/// Thread-safe singleton that stores arguments for access throughout the application
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
/// Used by tests to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
/// Returns None if the flag is not found or has no value
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

/// Path to the config file, `--config <path>` or the default
pub fn config_path() -> String {
    get_arg_value("--config").unwrap_or_else(|| "configs.json".to_string())
}

/// Optional single-network override, `--network <name>`
pub fn network_override() -> Option<String> {
    get_arg_value("--network")
}

pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

pub fn print_help() {
    println!("spike-indexer - Spike platform chain indexer");
    println!();
    println!("USAGE:");
    println!("    spike-indexer [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>      Config file path (default: configs.json)");
    println!("    --network <name>     Only run the named network");
    println!("    --verbose            Show verbose logs");
    println!("    --quiet              Only show warnings and errors");
    println!("    --debug-<module>     Enable debug logs for a module (rpc, poller,");
    println!("                         processor, tokens, ohlc, tvl, database)");
    println!("    --help, -h           Show this help");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_value_lookup() {
        set_cmd_args(vec![
            "spike-indexer".to_string(),
            "--config".to_string(),
            "custom.json".to_string(),
            "--verbose".to_string(),
        ]);

        assert!(has_arg("--verbose"));
        assert!(!has_arg("--quiet"));
        assert_eq!(get_arg_value("--config").as_deref(), Some("custom.json"));
        assert_eq!(config_path(), "custom.json");
        assert_eq!(get_arg_value("--missing"), None);
    }
}
