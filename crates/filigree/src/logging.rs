//! Logging initialization and configuration.
//!
//! Uses the `tracing` ecosystem with support for both human-readable and
//! JSON output formats. Logs go to stderr; stdout carries the run report.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// `level` is the default filter (e.g. `info`, `debug`, `filigree_core=trace`).
/// The RUST_LOG environment variable overrides it.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Resolve the filter level and format from the config plus CLI overrides.
fn resolve(config: &filigree_core::Config, verbose: bool, json_logs: bool) -> (String, bool) {
    let level = if verbose && !matches!(config.logging.level.as_str(), "debug" | "trace") {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let json_format = json_logs || config.logging.format == "json";
    (level, json_format)
}

/// Initialize logging with settings from the Filigree configuration.
pub fn init_from_config(config: &filigree_core::Config, verbose: bool, json_logs: bool) {
    let (level, json_format) = resolve(config, verbose, json_logs);
    init(&level, json_format);
}

#[cfg(test)]
mod tests {
    use super::*;
    use filigree_core::Config;

    #[test]
    fn test_defaults_to_config_level() {
        let (level, json) = resolve(&Config::default(), false, false);
        assert_eq!(level, "info");
        assert!(!json);
    }

    #[test]
    fn test_verbose_raises_to_debug_but_keeps_trace() {
        let (level, _) = resolve(&Config::default(), true, false);
        assert_eq!(level, "debug");

        let mut config = Config::default();
        config.logging.level = "trace".into();
        let (level, _) = resolve(&config, true, false);
        assert_eq!(level, "trace");
    }

    #[test]
    fn test_json_from_config_or_flag() {
        let mut config = Config::default();
        assert!(resolve(&config, false, true).1);
        config.logging.format = "json".into();
        assert!(resolve(&config, false, false).1);
    }
}
