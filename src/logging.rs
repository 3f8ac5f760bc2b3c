use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log level.
pub const LOG_LEVEL_ENV: &str = "VMFORGE_LOG";

/// When set, logs from every crate are shown instead of only ours.
pub const LOG_ALL_ENV: &str = "VMFORGE_LOG_ALL";

/// Setup logging.
/// By default, it will only show logs from our crate at the info level.
///
/// The log level can be overridden by setting the `VMFORGE_LOG` environment variable,
/// or forced to `debug` with the global `--debug` flag.
/// If the `VMFORGE_LOG_ALL` environment variable is set, it will show logs from all crates at the specified level.
pub fn setup_logging(debug: bool) {
    let filter = build_filter(
        std::env::var(LOG_LEVEL_ENV).ok(),
        std::env::var(LOG_ALL_ENV).is_ok(),
        debug,
    );

    // Logs go to stderr so json output on stdout stays parseable.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::new(filter))
        .init();
}

/// Build the filter directive.
/// This will either be "log_level" or "vmforge=log_level".
fn build_filter(log_level: Option<String>, show_all_logs: bool, debug: bool) -> String {
    let log_level = match (debug, log_level) {
        (true, _) => "debug".to_string(),
        (false, Some(level)) => level,
        (false, None) => "info".to_string(),
    };

    if show_all_logs {
        log_level
    } else {
        format!("vmforge={log_level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_scoped_to_crate() {
        assert_eq!(build_filter(None, false, false), "vmforge=info");
    }

    #[test]
    fn test_env_level_is_used() {
        assert_eq!(
            build_filter(Some("trace".to_string()), false, false),
            "vmforge=trace"
        );
    }

    #[test]
    fn test_debug_flag_wins_over_env() {
        assert_eq!(
            build_filter(Some("warn".to_string()), false, true),
            "vmforge=debug"
        );
    }

    #[test]
    fn test_show_all_logs_drops_crate_scope() {
        assert_eq!(build_filter(Some("warn".to_string()), true, false), "warn");
    }
}
