//! Tracing setup for the CLI.
//!
//! Logs always go to stderr so stdout stays machine-readable.

use std::env;
use tracing_subscriber::EnvFilter;

// Targets of every workspace crate start with `linksync`.
const DEFAULT_FILTER: &str = "warn,linksync=info";
const VERBOSE_FILTER: &str = "info,linksync=debug";

/// Initialize the global tracing subscriber.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `LINKSYNC_LOG`
/// 3) `log_filter` from the config file
/// 4) `--verbose`, else the default filter
pub fn init(config_filter: Option<&str>, verbose: bool) {
    let env_filter = select_filter(
        env::var("LINKSYNC_LOG").ok().as_deref(),
        config_filter,
        verbose,
    );
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_env_filter(env_filter)
        .try_init();
}

fn select_filter(app_env: Option<&str>, config: Option<&str>, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    for candidate in [app_env, config].into_iter().flatten() {
        if candidate.trim().is_empty() {
            continue;
        }
        if let Ok(filter) = EnvFilter::try_new(candidate) {
            return filter;
        }
    }

    EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
}

#[cfg(test)]
mod tests {
    use super::*;

    // RUST_LOG is not set under `cargo test` unless the caller sets it, so
    // these only assert on the fallbacks below it.

    #[test]
    fn app_env_beats_config() {
        if env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = select_filter(Some("trace"), Some("error"), false);
        assert_eq!(filter.to_string(), "trace");
    }

    #[test]
    fn blank_values_fall_through() {
        if env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = select_filter(Some("  "), Some("error"), false);
        assert_eq!(filter.to_string(), "error");
    }

    #[test]
    fn verbose_is_the_last_resort() {
        if env::var_os("RUST_LOG").is_some() {
            return;
        }
        let verbose = select_filter(None, None, true).to_string();
        assert!(verbose.contains("linksync=debug"));
        let quiet = select_filter(None, None, false).to_string();
        assert!(quiet.contains("linksync=info"));
    }
}
