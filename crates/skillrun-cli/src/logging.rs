// Logging initialization

use tracing_subscriber::EnvFilter;

/// Variable holding an `EnvFilter` directive, e.g. `skillrun_sandbox=debug`
pub const LOG_ENV: &str = "SKILLRUN_LOG";

/// Directive used when `SKILLRUN_LOG` is unset
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber; logs go to stderr so stdout stays JSON
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
