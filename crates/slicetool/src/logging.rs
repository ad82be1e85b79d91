//! Console logging for slicetool
//
// RUST_LOG wins when set. Otherwise only warnings are shown, or debug output with --verbose.
// Logs go to stderr so command output stays pipeable.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let env_filter = match std::env::var("RUST_LOG").ok() {
        Some(val) => EnvFilter::new(val),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::new("warn"),
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(verbose);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}
