//! Diagnostic tracing for kernel runs, written to stderr.
//!
//! This is not the product output: narrator and `[builder]` lines go through
//! the kernel's line sink, and run records live in the artifact store.
//!
//! At the default `warn` level a run logs only what an operator should act
//! on: modules excluded for a runtime-version mismatch, command conflicts,
//! module directories skipped for a bad manifest, module programs that could
//! not start, child processes stopped on timeout or cancellation, truncated
//! module output, and line sinks or narrator callbacks that failed.
//! `info` adds the registry summary and the classified state of each run.
//! `debug` traces the pipeline: config resolution, plan hash, artifact
//! writes, module loading, dispatch and child exit codes.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=shoots=info shoots core.ping
/// RUST_LOG=shoots::io::process=debug shoots fs.read
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
