//! Centralised tracing initialisation for pimsbuild binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored;
//! the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directive applied on top of `level`: subprocess plumbing is only
/// interesting when asked for.
const QUIET_DIRECTIVES: &[&str] = &["hyper=warn", "reqwest=warn", "rustls=warn"];

/// Default verbosity for the `--verbose` flag.
pub fn default_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        QUIET_DIRECTIVES
            .iter()
            .filter_map(|d| d.parse().ok())
            .fold(EnvFilter::new(level.as_str()), EnvFilter::add_directive)
    })
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON, one object per event, carrying the
///   enclosing variant span (`variant`, `tag`) so parallel variants can be
///   told apart in a log aggregator.
/// * `level`: default verbosity when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = filter(level);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
