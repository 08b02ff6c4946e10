/// Structured logging setup using tracing
///
/// Writes to stderr ONLY so stdout stays reserved for command output
/// (search results, assistant replies, REPL turns).
/// Auto-detects format: human-readable with ANSI colors when stderr is a terminal,
/// structured JSON when piped/redirected.

use std::io::IsTerminal;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use crate::config::Config;

/// Dependencies that are chatty at info level (connection pool, HTTP client,
/// ONNX runtime behind fastembed). Capped unless the user asks for trace.
const NOISY_TARGETS: [&str; 4] = ["sqlx", "hyper", "reqwest", "ort"];

/// Filter directive for the configured level and `-v` count.
///
/// `-v` raises the level to debug and `-vv` to trace. Below trace, noisy
/// dependencies are held at warn so shopbot's own events stay readable.
pub fn filter_directive(log_level: &str, verbosity: u8) -> String {
    let level = match verbosity {
        0 => log_level,
        1 => "debug",
        _ => "trace",
    };
    if level.eq_ignore_ascii_case("trace") {
        return level.to_string();
    }
    let mut directive = level.to_string();
    for target in NOISY_TARGETS {
        directive.push_str(&format!(",{}=warn", target));
    }
    directive
}

/// Initialize tracing subscriber with stderr-only output
///
/// Level from config.log_level (default: info), raised by `verbosity`.
/// RUST_LOG env var overrides both at runtime.
pub fn init_logging(config: &Config, verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.log_level, verbosity)));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.with_ansi(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .init();
    }
}
