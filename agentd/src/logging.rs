//! `tracing-subscriber` wiring, grounded on the teacher's
//! `node/src/components/logging` component and its `tracing-subscriber`
//! feature set (`json`, `env-filter`).

use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::Color;

fn use_color(choice: Option<Color>) -> bool {
    match choice.unwrap_or(Color::Auto) {
        Color::On => true,
        Color::Off => false,
        Color::Auto => atty_stderr(),
    }
}

fn atty_stderr() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

/// Install the global `tracing` subscriber. Must be called exactly once,
/// before any adapter or HTTP task starts.
pub fn init(log_json: Option<Color>, log_color: Option<Color>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = matches!(log_json, Some(Color::On)) || (matches!(log_json, Some(Color::Auto)) && !atty_stderr());

    if json {
        fmt().with_env_filter(filter).json().with_current_span(true).with_span_list(true).init();
    } else {
        fmt().with_env_filter(filter).with_ansi(use_color(log_color)).init();
    }
}
