//! Process-wide tracing setup.
//!
//! Everything goes to stderr: stdout carries simulator expressions and must
//! never see a log line.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const ENV_LOG_LEVEL: &str = "SKILLBRIDGE_LOG";

fn base_level(value: Option<&str>) -> &'static str {
    match value {
        Some("debug") => "debug",
        Some("info") => "info",
        Some("error") => "error",
        Some("trace") => "trace",
        _ => "warn",
    }
}

fn filter_directive(level: &str) -> String {
    // Diagnostics already land on stderr verbatim; don't echo them a second time.
    format!("skillbridge={level},skillbridge::diagnostics=off")
}

/// `RUST_LOG` wins when set; otherwise `SKILLBRIDGE_LOG` picks the level for
/// this crate only. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = base_level(std::env::var(ENV_LOG_LEVEL).ok().as_deref());
        EnvFilter::new(filter_directive(level))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
