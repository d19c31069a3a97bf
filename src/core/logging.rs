//! Logging setup for the gateway.

use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time formatter using the local timezone (respects the TZ environment
/// variable, which matters for the hosted deployments this runs on).
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` controls the filter; HTTP-library noise is suppressed even when
/// `RUST_LOG` is set broadly, because a plain `debug` filter would let
/// per-chunk hyper logs through.
pub fn init_logging() {
    let base_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,gemini_proxy_rust=debug".to_string());
    let filter_str = format!("{base_filter},hyper=warn,h2=warn,reqwest=warn");
    let filter = tracing_subscriber::EnvFilter::new(filter_str);

    let no_color = std::env::var("NO_COLOR").is_ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .init();
}
