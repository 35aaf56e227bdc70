//! Device logging: bounded ring storage, severity filtering, sink fan-out.
//!
//! The [`Logger`] is an explicitly constructed instance meant to be passed to
//! whatever needs it; [`global()`] additionally exposes one process-wide
//! instance behind a one-time initializer for code without wiring (panic
//! handlers, C callbacks, interrupt shims).
//!
//! ## Diagnostics output
//!
//! Device records and host-side diagnostics are separate planes: the transport
//! layer emits `tracing` events, while device code logs through [`Logger`].
//! [`forward_to_tracing`] bridges the two by registering an observer that
//! re-emits every accepted record as a `tracing` event, and [`init_tracing`]
//! installs a subscriber configured from the environment:
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG, TRACE - defaults to INFO
//! - `LOG_FORMAT`: `json`, `pretty`, or `compact` - defaults to `compact`
//! - `RUST_LOG`: overrides the filter entirely (env_logger syntax)

mod logger;
mod record;
mod ring;

pub use logger::{LogSink, Logger, DEFAULT_LOG_CAPACITY};
pub use record::{
    LogRecord, Severity, DEFAULT_TAG, MAX_MESSAGE_LEN, MAX_TAG_LEN, TRUNCATION_MARKER,
};

use once_cell::sync::Lazy;
use std::env;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static GLOBAL: Lazy<Arc<Logger>> = Lazy::new(|| Arc::new(Logger::new()));

/// The process-wide logger, constructed on first use with the default ring
/// capacity and alive for the rest of the process.
pub fn global() -> &'static Logger {
    &GLOBAL
}

/// An owned handle to the process-wide logger, for components that hold on to
/// it (the uplink worker does).
pub fn global_handle() -> Arc<Logger> {
    Arc::clone(&GLOBAL)
}

/// Log with format arguments through a [`Logger`], rendering into the bounded
/// message budget.
///
/// ```
/// use devlink::logging::{Logger, Severity};
///
/// let logger = Logger::new();
/// devlink::logf!(logger, Severity::Info, "sensors", "reading = {}", 21.5);
/// assert_eq!(logger.peek(0).unwrap().message, "reading = 21.5");
/// ```
#[macro_export]
macro_rules! logf {
    ($logger:expr, $sev:expr, $tag:expr, $($arg:tt)+) => {
        $logger.log_args($tag, $sev, ::core::format_args!($($arg)+))
    };
}

/// Register an observer that re-emits every accepted record as a `tracing`
/// event under the `device` target, carrying the tag as a field.
pub fn forward_to_tracing(logger: &Logger) {
    logger.add_observer(Box::new(|tag, severity, message| match severity {
        Severity::Debug => tracing::debug!(target: "device", tag, "{message}"),
        Severity::Info => tracing::info!(target: "device", tag, "{message}"),
        Severity::Warning => tracing::warn!(target: "device", tag, "{message}"),
        Severity::Error => tracing::error!(target: "device", tag, "{message}"),
    }));
}

/// Subscriber output format options.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// Structured JSON for log aggregation.
    Json,
    /// Human-readable with indentation, for development.
    Pretty,
    /// Terminal-friendly single lines.
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Install a global `tracing` subscriber configured from the environment.
/// Call once at startup; later calls are ignored.
pub fn init_tracing() {
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    let mut filter = EnvFilter::new(level)
        // Reduce noise from the MQTT stack
        .add_directive("rumqttc=warn".parse().expect("static directive"));
    if let Ok(rust_log) = env::var("RUST_LOG") {
        filter = EnvFilter::new(rust_log);
    }

    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
    let registry = tracing_subscriber::registry().with(filter);
    // An already-installed subscriber (tests, embedding applications) wins.
    let _ = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_ansi(true)).try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_ansi(true).with_target(false))
            .try_init(),
    };
}
