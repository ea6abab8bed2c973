//! Shared logging utilities for consistent tracing across the supervisor

use std::fmt::Write as _;

use tracing::{error, info, Event, Subscriber};
use tracing_subscriber::layer::Context;

use crate::log_writer::LogWriter;
use crate::types::Component;

/// Tracing layer that mirrors every event into the rotating log file
pub struct LogWriterLayer {
    writer: LogWriter,
}

impl LogWriterLayer {
    pub fn new(writer: LogWriter) -> Self {
        Self { writer }
    }
}

impl<S> tracing_subscriber::Layer<S> for LogWriterLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = match visitor.component {
            Some(component) => format!("[{component}] {}{}", visitor.message, visitor.fields),
            None => format!("{}{}", visitor.message, visitor.fields),
        };
        self.writer.record(event.metadata().level().as_str(), &line);
    }
}

/// Visitor that flattens an event into `message key=value ...`
#[derive(Default)]
struct LineVisitor {
    message: String,
    component: Option<String>,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        let _ = write!(self.fields, " {name}={value}");
    }
}

impl tracing::field::Visit for LineVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{value:?}");
            }
            "component" => self.component = Some(format!("{value:?}")),
            name => {
                let rendered = format!("{value:?}");
                self.push_field(name, &rendered);
            }
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "component" => self.component = Some(value.to_string()),
            name => self.push_field(name, &value),
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.push_field(field.name(), &value);
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.push_field(field.name(), &value);
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.push_field(field.name(), &value);
    }
}

/// Filter directive for the supervisor crates at `base_level`
pub fn filter_directive(base_level: &str) -> String {
    format!("supervisor={base_level},qbox_supervisor={base_level},shared={base_level},reqwest=warn,hyper=warn")
}

/// Initialize the tracing subscriber: compact console output on stderr and,
/// when a writer is given, every event mirrored into the log file.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(log_level: Option<&str>, writer: Option<LogWriter>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let base_level = log_level.unwrap_or("info");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(base_level)));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(writer.map(LogWriterLayer::new))
        .try_init();
}

/// Macro for component-tagged info logging
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        ::tracing::info!(component = %$component, $($arg)*)
    };
}

/// Macro for component-tagged warning logging
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        ::tracing::warn!(component = %$component, $($arg)*)
    };
}

/// Macro for component-tagged error logging
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        ::tracing::error!(component = %$component, $($arg)*)
    };
}

/// Macro for component-tagged debug logging
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        ::tracing::debug!(component = %$component, $($arg)*)
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: Component, details: &str) {
    info!(component = %component, "🚀 Starting {}", details);
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: Component, reason: &str) {
    info!(component = %component, "🛑 Shutting down: {}", reason);
}

/// Contextual logging helper for error conditions
pub fn log_error(component: Component, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: Component, message: &str) {
    info!(component = %component, "✅ {}", message);
}
