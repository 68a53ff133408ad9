//! Access logging (C3): a custom `tracing` formatter that renders a fixed-width log line
//! the downstream log shippers parse:
//!
//! ```text
//! [<ts>][<lvl>][]<trace>][<caddr>][<saddr>][<key>-<status>][<user>][<thread>|<class>|<method>|] - <msg>
//! ```
//!
//! Request-scoped fields (`trace`, `caddr`, `saddr`, `key`, `status`, `user`, `class`,
//! `method`) are attached via `tracing::Span::record` / event fields; fields missing from a
//! given event render as an empty segment rather than shifting the column layout.

use chrono::Local;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Renders events in the access-log line format described above.
pub struct AccessLogFormat;

struct FieldCollector {
    trace: String,
    caddr: String,
    saddr: String,
    key: String,
    status: String,
    user: String,
    class: String,
    method: String,
    message: String,
}

impl FieldCollector {
    fn new() -> Self {
        FieldCollector {
            trace: String::new(),
            caddr: String::new(),
            saddr: String::new(),
            key: String::new(),
            status: String::new(),
            user: String::new(),
            class: String::new(),
            method: String::new(),
            message: String::new(),
        }
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "trace" => self.trace = value.to_string(),
            "caddr" => self.caddr = value.to_string(),
            "saddr" => self.saddr = value.to_string(),
            "key" => self.key = value.to_string(),
            "status" => self.status = value.to_string(),
            "user" => self.user = value.to_string(),
            "class" => self.class = value.to_string(),
            "method" => self.method = value.to_string(),
            "message" => self.message = value.to_string(),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        self.record_str(field, text.trim_matches('"'));
    }
}

impl<S, N> FormatEvent<S, N> for AccessLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = FieldCollector::new();
        event.record(&mut fields);

        let ts = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let level = level_tag(*event.metadata().level());
        let thread = std::thread::current()
            .name()
            .unwrap_or("unknown")
            .to_string();

        write!(
            writer,
            "[{ts}][{level}][]\
             [{trace}][{caddr}][{saddr}][{key}-{status}][{user}][{thread}|{class}|{method}|] - {msg}\n",
            trace = fields.trace,
            caddr = fields.caddr,
            saddr = fields.saddr,
            key = fields.key,
            status = fields.status,
            user = fields.user,
            class = fields.class,
            method = fields.method,
            msg = fields.message,
        )
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// Installs the global `tracing` subscriber: the custom access-log formatter on stdout, with
/// verbosity controlled by `RUST_LOG` (defaulting to `info`).
pub fn init() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .event_format(AccessLogFormat)
        .with_env_filter(filter)
        .init();
}
