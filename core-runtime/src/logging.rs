//! # Logging & Tracing Infrastructure
//!
//! Installs the global `tracing` subscriber for the playback core and mirrors
//! events to the host.
//!
//! ## Overview
//!
//! [`init_logging`] builds a `tracing-subscriber` registry from three layers:
//! an `EnvFilter` scoped to the core crates, a formatter (pretty, compact or
//! JSON), and a sink layer that forwards every surviving event to a host
//! [`LoggerSink`] as a [`LogEntry`]. Fields named like URIs are passed
//! through [`redact_uri`] before they reach the host, so signed streaming
//! parameters never leave the process.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::LogLevel;
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(Arc::new(LogcatSink::new())),
//! )?;
//!
//! tracing::info!(track_id = "song-1", "Track loaded");
//! ```

use crate::error::{Error, Result};

use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};

use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose events pass the default filter.
const CORE_TARGETS: [&str; 4] = ["bridge_traits", "core_runtime", "core_playback", "core_service"];

/// Field names whose values are treated as URIs.
const URI_FIELDS: [&str; 4] = ["uri", "audio_uri", "cover_uri", "url"];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One JSON object per line
    Json,
    /// Single-line, human-readable
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to the core crates when no custom filter is set
    pub level: LogLevel,
    /// Strip query strings from URI fields forwarded to the sink
    pub redact_uris: bool,
    /// Custom `EnvFilter` directive (e.g., "core_playback=debug,core_runtime=trace")
    pub filter: Option<String>,
    /// Optional logger sink for forwarding logs to host
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span enter/exit (pretty and compact) or span context (JSON)
    pub enable_spans: bool,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_uris: true,
            filter: None,
            logger_sink: None,
            enable_spans: false,
            display_target: true,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("redact_uris", &self.redact_uris)
            .field("filter", &self.filter)
            .field("logger_sink", &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"))
            .field("enable_spans", &self.enable_spans)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_uri_redaction(mut self, redact: bool) -> Self {
        self.redact_uris = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }
}

/// Install the global subscriber.
///
/// Call once at startup. A second call fails with [`Error::LoggingInit`]
/// and leaves the first subscriber in place; a malformed filter fails with
/// [`Error::Config`].
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(config.display_target)
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(config.display_target)
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(false)
            .with_target(config.display_target)
            .with_writer(io::stdout)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .with(LoggerSinkLayer::new(config.logger_sink, config.redact_uris))
        .try_init()
        .map_err(|e| Error::LoggingInit(e.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => CORE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, config.level.as_str()))
            .collect::<Vec<_>>()
            .join(","),
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

/// Layer that forwards events to a `LoggerSink` implementation.
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact_uris: bool,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact_uris: bool) -> Self {
        Self { sink, redact_uris }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let metadata = event.metadata();
        let level = log_level(*metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut visitor = EntryVisitor::new(self.redact_uris);
        event.record(&mut visitor);

        let message = visitor
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = visitor.fields;
        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_span(span.name());
        }

        let sink = Arc::clone(sink);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = sink.log(entry).await {
                    eprintln!("LoggerSink error: {}", err);
                }
            });
            return;
        }

        // Outside a runtime (host threads, sync tests) deliver inline
        if let Err(err) = futures::executor::block_on(sink.log(entry)) {
            eprintln!("LoggerSink error: {}", err);
        }
    }
}

struct EntryVisitor {
    redact_uris: bool,
    message: Option<String>,
    fields: std::collections::BTreeMap<String, String>,
}

impl EntryVisitor {
    fn new(redact_uris: bool) -> Self {
        Self {
            redact_uris,
            message: None,
            fields: Default::default(),
        }
    }

    fn record_value(&mut self, field: &Field, value: String) {
        let name = field.name();
        if name == "message" {
            self.message = Some(value);
            return;
        }

        let value = if self.redact_uris && URI_FIELDS.contains(&name) {
            redact_uri(&value).to_string()
        } else {
            value
        };
        self.fields.insert(name.to_string(), value);
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }
}

fn log_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Strip the query string and fragment from an audio URI before logging it.
///
/// Streaming URLs handed out by the catalog backend carry signed access
/// parameters; only the scheme, host and path are safe to log.
///
/// ```
/// use core_runtime::logging::redact_uri;
///
/// assert_eq!(
///     redact_uri("https://cdn.example.com/audio/a.mp3?sig=abc&exp=1"),
///     "https://cdn.example.com/audio/a.mp3"
/// );
/// ```
pub fn redact_uri(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for CapturingSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Debug
        }
    }

    fn capture(redact: bool, emit: impl FnOnce()) -> Vec<LogEntry> {
        let sink = Arc::new(CapturingSink::default());
        let layer = LoggerSinkLayer::new(Some(sink.clone()), redact);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);
        let entries = sink.entries.lock().unwrap().clone();
        entries
    }

    #[test]
    fn redact_uri_keeps_scheme_host_and_path() {
        assert_eq!(
            redact_uri("https://cdn.example.com/a.mp3?token=secret"),
            "https://cdn.example.com/a.mp3"
        );
        assert_eq!(redact_uri("file:///music/a.flac#t=10"), "file:///music/a.flac");
        assert_eq!(redact_uri("asset://song-1"), "asset://song-1");
        assert_eq!(redact_uri(""), "");
    }

    #[test]
    fn default_filter_covers_core_crates_only() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap().to_string();
        for target in CORE_TARGETS {
            assert!(filter.contains(&format!("{}=debug", target)), "{}", filter);
        }
    }

    #[test]
    fn invalid_custom_filter_is_rejected() {
        let config = LoggingConfig::default().with_filter("core_playback=[unclosed");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn sink_receives_message_fields_and_span() {
        let entries = capture(true, || {
            let span = tracing::info_span!("play", track_id = "song-1");
            let _enter = span.enter();
            tracing::warn!(
                target: "core_playback::session",
                track_id = "song-1",
                uri = "https://cdn.example.com/song-1.mp3?sig=abc",
                "Failed to load track"
            );
        });

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.target, "core_playback::session");
        assert_eq!(entry.message, "Failed to load track");
        assert_eq!(entry.field("track_id"), Some("song-1"));
        assert_eq!(entry.field("uri"), Some("https://cdn.example.com/song-1.mp3"));
        assert_eq!(entry.span.as_deref(), Some("play"));
    }

    #[test]
    fn uri_fields_pass_through_when_redaction_is_off() {
        let entries = capture(false, || {
            tracing::info!(uri = "https://cdn.example.com/a.mp3?sig=abc", "Warming");
        });
        assert_eq!(entries[0].field("uri"), Some("https://cdn.example.com/a.mp3?sig=abc"));
    }

    #[test]
    fn events_below_sink_level_are_dropped() {
        let entries = capture(true, || {
            tracing::trace!("position tick");
            tracing::debug!(listened_ms = 12_000u64, "Play recorded");
        });
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field("listened_ms"), Some("12000"));
    }
}
