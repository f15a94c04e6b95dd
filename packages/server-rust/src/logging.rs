//! Structured logging: subscriber setup, the shared base logger, and the
//! per-call logger derived from it.
//!
//! Loggers are `tracing` spans. The base logger is a span held by the
//! pipeline configuration; every call derives a child span carrying its
//! trace id, so any event emitted while the call runs inherits that field.

use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output encoding of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Settings for [`init_tracing`].
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Lowers the default level from `info` to `debug`.
    pub debug: bool,
    /// Explicit filter directives; takes precedence over `RUST_LOG`.
    pub filter: Option<String>,
}

impl LogConfig {
    fn env_filter(&self) -> EnvFilter {
        if let Some(directives) = &self.filter {
            return EnvFilter::new(directives);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.debug { "debug" } else { "info" })
        })
    }
}

/// Installs the process-wide `tracing` subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
    }
    tracing::debug!(format = ?config.format, "tracing initialized");
    Ok(())
}

/// The logger shared by all calls. Read-only: calls derive children from it.
#[derive(Debug, Clone)]
pub struct BaseLogger {
    span: Span,
}

impl BaseLogger {
    /// Uses `span` as the parent of every call span.
    #[must_use]
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for BaseLogger {
    /// Call spans become root spans.
    fn default() -> Self {
        Self { span: Span::none() }
    }
}

/// Logger for a single call.
#[derive(Debug, Clone)]
pub struct CallLogger {
    span: Span,
}

impl CallLogger {
    #[must_use]
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// The call span. Emit events with `parent: logger.span()` or enter it.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Runs `f` with the call span entered.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }
}
