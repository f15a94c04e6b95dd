//! Test helpers: a capturing `tracing` subscriber.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// One recorded event with its own fields and the fields of every enclosing
/// span, innermost first.
#[derive(Debug, Clone)]
pub(crate) struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
    pub spans: Vec<HashMap<String, String>>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Looks a field up in the enclosing spans, innermost first.
    pub fn span_field(&self, name: &str) -> Option<String> {
        self.spans.iter().find_map(|s| s.get(name).cloned())
    }
}

/// Shared sink of captured events.
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedEvents {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes events of the current thread into this sink until the guard drops.
    pub fn set_default(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(CaptureLayer {
            events: self.events.clone(),
        });
        tracing::subscriber::set_default(subscriber)
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.message == message)
            .cloned()
            .collect()
    }

    /// Asserts exactly one event with `message` was captured and returns it.
    pub fn single(&self, message: &str) -> CapturedEvent {
        let matches = self.with_message(message);
        assert_eq!(
            matches.len(),
            1,
            "expected exactly one {message:?} event, got {matches:#?}"
        );
        matches.into_iter().next().unwrap()
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct SpanFields(HashMap<String, String>);

#[derive(Default)]
struct FieldMap(HashMap<String, String>);

impl Visit for FieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        attrs.record(&mut fields);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(fields.0));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            if let Some(existing) = extensions.get_mut::<SpanFields>() {
                let mut fields = FieldMap(std::mem::take(&mut existing.0));
                values.record(&mut fields);
                existing.0 = fields.0;
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        event.record(&mut fields);
        let message = fields.0.remove("message").unwrap_or_default();

        let mut spans = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_fields) = span.extensions().get::<SpanFields>() {
                    spans.push(span_fields.0.clone());
                }
            }
        }

        self.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields: fields.0,
            spans,
        });
    }
}
