//! Logging stage: derives the per-call logger and records the call's start
//! and finish.
//!
//! The finish event carries `service`, `method`, `code` and `duration_ms`,
//! at a level chosen by [`code_to_level`]. Exactly one finish event is
//! emitted per call; a call whose future is dropped before completing is
//! reported as `Canceled`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use callguard_core::{outcome_code, CallDescriptor, Code, Metadata, Status};
use tower::{Layer, Service};
use tracing::{Instrument, Level, Span};

use crate::call::{CallRequest, CallState};
use crate::logging::{BaseLogger, CallLogger};

/// Severity of the finish event for a call that ended with `code`.
///
/// Expected traffic (including rejections and cancellations) is `INFO`,
/// conditions worth watching are `WARN`, defects are `ERROR`.
#[must_use]
pub fn code_to_level(code: Code) -> Level {
    match code {
        Code::Ok
        | Code::Canceled
        | Code::InvalidArgument
        | Code::NotFound
        | Code::AlreadyExists
        | Code::Unauthenticated => Level::INFO,

        Code::DeadlineExceeded
        | Code::PermissionDenied
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unavailable => Level::WARN,

        Code::Unknown | Code::Unimplemented | Code::Internal | Code::DataLoss => Level::ERROR,
    }
}

/// Attaches extra fields to the call logger.
///
/// Receives the call span and returns the span that becomes the call logger,
/// typically a child of `call_span` carrying fields read from the incoming
/// state or metadata.
pub trait EnrichSpan: Send + Sync + 'static {
    fn enrich(&self, call_span: &Span, state: &CallState, metadata: &Metadata) -> Span;
}

impl<F> EnrichSpan for F
where
    F: Fn(&Span, &CallState, &Metadata) -> Span + Send + Sync + 'static,
{
    fn enrich(&self, call_span: &Span, state: &CallState, metadata: &Metadata) -> Span {
        self(call_span, state, metadata)
    }
}

// ---------------------------------------------------------------------------
// FinishGuard
// ---------------------------------------------------------------------------

/// Emits the finish event once: explicitly on completion, or on drop.
struct FinishGuard {
    span: Span,
    descriptor: Arc<CallDescriptor>,
    finished: bool,
}

impl FinishGuard {
    fn finish(&mut self, code: Code) {
        if self.finished {
            return;
        }
        self.finished = true;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = self.descriptor.elapsed().as_millis() as u64;
        let service = self.descriptor.service.as_str();
        let method = self.descriptor.method.as_str();
        let level = code_to_level(code);
        let code = code.as_str();

        if level == Level::ERROR {
            tracing::error!(parent: &self.span, service, method, code, duration_ms, "finished call");
        } else if level == Level::WARN {
            tracing::warn!(parent: &self.span, service, method, code, duration_ms, "finished call");
        } else {
            tracing::info!(parent: &self.span, service, method, code, duration_ms, "finished call");
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        // Unwinding past this stage means nothing below caught the panic.
        let code = if std::thread::panicking() {
            Code::Internal
        } else {
            Code::Canceled
        };
        self.finish(code);
    }
}

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Tower layer that attaches a [`CallLogger`] and logs each call's outcome.
#[derive(Clone, Default)]
pub struct LoggingLayer {
    base: BaseLogger,
    enrich: Option<Arc<dyn EnrichSpan>>,
}

impl LoggingLayer {
    #[must_use]
    pub fn new(base: BaseLogger) -> Self {
        Self { base, enrich: None }
    }

    #[must_use]
    pub fn with_enrich(mut self, enrich: Arc<dyn EnrichSpan>) -> Self {
        self.enrich = Some(enrich);
        self
    }
}

impl std::fmt::Debug for LoggingLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingLayer")
            .field("base", &self.base)
            .field("enrich", &self.enrich.is_some())
            .finish()
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            base: self.base.clone(),
            enrich: self.enrich.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LoggingService<S> {
    inner: S,
    base: BaseLogger,
    enrich: Option<Arc<dyn EnrichSpan>>,
}

impl<S, R> Service<R> for LoggingService<S>
where
    R: CallRequest,
    S: Service<R, Error = Status>,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = Status;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, Status>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: R) -> Self::Future {
        let descriptor = Arc::clone(call.descriptor());
        let trace_id = match call.state().trace_id() {
            Ok(trace_id) => trace_id.clone(),
            Err(missing) => {
                tracing::error!(
                    error = %missing,
                    method = descriptor.full_method.as_str(),
                    "logging stage reached before trace stage"
                );
                return Box::pin(std::future::ready(Err(missing.into())));
            }
        };

        let call_span = tracing::info_span!(
            parent: self.base.span(),
            "call",
            trace_id = %trace_id,
            service = descriptor.service.as_str(),
            method = descriptor.method.as_str(),
            kind = call.kind().as_str(),
        );
        let span = match &self.enrich {
            Some(enrich) => enrich.enrich(&call_span, call.state(), call.metadata()),
            None => call_span,
        };

        let state = call.state().clone().with_logger(CallLogger::new(span.clone()));
        let call = call.with_state(state);

        tracing::info!(parent: &span, "started call");
        let mut guard = FinishGuard {
            span: span.clone(),
            descriptor,
            finished: false,
        };

        let fut = span.in_scope(|| self.inner.call(call));
        Box::pin(
            async move {
                let result = fut.await;
                guard.finish(outcome_code(&result));
                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
