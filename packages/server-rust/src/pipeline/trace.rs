//! Trace stage: gives every call a unique trace id and returns it to the
//! caller in the `trace-id` response header.

use std::task::{Context, Poll};

use callguard_core::{Status, TRACE_ID_KEY};
use tower::{Layer, Service};

use crate::call::{CallRequest, TraceId};

// ---------------------------------------------------------------------------
// TraceLayer
// ---------------------------------------------------------------------------

/// Tower layer that mints a trace id per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer;

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService { inner }
    }
}

// ---------------------------------------------------------------------------
// TraceService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TraceService<S> {
    inner: S,
}

impl<S, R> Service<R> for TraceService<S>
where
    R: CallRequest,
    S: Service<R, Error = Status>,
{
    type Response = S::Response;
    type Error = Status;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: R) -> Self::Future {
        // A state seeded with a trace id keeps it; the header is still set.
        let (trace_id, minted) = match call.state().trace_id() {
            Ok(existing) => (existing.clone(), false),
            Err(_) => (TraceId::generate(), true),
        };
        if let Err(status) = call.set_header(TRACE_ID_KEY, trace_id.as_str()) {
            tracing::warn!(
                trace_id = %trace_id,
                error = %status,
                "failed to set trace-id header"
            );
        }
        if !minted {
            return self.inner.call(call);
        }
        let state = call.state().clone().with_trace_id(trace_id);
        self.inner.call(call.with_state(state))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use callguard_core::Metadata;
    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::call::{CallState, UnaryCall};

    /// Echoes the trace id the handler observed.
    async fn observed(call: UnaryCall<()>) -> Result<String, Status> {
        Ok(call.state().trace_id()?.to_string())
    }

    #[tokio::test]
    async fn header_matches_state() {
        let call = UnaryCall::new("/s/M", Metadata::new(), ());
        let response = call.response_metadata();

        let seen = TraceLayer
            .layer(service_fn(observed))
            .oneshot(call)
            .await
            .unwrap();

        assert_eq!(response.headers().get(TRACE_ID_KEY), Some(seen.as_str()));
    }

    #[tokio::test]
    async fn ids_are_unique_per_call() {
        let svc = TraceLayer.layer(service_fn(observed));
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let call = UnaryCall::new("/s/M", Metadata::new(), ());
            let id = svc.clone().oneshot(call).await.unwrap();
            assert!(seen.insert(id));
        }
    }

    #[tokio::test]
    async fn existing_trace_id_is_reused() {
        let call = UnaryCall::new("/s/M", Metadata::new(), ())
            .with_state(CallState::new().with_trace_id(TraceId::from("given")));
        let response = call.response_metadata();

        let seen = TraceLayer
            .layer(service_fn(observed))
            .oneshot(call)
            .await
            .unwrap();

        assert_eq!(seen, "given");
        assert_eq!(response.headers().get(TRACE_ID_KEY), Some("given"));
    }

    #[tokio::test]
    async fn applied_twice_keeps_one_id() {
        let call = UnaryCall::new("/s/M", Metadata::new(), ());
        let response = call.response_metadata();

        let seen = TraceLayer
            .layer(TraceLayer.layer(service_fn(observed)))
            .oneshot(call)
            .await
            .unwrap();

        assert_eq!(response.headers().get(TRACE_ID_KEY), Some(seen.as_str()));
    }

    #[tokio::test]
    async fn header_failure_does_not_fail_call() {
        let call = UnaryCall::new("/s/M", Metadata::new(), ());
        call.response_metadata().mark_headers_sent();

        let seen = TraceLayer
            .layer(service_fn(observed))
            .oneshot(call)
            .await
            .unwrap();
        assert!(!seen.is_empty());
    }
}
