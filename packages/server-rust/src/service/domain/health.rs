use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use callguard_core::Status;
use tower::Service;

use crate::auth::{AllowAll, AuthFunc};
use crate::call::{ServerStream, StreamCall, UnaryCall};
use crate::service::registry::RpcService;

pub const SERVICE_NAME: &str = "example.v1.Health";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
}

#[derive(Debug, Clone, Default)]
pub struct HealthCheckRequest {
    /// Service to report on; empty for the server as a whole.
    pub service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

const SERVING: HealthCheckResponse = HealthCheckResponse {
    status: ServingStatus::Serving,
};

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Period between status messages on a `watch` stream.
    pub watch_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            watch_interval: Duration::from_secs(60),
        }
    }
}

/// Reports server health. Open to unauthenticated callers.
#[derive(Debug, Clone, Default)]
pub struct Health {
    config: HealthConfig,
}

impl Health {
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn check(&self, _request: &HealthCheckRequest) -> HealthCheckResponse {
        SERVING
    }

    /// Sends the status now and on every tick until the call is canceled or
    /// its deadline passes.
    ///
    /// # Errors
    ///
    /// Always ends with the status of the call signal (`Canceled` or
    /// `DeadlineExceeded`), or with the send error if the client went away.
    pub async fn watch<S>(&self, call: StreamCall<HealthCheckRequest, S>) -> Result<(), Status>
    where
        S: ServerStream<Item = HealthCheckResponse>,
    {
        let (_, mut stream) = call.into_parts();
        let signal = stream.signal().clone();
        let period = self.config.watch_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        stream.send(SERVING).await?;
        loop {
            tokio::select! {
                biased;
                status = signal.done() => return Err(status),
                _ = ticker.tick() => stream.send(SERVING).await?,
            }
        }
    }
}

impl RpcService for Health {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn auth_override(&self) -> Option<Arc<dyn AuthFunc>> {
        Some(Arc::new(AllowAll))
    }
}

impl Service<UnaryCall<HealthCheckRequest>> for Arc<Health> {
    type Response = HealthCheckResponse;
    type Error = Status;
    type Future = Pin<Box<dyn Future<Output = Result<HealthCheckResponse, Status>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: UnaryCall<HealthCheckRequest>) -> Self::Future {
        let response = self.check(call.message());
        Box::pin(std::future::ready(Ok(response)))
    }
}

impl<S> Service<StreamCall<HealthCheckRequest, S>> for Arc<Health>
where
    S: ServerStream<Item = HealthCheckResponse>,
{
    type Response = ();
    type Error = Status;
    type Future = Pin<Box<dyn Future<Output = Result<(), Status>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: StreamCall<HealthCheckRequest, S>) -> Self::Future {
        let health = Arc::clone(self);
        Box::pin(async move { health.watch(call).await })
    }
}
