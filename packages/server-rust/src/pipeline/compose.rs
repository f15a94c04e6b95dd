//! Pipeline composition: the four stages, in fixed order, around a handler.

use callguard_core::Status;
use tower::layer::util::{Identity, Stack};
use tower::{Service, ServiceBuilder};

use super::auth::{AuthLayer, AuthPolicy, AuthService};
use super::logging::{LoggingLayer, LoggingService};
use super::recovery::{RecoveryLayer, RecoveryService};
use super::trace::{TraceLayer, TraceService};
use crate::call::{ServerStream, StreamCall, UnaryCall};
use crate::service::{PipelineConfig, ServiceRegistry};

/// The stage stack as built by [`CallPipeline::layers`].
pub type PipelineLayers =
    Stack<AuthLayer, Stack<RecoveryLayer, Stack<LoggingLayer, Stack<TraceLayer, Identity>>>>;

/// A handler wrapped in every stage.
pub type Pipeline<H> = TraceService<LoggingService<RecoveryService<AuthService<H>>>>;

/// Builds the stage chain shared by every handler of a server.
#[derive(Debug, Clone)]
pub struct CallPipeline {
    logging: LoggingLayer,
    auth: AuthLayer,
}

impl CallPipeline {
    /// Auth overrides are read from `registry` here, once; services
    /// registered afterwards use the default auth function.
    #[must_use]
    pub fn new(config: PipelineConfig, registry: &ServiceRegistry) -> Self {
        let policy = AuthPolicy::new(config.skip, config.default_auth)
            .with_overrides(registry.auth_overrides());

        let mut logging = LoggingLayer::new(config.base_logger);
        if let Some(enrich) = config.enrich {
            logging = logging.with_enrich(enrich);
        }

        tracing::debug!(
            services = ?registry.service_names(),
            policy = ?policy,
            "call pipeline built"
        );

        Self {
            logging,
            auth: AuthLayer::new(policy),
        }
    }

    /// Layer order (outermost to innermost):
    /// 1. `TraceLayer` -- mint the trace id and set the `trace-id` header
    /// 2. `LoggingLayer` -- attach the call logger, log start and finish
    /// 3. `RecoveryLayer` -- contain panics from everything below
    /// 4. `AuthLayer` -- skip predicate, then override or default auth
    #[must_use]
    pub fn layers(&self) -> ServiceBuilder<PipelineLayers> {
        ServiceBuilder::new()
            .layer(TraceLayer)
            .layer(self.logging.clone())
            .layer(RecoveryLayer)
            .layer(self.auth.clone())
    }

    /// Wraps a handler of `UnaryCall`s.
    #[must_use]
    pub fn unary<M, H>(&self, handler: H) -> Pipeline<H>
    where
        M: Send + 'static,
        H: Service<UnaryCall<M>, Error = Status>,
    {
        self.layers().service(handler)
    }

    /// Wraps a handler of `StreamCall`s. The handler reads the derived state
    /// from the call's stream, which is a `WrappedStream` over the transport's.
    #[must_use]
    pub fn streaming<M, S, H>(&self, handler: H) -> Pipeline<H>
    where
        M: Send + 'static,
        S: ServerStream,
        H: Service<StreamCall<M, S>, Error = Status>,
    {
        self.layers().service(handler)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
