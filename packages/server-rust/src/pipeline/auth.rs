//! Auth stage: the skip predicate first, then the service's override or the
//! default auth function.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use callguard_core::{CallDescriptor, Status};
use tower::{Layer, Service};

use crate::auth::{AuthFunc, RejectAll, SkipAuth, SkipList};
use crate::call::CallRequest;

// ---------------------------------------------------------------------------
// AuthPolicy
// ---------------------------------------------------------------------------

/// Which auth function, if any, applies to a call.
#[derive(Clone)]
pub struct AuthPolicy {
    skip: Arc<dyn SkipAuth>,
    default: Arc<dyn AuthFunc>,
    overrides: Arc<HashMap<String, Arc<dyn AuthFunc>>>,
}

impl AuthPolicy {
    #[must_use]
    pub fn new(skip: Arc<dyn SkipAuth>, default: Arc<dyn AuthFunc>) -> Self {
        Self {
            skip,
            default,
            overrides: Arc::new(HashMap::new()),
        }
    }

    /// Per-service auth functions, keyed by fully-qualified service name.
    #[must_use]
    pub fn with_overrides(mut self, overrides: HashMap<String, Arc<dyn AuthFunc>>) -> Self {
        self.overrides = Arc::new(overrides);
        self
    }

    /// The auth function for a call, or `None` when the skip predicate
    /// matches. Skipping takes precedence over any override.
    #[must_use]
    pub fn resolve(&self, descriptor: &CallDescriptor) -> Option<Arc<dyn AuthFunc>> {
        if self.skip.skip(&descriptor.service, &descriptor.method) {
            return None;
        }
        let auth = self
            .overrides
            .get(&descriptor.service)
            .unwrap_or(&self.default);
        Some(Arc::clone(auth))
    }
}

impl Default for AuthPolicy {
    /// Skips nothing and rejects everything.
    fn default() -> Self {
        Self::new(Arc::new(SkipList::new()), Arc::new(RejectAll))
    }
}

impl std::fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<_> = self.overrides.keys().collect();
        services.sort();
        f.debug_struct("AuthPolicy")
            .field("overrides", &services)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AuthLayer
// ---------------------------------------------------------------------------

/// Tower layer that authenticates calls before they reach the handler.
#[derive(Debug, Clone, Default)]
pub struct AuthLayer {
    policy: AuthPolicy,
}

impl AuthLayer {
    #[must_use]
    pub fn new(policy: AuthPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuthService<S> {
    inner: S,
    policy: AuthPolicy,
}

impl<S, R> Service<R> for AuthService<S>
where
    R: CallRequest,
    S: Service<R, Error = Status> + Clone + Send + 'static,
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
        let Some(auth) = self.policy.resolve(call.descriptor()) else {
            return Box::pin(self.inner.call(call));
        };

        // Take the service that was driven to readiness; leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            let state = auth
                .authenticate(call.state().clone(), call.metadata())
                .await?;
            inner.call(call.with_state(state)).await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use callguard_core::{Code, Metadata, AUTHORIZATION_KEY};
    use tower::util::BoxCloneService;
    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::auth::{AllowAll, StaticTokenAuth};
    use crate::call::UnaryCall;

    /// Returns whether the handler saw a principal; counts invocations.
    fn handler(hits: Arc<AtomicU32>) -> BoxCloneService<UnaryCall<()>, bool, Status> {
        BoxCloneService::new(service_fn(move |call: UnaryCall<()>| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Status>(call.state().principal().is_some())
            }
        }))
    }

    fn call(method: &str, authorization: Option<&str>) -> UnaryCall<()> {
        let md = match authorization {
            Some(value) => Metadata::from_pairs([(AUTHORIZATION_KEY, value)]).unwrap(),
            None => Metadata::new(),
        };
        UnaryCall::new(method, md, ())
    }

    fn overrides(service: &str, auth: Arc<dyn AuthFunc>) -> HashMap<String, Arc<dyn AuthFunc>> {
        HashMap::from([(service.to_string(), auth)])
    }

    #[tokio::test]
    async fn default_rejects_without_reaching_handler() {
        let hits = Arc::new(AtomicU32::new(0));
        let err = AuthLayer::default()
            .layer(handler(hits.clone()))
            .oneshot(call("/s.Svc/M", Some("bearer worldhello")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_bypasses_rejecting_default() {
        let hits = Arc::new(AtomicU32::new(0));
        let policy = AuthPolicy::new(
            Arc::new(SkipList::new().with_service("s.Svc")),
            Arc::new(RejectAll),
        );
        let saw_principal = AuthLayer::new(policy)
            .layer(handler(hits.clone()))
            .oneshot(call("/s.Svc/M", Some("bearer garbage")))
            .await
            .unwrap();
        assert!(!saw_principal);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_wins_over_rejecting_override() {
        let hits = Arc::new(AtomicU32::new(0));
        let policy = AuthPolicy::new(
            Arc::new(|_: &str, method: &str| method == "Open"),
            Arc::new(AllowAll),
        )
        .with_overrides(overrides("s.Svc", Arc::new(RejectAll)));
        let svc = AuthLayer::new(policy).layer(handler(hits.clone()));

        let skipped = svc.clone().oneshot(call("/s.Svc/Open", None));
        assert!(!skipped.await.unwrap());

        let checked = svc.clone().oneshot(call("/s.Svc/Closed", None));
        assert_eq!(checked.await.unwrap_err().code(), Code::Unauthenticated);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn override_replaces_default() {
        let hits = Arc::new(AtomicU32::new(0));
        let policy = AuthPolicy::default()
            .with_overrides(overrides("s.Greeter", Arc::new(StaticTokenAuth::new("worldhello"))));
        let svc = AuthLayer::new(policy).layer(handler(hits.clone()));

        let ok = svc
            .clone()
            .oneshot(call("/s.Greeter/SayHello", Some("bearer worldhello")))
            .await
            .unwrap();
        assert!(ok);

        let wrong = svc
            .clone()
            .oneshot(call("/s.Greeter/SayHello", Some("bearer wrong")))
            .await
            .unwrap_err();
        assert_eq!(wrong.code(), Code::Unauthenticated);

        // Other services still get the default.
        let other = svc
            .clone()
            .oneshot(call("/s.Other/M", Some("bearer worldhello")))
            .await
            .unwrap_err();
        assert_eq!(other.code(), Code::Unauthenticated);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolve_prefers_override() {
        let policy = AuthPolicy::default().with_overrides(overrides("a", Arc::new(AllowAll)));
        assert!(policy.resolve(&CallDescriptor::new("/a/M")).is_some());
        assert!(policy.resolve(&CallDescriptor::new("/b/M")).is_some());
        assert!(format!("{policy:?}").contains("\"a\""));
    }
}
