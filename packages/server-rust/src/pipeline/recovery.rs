//! Recovery stage: turns panics below it into `Internal` outcomes.
//!
//! Both the synchronous `call()` and every poll of the returned future run
//! inside a guarded scope. Panics raised in a guarded scope are logged
//! through the call logger with their payload and backtrace; the caller only
//! ever sees `Status::internal("internal error")`.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use callguard_core::Status;
use futures_util::FutureExt;
use tower::{Layer, Service};

use crate::call::CallRequest;
use crate::logging::CallLogger;

// ---------------------------------------------------------------------------
// Panic hook
// ---------------------------------------------------------------------------

thread_local! {
    /// Number of guarded scopes active on this thread.
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    /// Backtrace of the latest panic raised in a guarded scope.
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the process panic hook that captures backtraces for panics in
/// guarded scopes. Runs at most once per process; later calls do nothing.
/// Panics outside guarded scopes go to the previously installed hook
/// unchanged.
///
/// [`RecoveryLayer`] calls this when it wraps a service. Hosts that install
/// their own hook must do so before the first pipeline is built, or call
/// this explicitly right after. A hook set later replaces this one, and
/// recovered panics are then logged with an `<unavailable>` backtrace.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) > 0 {
                let backtrace = Backtrace::force_capture().to_string();
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            } else {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as inside a guarded scope until dropped.
struct GuardScope;

impl GuardScope {
    fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Logs a caught panic and returns the status reported to the caller.
fn recovered(logger: &CallLogger, payload: &(dyn Any + Send)) -> Status {
    let panic = panic_message(payload);
    let backtrace = LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "<unavailable>".to_string());
    tracing::error!(
        parent: logger.span(),
        panic = %panic,
        backtrace = %backtrace,
        "recovered from panic"
    );
    Status::internal("internal error")
}

// ---------------------------------------------------------------------------
// RecoveryLayer
// ---------------------------------------------------------------------------

/// Tower layer that contains panics raised below it.
///
/// Wrapping a service installs the process panic hook via
/// [`install_panic_hook`]. That hook is the only process-wide state this
/// crate touches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryLayer;

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        install_panic_hook();
        RecoveryService { inner }
    }
}

// ---------------------------------------------------------------------------
// RecoveryService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecoveryService<S> {
    inner: S,
}

impl<S, R> Service<R> for RecoveryService<S>
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
        let logger = match call.state().logger() {
            Ok(logger) => logger.clone(),
            Err(missing) => {
                tracing::error!(
                    error = %missing,
                    method = call.descriptor().full_method.as_str(),
                    "recovery stage reached before logging stage"
                );
                return Box::pin(std::future::ready(Err(missing.into())));
            }
        };

        let inner = &mut self.inner;
        let called = {
            let _scope = GuardScope::enter();
            catch_unwind(AssertUnwindSafe(|| inner.call(call)))
        };
        let mut fut = match called {
            Ok(fut) => Box::pin(fut),
            Err(payload) => {
                let status = recovered(&logger, payload.as_ref());
                return Box::pin(std::future::ready(Err(status)));
            }
        };

        let guarded = std::future::poll_fn(move |cx| {
            let _scope = GuardScope::enter();
            fut.as_mut().poll(cx)
        });
        Box::pin(async move {
            match AssertUnwindSafe(guarded).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(recovered(&logger, payload.as_ref())),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
