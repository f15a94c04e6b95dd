//! Per-call state threaded forward through the stage chain.

use std::fmt;
use std::sync::Arc;

use callguard_core::Status;
use uuid::Uuid;

use crate::logging::CallLogger;

/// Opaque identifier correlating every log event and response of one call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(Arc<str>);

impl TraceId {
    /// Mints a fresh random (UUID v4) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

/// Identity established by an auth function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// Authenticated subject, when the credential names one.
    pub subject: Option<String>,
    /// The credential the call presented.
    pub token: Option<String>,
}

impl Principal {
    /// A principal for calls admitted without credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A principal identified only by the bearer token it presented.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            subject: None,
            token: Some(token.into()),
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.subject.is_none() && self.token.is_none()
    }
}

/// A value a stage expected to find in [`CallState`] was never attached.
///
/// This only happens when stages are composed out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("missing context value: {0}")]
pub struct MissingContextValue(pub &'static str);

impl From<MissingContextValue> for Status {
    fn from(_: MissingContextValue) -> Self {
        Status::internal("internal error")
    }
}

/// Typed per-call context.
///
/// Derivation is by value: each `with_*` consumes the state and returns the
/// child, so a stage can only hand state downstream, never observe what a
/// downstream stage derived.
#[derive(Debug, Clone, Default)]
pub struct CallState {
    trace_id: Option<TraceId>,
    logger: Option<CallLogger>,
    principal: Option<Arc<Principal>>,
}

impl CallState {
    /// An empty state, as a transport creates it for a new call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: CallLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(Arc::new(principal));
        self
    }

    /// # Errors
    ///
    /// Returns [`MissingContextValue`] if the trace stage has not run.
    pub fn trace_id(&self) -> Result<&TraceId, MissingContextValue> {
        self.trace_id.as_ref().ok_or(MissingContextValue("trace-id"))
    }

    /// # Errors
    ///
    /// Returns [`MissingContextValue`] if the logging stage has not run.
    pub fn logger(&self) -> Result<&CallLogger, MissingContextValue> {
        self.logger.as_ref().ok_or(MissingContextValue("logger"))
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_deref()
    }

    /// # Errors
    ///
    /// Returns [`MissingContextValue`] if no auth function accepted the call
    /// (including calls whose method is skip-listed).
    pub fn require_principal(&self) -> Result<&Principal, MissingContextValue> {
        self.principal().ok_or(MissingContextValue("principal"))
    }
}
