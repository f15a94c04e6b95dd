//! Call abstractions shared by every pipeline stage.
//!
//! Stages are generic over [`CallRequest`], implemented by both call kinds:
//!
//! - [`UnaryCall`]: one request message, one response message
//! - [`StreamCall`]: one request message, a server stream of responses,
//!   with state substitution through the [`WrappedStream`] adapter

pub mod signal;
pub mod state;
pub mod stream;
pub mod unary;

use std::sync::Arc;

use callguard_core::{CallDescriptor, Metadata, Status};
use parking_lot::Mutex;

pub use signal::CallSignal;
pub use state::{CallState, MissingContextValue, Principal, TraceId};
pub use stream::{ChannelStream, ServerStream, StreamCall, WrappedStream};
pub use unary::UnaryCall;

/// Which shape of call is flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    ServerStreaming,
}

impl CallKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ServerStreaming => "server_streaming",
        }
    }
}

/// Request-side view of a call, as seen by every stage.
pub trait CallRequest: Send + 'static {
    fn descriptor(&self) -> &Arc<CallDescriptor>;

    /// Metadata sent by the caller.
    fn metadata(&self) -> &Metadata;

    /// The state most recently derived for this call.
    fn state(&self) -> &CallState;

    /// Replaces the state handed to the rest of the chain.
    #[must_use]
    fn with_state(self, state: CallState) -> Self;

    /// Sets a response header.
    ///
    /// # Errors
    ///
    /// Fails once headers have already been sent, or for invalid metadata.
    fn set_header(&self, key: &str, value: &str) -> Result<(), Status>;

    fn signal(&self) -> &CallSignal;

    fn kind(&self) -> CallKind;
}

#[derive(Debug, Default)]
struct ResponseParts {
    headers: Metadata,
    trailers: Metadata,
    headers_sent: bool,
}

/// Response headers and trailers of one call, shared between the pipeline
/// and the transport that will put them on the wire.
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    inner: Arc<Mutex<ResponseParts>>,
}

impl ResponseMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `Internal` if headers were already sent or the pair is invalid.
    pub fn set_header(&self, key: &str, value: &str) -> Result<(), Status> {
        let mut parts = self.inner.lock();
        if parts.headers_sent {
            return Err(Status::internal("headers already sent"));
        }
        parts.headers.insert(key, value)
    }

    /// # Errors
    ///
    /// Returns `Internal` if the pair is invalid.
    pub fn set_trailer(&self, key: &str, value: &str) -> Result<(), Status> {
        self.inner.lock().trailers.insert(key, value)
    }

    /// Freezes headers; later `set_header` calls fail.
    pub fn mark_headers_sent(&self) {
        self.inner.lock().headers_sent = true;
    }

    #[must_use]
    pub fn headers_sent(&self) -> bool {
        self.inner.lock().headers_sent
    }

    /// Snapshot of the headers set so far.
    #[must_use]
    pub fn headers(&self) -> Metadata {
        self.inner.lock().headers.clone()
    }

    /// Snapshot of the trailers set so far.
    #[must_use]
    pub fn trailers(&self) -> Metadata {
        self.inner.lock().trailers.clone()
    }
}
