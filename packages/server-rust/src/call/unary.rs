//! Single-request, single-response calls.

use std::sync::Arc;

use callguard_core::{CallDescriptor, Metadata, Status};

use super::{CallKind, CallRequest, CallSignal, CallState, ResponseMetadata};

/// A unary call on its way through the pipeline.
#[derive(Debug)]
pub struct UnaryCall<M> {
    descriptor: Arc<CallDescriptor>,
    metadata: Metadata,
    state: CallState,
    signal: CallSignal,
    response: ResponseMetadata,
    message: M,
}

impl<M> UnaryCall<M> {
    /// Creates a call for `full_method` (`/<service>/<method>`) with empty
    /// state, a fresh signal and empty response metadata.
    pub fn new(full_method: impl Into<String>, metadata: Metadata, message: M) -> Self {
        Self {
            descriptor: Arc::new(CallDescriptor::new(full_method)),
            metadata,
            state: CallState::new(),
            signal: CallSignal::new(),
            response: ResponseMetadata::new(),
            message,
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CallSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Handle the transport keeps to read response headers and trailers
    /// after the call completes.
    #[must_use]
    pub fn response_metadata(&self) -> ResponseMetadata {
        self.response.clone()
    }

    #[must_use]
    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn into_message(self) -> M {
        self.message
    }

    /// Sets a response trailer.
    ///
    /// # Errors
    ///
    /// Returns `Internal` for invalid metadata.
    pub fn set_trailer(&self, key: &str, value: &str) -> Result<(), Status> {
        self.response.set_trailer(key, value)
    }
}

impl<M: Send + 'static> CallRequest for UnaryCall<M> {
    fn descriptor(&self) -> &Arc<CallDescriptor> {
        &self.descriptor
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn state(&self) -> &CallState {
        &self.state
    }

    fn with_state(mut self, state: CallState) -> Self {
        self.state = state;
        self
    }

    fn set_header(&self, key: &str, value: &str) -> Result<(), Status> {
        self.response.set_header(key, value)
    }

    fn signal(&self) -> &CallSignal {
        &self.signal
    }

    fn kind(&self) -> CallKind {
        CallKind::Unary
    }
}
