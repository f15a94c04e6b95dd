//! Server-streaming calls and the stream state adapter.

use std::sync::Arc;

use async_trait::async_trait;
use callguard_core::{CallDescriptor, Metadata, Status};
use tokio::sync::mpsc;

use super::{CallKind, CallRequest, CallSignal, CallState, ResponseMetadata};

/// The outbound half of a server-streaming call, as provided by a transport.
#[async_trait]
pub trait ServerStream: Send + Sync + 'static {
    /// Outbound message type.
    type Item: Send + 'static;

    /// Call state visible through this stream.
    fn state(&self) -> &CallState;

    /// Metadata sent by the caller.
    fn incoming_metadata(&self) -> &Metadata;

    fn signal(&self) -> &CallSignal;

    /// # Errors
    ///
    /// Fails once headers have been sent, or for invalid metadata.
    fn set_header(&self, key: &str, value: &str) -> Result<(), Status>;

    /// # Errors
    ///
    /// Fails for invalid metadata.
    fn set_trailer(&self, key: &str, value: &str) -> Result<(), Status>;

    /// Sends one message to the caller.
    ///
    /// # Errors
    ///
    /// Fails with `Canceled` once the caller has gone away.
    async fn send(&mut self, item: Self::Item) -> Result<(), Status>;
}

/// Stream adapter that substitutes the call state and forwards everything
/// else to the wrapped stream unchanged.
#[derive(Debug)]
pub struct WrappedStream<S> {
    inner: S,
    state: CallState,
}

impl<S: ServerStream> WrappedStream<S> {
    /// Wraps `inner`, exposing `state` in place of the stream's own state.
    pub fn wrap(inner: S, state: CallState) -> Self {
        Self { inner, state }
    }

    /// Replaces the substituted state without adding another wrapper layer.
    #[must_use]
    pub fn with_state(mut self, state: CallState) -> Self {
        self.state = state;
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: ServerStream> ServerStream for WrappedStream<S> {
    type Item = S::Item;

    fn state(&self) -> &CallState {
        &self.state
    }

    fn incoming_metadata(&self) -> &Metadata {
        self.inner.incoming_metadata()
    }

    fn signal(&self) -> &CallSignal {
        self.inner.signal()
    }

    fn set_header(&self, key: &str, value: &str) -> Result<(), Status> {
        self.inner.set_header(key, value)
    }

    fn set_trailer(&self, key: &str, value: &str) -> Result<(), Status> {
        self.inner.set_trailer(key, value)
    }

    async fn send(&mut self, item: Self::Item) -> Result<(), Status> {
        self.inner.send(item).await
    }
}

/// A server-streaming call on its way through the pipeline.
#[derive(Debug)]
pub struct StreamCall<M, S> {
    descriptor: Arc<CallDescriptor>,
    message: M,
    stream: WrappedStream<S>,
}

impl<M, S: ServerStream> StreamCall<M, S> {
    /// Creates a call for `full_method`; the stream's own state is the
    /// starting state of the chain.
    pub fn new(full_method: impl Into<String>, message: M, stream: S) -> Self {
        let state = stream.state().clone();
        Self {
            descriptor: Arc::new(CallDescriptor::new(full_method)),
            message,
            stream: WrappedStream::wrap(stream, state),
        }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn stream(&self) -> &WrappedStream<S> {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut WrappedStream<S> {
        &mut self.stream
    }

    pub fn into_parts(self) -> (M, WrappedStream<S>) {
        (self.message, self.stream)
    }
}

impl<M, S> CallRequest for StreamCall<M, S>
where
    M: Send + 'static,
    S: ServerStream,
{
    fn descriptor(&self) -> &Arc<CallDescriptor> {
        &self.descriptor
    }

    fn metadata(&self) -> &Metadata {
        self.stream.incoming_metadata()
    }

    fn state(&self) -> &CallState {
        self.stream.state()
    }

    fn with_state(mut self, state: CallState) -> Self {
        self.stream = self.stream.with_state(state);
        self
    }

    fn set_header(&self, key: &str, value: &str) -> Result<(), Status> {
        self.stream.set_header(key, value)
    }

    fn signal(&self) -> &CallSignal {
        self.stream.signal()
    }

    fn kind(&self) -> CallKind {
        CallKind::ServerStreaming
    }
}

/// A [`ServerStream`] backed by a bounded mpsc channel.
///
/// The receiving half plays the role of the client connection; dropping it
/// makes further sends fail with `Canceled`.
#[derive(Debug)]
pub struct ChannelStream<T> {
    tx: mpsc::Sender<T>,
    metadata: Metadata,
    state: CallState,
    signal: CallSignal,
    response: ResponseMetadata,
}

impl<T: Send + 'static> ChannelStream<T> {
    /// Creates a stream and the receiver its messages arrive on.
    #[must_use]
    pub fn new(metadata: Metadata, capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        let stream = Self {
            tx,
            metadata,
            state: CallState::new(),
            signal: CallSignal::new(),
            response: ResponseMetadata::new(),
        };
        (stream, rx)
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CallSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Seeds the state the pipeline starts from.
    #[must_use]
    pub fn with_state(mut self, state: CallState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn response_metadata(&self) -> ResponseMetadata {
        self.response.clone()
    }
}

#[async_trait]
impl<T: Send + 'static> ServerStream for ChannelStream<T> {
    type Item = T;

    fn state(&self) -> &CallState {
        &self.state
    }

    fn incoming_metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn signal(&self) -> &CallSignal {
        &self.signal
    }

    fn set_header(&self, key: &str, value: &str) -> Result<(), Status> {
        self.response.set_header(key, value)
    }

    fn set_trailer(&self, key: &str, value: &str) -> Result<(), Status> {
        self.response.set_trailer(key, value)
    }

    async fn send(&mut self, item: T) -> Result<(), Status> {
        self.response.mark_headers_sent();
        tokio::select! {
            biased;
            status = self.signal.done() => Err(status),
            sent = self.tx.send(item) => {
                sent.map_err(|_| Status::canceled("client disconnected"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use callguard_core::Code;

    use super::*;
    use crate::call::TraceId;

    #[tokio::test]
    async fn wrapped_stream_substitutes_only_state() {
        let md = Metadata::from_pairs([("x-peer", "p")]).unwrap();
        let (inner, mut rx) = ChannelStream::<u32>::new(md, 4);
        let response = inner.response_metadata();
        let derived = CallState::new().with_trace_id(TraceId::from("derived"));

        let mut wrapped = WrappedStream::wrap(inner, derived);
        assert_eq!(wrapped.state().trace_id().unwrap().as_str(), "derived");
        assert!(wrapped.get_ref().state().trace_id().is_err());
        assert_eq!(wrapped.incoming_metadata().get("x-peer"), Some("p"));

        wrapped.set_header("h", "1").unwrap();
        wrapped.set_trailer("t", "2").unwrap();
        wrapped.send(5).await.unwrap();

        assert_eq!(rx.recv().await, Some(5));
        assert_eq!(response.headers().get("h"), Some("1"));
        assert_eq!(response.trailers().get("t"), Some("2"));
    }

    #[test]
    fn rewrapping_replaces_state_without_nesting() {
        let (inner, _rx) = ChannelStream::<u32>::new(Metadata::new(), 1);
        let call = StreamCall::new("/s/Watch", (), inner);
        let call = call
            .with_state(CallState::new().with_trace_id(TraceId::from("one")))
            .with_state(CallState::new().with_trace_id(TraceId::from("two")));
        assert_eq!(call.state().trace_id().unwrap().as_str(), "two");
        let (_, stream) = call.into_parts();
        assert!(stream.into_inner().state().trace_id().is_err());
    }

    #[tokio::test]
    async fn send_after_client_drop_is_canceled() {
        let (mut stream, rx) = ChannelStream::<u32>::new(Metadata::new(), 1);
        drop(rx);
        assert_eq!(stream.send(1).await.unwrap_err().code(), Code::Canceled);
    }

    #[tokio::test]
    async fn send_on_canceled_signal_does_not_block() {
        let signal = CallSignal::new();
        let (stream, _rx) = ChannelStream::<u32>::new(Metadata::new(), 1);
        let mut stream = stream.with_signal(signal.clone());
        stream.send(1).await.unwrap();
        signal.cancel();
        // Channel is full; the canceled signal must win.
        assert_eq!(stream.send(2).await.unwrap_err().code(), Code::Canceled);
    }

    #[test]
    fn stream_call_reports_kind_and_metadata() {
        let md = Metadata::from_pairs([("authorization", "bearer x")]).unwrap();
        let (inner, _rx) = ChannelStream::<u32>::new(md, 1);
        let call = StreamCall::new("/example.v1.Health/Watch", (), inner);
        assert_eq!(call.kind(), CallKind::ServerStreaming);
        assert_eq!(call.metadata().get("authorization"), Some("bearer x"));
        assert_eq!(call.descriptor().method, "Watch");
    }
}
