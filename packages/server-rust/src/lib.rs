//! `callguard` server: the trace, logging, recovery and auth stages that wrap
//! every unary and server-streaming call before it reaches a handler.

pub mod auth;
pub mod call;
pub mod logging;
pub mod pipeline;
pub mod service;

#[cfg(test)]
mod test_support;

pub use auth::{AllowAll, AuthFunc, JwtAuth, RejectAll, SkipAuth, SkipList, StaticTokenAuth};
pub use call::{CallRequest, CallState, ServerStream, StreamCall, UnaryCall, WrappedStream};
pub use logging::{init_tracing, BaseLogger, CallLogger, LogConfig, LogFormat};
pub use pipeline::CallPipeline;
pub use service::{PipelineConfig, RpcService, ServiceRegistry};
