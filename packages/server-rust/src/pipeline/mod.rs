//! Tower stages every call passes through before reaching its handler.
//!
//! - [`trace`]: mint the trace id, set the `trace-id` header
//! - [`logging`]: per-call logger, start and finish events
//! - [`recovery`]: panic containment
//! - [`auth`]: skip predicate, service override, default auth
//! - [`compose`]: assembles the stages in that order

pub mod auth;
pub mod compose;
pub mod logging;
pub mod recovery;
pub mod trace;

pub use auth::{AuthLayer, AuthPolicy};
pub use compose::{CallPipeline, Pipeline, PipelineLayers};
pub use logging::{code_to_level, EnrichSpan, LoggingLayer};
pub use recovery::{install_panic_hook, RecoveryLayer};
pub use trace::TraceLayer;
