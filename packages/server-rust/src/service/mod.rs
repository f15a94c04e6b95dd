//! Service registration and pipeline configuration.
//!
//! 1. **Registry** (`registry`): services by name and type, with their auth overrides
//! 2. **Configuration** (`config`): base logger, skip predicate, default auth
//! 3. **Domain services** (`domain`): demo services served through the pipeline

pub mod config;
pub mod domain;
pub mod registry;

pub use config::PipelineConfig;
pub use registry::{RpcService, ServiceRegistry};
